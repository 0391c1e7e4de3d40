use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    accessibility::{
        LegendEntry, Mode, PinnedProbe, ProbeResult, RasterOptions, legend, raster::DEFAULT_CELL_SIZE_DEG,
        to_feature_collection,
    },
    contour::build_catalog,
    geo::GeoPoint,
    orchestrator::{ResolvedOrigin, SearchError, SearchRequest, Session, SessionState},
    services::{HttpServices, NearestStation},
};

pub const MIN_CELL_SIZE_DEG: f64 = 0.0005;
pub const MAX_CELL_SIZE_DEG: f64 = 0.05;

pub struct AppState {
    pub session: Session,
    pub services: HttpServices,
    pub raster: RasterOptions,
}

impl AppState {
    /// The configured cell size is held to the same bounds as a requested one.
    pub fn new(services: HttpServices, raster: RasterOptions) -> Self {
        Self {
            session: Session::new(),
            services,
            raster: bounded(raster),
        }
    }
}

fn bounded(raster: RasterOptions) -> RasterOptions {
    RasterOptions {
        cell_size_deg: cell_size(Some(raster.cell_size_deg), DEFAULT_CELL_SIZE_DEG),
        ..raster
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("nothing to probe; run a search first")]
    NothingToProbe,

    #[error("coordinates must be finite")]
    InvalidPoint,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Search(SearchError::NoAddress) | ApiError::InvalidPoint => StatusCode::BAD_REQUEST,
            ApiError::Search(SearchError::AllOriginsFailed) => StatusCode::BAD_GATEWAY,
            ApiError::Search(SearchError::Superseded) => StatusCode::CONFLICT,
            ApiError::NothingToProbe => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!(error = ?e, "request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/search", post(search))
        .route("/api/grid", get(grid))
        .route("/api/legend", get(current_legend))
        .route("/api/probe", get(probe))
        .route("/api/pin", get(current_pin).post(place_pin).delete(remove_pin))
        .route("/api/reset", post(reset))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when `allow_origin` is unset.
pub fn cors_layer(allow_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    Ok(match allow_origin {
        None => layer.allow_origin(Any),
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("invalid CORS origin {origin:?}"))?;
            layer.allow_origin(origin)
        }
    })
}

pub async fn serve(listener: TcpListener, router: Router) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginSummary {
    pub address: String,
    pub coords: GeoPoint,
    pub station: NearestStation,
    pub contour_name: Option<String>,
    pub station_count: usize,
}

impl From<&ResolvedOrigin> for OriginSummary {
    fn from(origin: &ResolvedOrigin) -> Self {
        Self {
            address: origin.address.clone(),
            coords: origin.coords,
            station: origin.station.clone(),
            contour_name: origin.contour_name.clone(),
            station_count: origin
                .dataset
                .as_ref()
                .map_or(0, |d| build_catalog(d, true).len()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchReport {
    pub generation: u64,
    pub mode: Option<Mode>,
    pub first: Option<OriginSummary>,
    pub second: Option<OriginSummary>,
}

impl From<&SessionState> for SearchReport {
    fn from(state: &SessionState) -> Self {
        let outcome = state.outcome.as_ref();

        Self {
            generation: state.generation,
            mode: state.mode(),
            first: outcome.and_then(|o| o.first.as_ref()).map(OriginSummary::from),
            second: outcome.and_then(|o| o.second.as_ref()).map(OriginSummary::from),
        }
    }
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchReport>, ApiError> {
    let snapshot = state.session.search(&state.services, &request).await?;
    Ok(Json(SearchReport::from(snapshot.as_ref())))
}

#[derive(Debug, Deserialize)]
struct GridQuery {
    cell_size: Option<f64>,
}

/// Client-requested cell size, bounded so a single request cannot ask for
/// millions of cells.
fn cell_size(requested: Option<f64>, default: f64) -> f64 {
    match requested {
        None => default,
        Some(size) if !size.is_finite() || size <= 0.0 => {
            warn!(size, "rejected cell size, using default");
            default
        }
        Some(size) => size.clamp(MIN_CELL_SIZE_DEG, MAX_CELL_SIZE_DEG),
    }
}

async fn grid(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GridQuery>,
) -> Result<Json<FeatureCollection>, ApiError> {
    let options = RasterOptions {
        cell_size_deg: cell_size(query.cell_size, state.raster.cell_size_deg),
        ..state.raster
    };

    let cells = match state.session.snapshot().surface.clone() {
        Some(surface) => tokio::task::spawn_blocking(move || surface.rasterize(options))
            .await
            .map_err(anyhow::Error::from)?,
        None => vec![],
    };

    Ok(Json(to_feature_collection(&cells)?))
}

#[derive(Debug, Serialize)]
struct LegendResponse {
    mode: Option<Mode>,
    entries: Vec<LegendEntry>,
}

async fn current_legend(State(state): State<Arc<AppState>>) -> Json<LegendResponse> {
    let mode = state.session.snapshot().mode();

    Json(LegendResponse {
        mode,
        entries: legend(mode.unwrap_or(Mode::Single)),
    })
}

fn finite(point: GeoPoint) -> Result<GeoPoint, ApiError> {
    point.is_finite().then_some(point).ok_or(ApiError::InvalidPoint)
}

async fn probe(
    State(state): State<Arc<AppState>>,
    Query(point): Query<GeoPoint>,
) -> Result<Json<Option<ProbeResult>>, ApiError> {
    let point = finite(point)?;
    Ok(Json(state.session.snapshot().probe(point)))
}

async fn current_pin(State(state): State<Arc<AppState>>) -> Json<Option<PinnedProbe>> {
    Json(state.session.snapshot().pinned.clone())
}

async fn place_pin(
    State(state): State<Arc<AppState>>,
    Json(point): Json<GeoPoint>,
) -> Result<Json<PinnedProbe>, ApiError> {
    let point = finite(point)?;
    state
        .session
        .pin(point)
        .map(Json)
        .ok_or(ApiError::NothingToProbe)
}

async fn remove_pin(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session.unpin();
    StatusCode::NO_CONTENT
}

async fn reset(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session.reset();
    StatusCode::NO_CONTENT
}

async fn health() -> &'static str {
    "OK"
}
