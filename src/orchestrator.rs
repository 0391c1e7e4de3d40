//! Resolving addresses into contour datasets, and the session that holds the
//! latest result.
//!
//! Each origin is resolved independently (geocode, upstream nearest station,
//! then contour data by name with candidate retry). Two origins resolve
//! concurrently and a failure on one side never discards the other side.

use std::sync::{
    Arc, PoisonError, RwLock, RwLockWriteGuard,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    accessibility::{Accessibility, Mode, PinnedProbe, ProbeResult, Surface},
    contour::{ContourDataset, names},
    geo::GeoPoint,
    services::{NearestStation, StationServices},
};

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("could not geocode {address:?}: {reason}")]
    Geocode { address: String, reason: String },

    #[error("no station near {address:?}: {reason}")]
    NoStation { address: String, reason: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("no address given")]
    NoAddress,

    #[error("search failed")]
    AllOriginsFailed,

    #[error("superseded by a newer search")]
    Superseded,
}

/// A contour dataset together with the name spelling that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ContourMatch {
    pub name: String,
    pub dataset: ContourDataset,
}

/// Tries each spelling of `station_name` in order and returns the first one
/// whose payload validates. Requests are issued one at a time.
pub async fn fetch_contour<S: StationServices>(
    services: &S,
    station_name: &str,
) -> Option<ContourMatch> {
    for candidate in names::candidates(station_name) {
        let payload = match services.contour_data(&candidate).await {
            Ok(payload) => payload,
            Err(e) => {
                debug!(candidate = %candidate, error = %e, "contour lookup failed");
                continue;
            }
        };

        match ContourDataset::from_value(&payload) {
            Ok(dataset) => {
                debug!(candidate = %candidate, bands = dataset.bands.len(), "contour data found");
                return Some(ContourMatch {
                    name: candidate,
                    dataset,
                });
            }
            Err(e) => debug!(candidate = %candidate, error = %e, "contour payload rejected"),
        }
    }

    None
}

#[derive(Clone, Debug)]
pub struct ResolvedOrigin {
    pub address: String,
    pub coords: GeoPoint,
    pub station: NearestStation,
    /// Spelling the contour service accepted, if any did.
    pub contour_name: Option<String>,
    pub dataset: Option<Arc<ContourDataset>>,
}

impl ResolvedOrigin {
    pub fn has_dataset(&self) -> bool {
        self.dataset.as_ref().is_some_and(|d| d.has_stations())
    }
}

pub async fn resolve_origin<S: StationServices>(
    services: &S,
    address: &str,
) -> Result<ResolvedOrigin, OriginError> {
    let coords = services
        .geocode(address)
        .await
        .map_err(|e| OriginError::Geocode {
            address: address.to_owned(),
            reason: e.to_string(),
        })?;

    if !coords.is_finite() {
        return Err(OriginError::Geocode {
            address: address.to_owned(),
            reason: "non-finite coordinate".to_owned(),
        });
    }

    let station = services
        .nearest_station(coords)
        .await
        .map_err(|e| OriginError::NoStation {
            address: address.to_owned(),
            reason: e.to_string(),
        })?;

    let contour = fetch_contour(services, &station.name).await;
    if contour.is_none() {
        warn!(station = %station.name, "no contour data for any spelling");
    }

    let (contour_name, dataset) = match contour {
        Some(m) => (Some(m.name), Some(Arc::new(m.dataset))),
        None => (None, None),
    };

    Ok(ResolvedOrigin {
        address: address.to_owned(),
        coords,
        station,
        contour_name,
        dataset,
    })
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
}

impl SearchRequest {
    pub fn new(address1: impl Into<String>, address2: impl Into<String>) -> Self {
        Self {
            address1: address1.into(),
            address2: address2.into(),
        }
    }

    fn addresses(&self) -> (Option<&str>, Option<&str>) {
        fn given(s: &str) -> Option<&str> {
            Some(s.trim()).filter(|s| !s.is_empty())
        }

        (given(&self.address1), given(&self.address2))
    }

    pub fn is_empty(&self) -> bool {
        self.addresses() == (None, None)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchOutcome {
    pub first: Option<ResolvedOrigin>,
    pub second: Option<ResolvedOrigin>,
}

impl SearchOutcome {
    /// Dual only when both origins have a station and a usable dataset.
    pub fn accessibility(&self) -> Option<Accessibility> {
        let dataset = |o: &Option<ResolvedOrigin>| o.as_ref().and_then(|o| o.dataset.clone());
        Accessibility::from_datasets(dataset(&self.first), dataset(&self.second))
    }

    pub fn mode(&self) -> Option<Mode> {
        self.accessibility().map(|a| a.mode())
    }
}

fn settle(address: &str, result: Result<ResolvedOrigin, OriginError>) -> Option<ResolvedOrigin> {
    result
        .inspect_err(|e| warn!(address, error = %e, "origin unresolved"))
        .ok()
}

/// A single address always lands in the first slot, whichever field it came
/// from.
pub async fn search<S: StationServices + Sync>(
    services: &S,
    request: &SearchRequest,
) -> Result<SearchOutcome, SearchError> {
    let outcome = match request.addresses() {
        (None, None) => return Err(SearchError::NoAddress),
        (Some(address), None) | (None, Some(address)) => SearchOutcome {
            first: settle(address, resolve_origin(services, address).await),
            second: None,
        },
        (Some(a), Some(b)) => {
            let (first, second) =
                tokio::join!(resolve_origin(services, a), resolve_origin(services, b));
            SearchOutcome {
                first: settle(a, first),
                second: settle(b, second),
            }
        }
    };

    if outcome.first.is_none() && outcome.second.is_none() {
        return Err(SearchError::AllOriginsFailed);
    }

    Ok(outcome)
}

/// Token handed out when a search starts; results carrying an older token
/// than the session's current one are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Immutable snapshot of what the session currently shows. Replaced
/// wholesale, never edited in place.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub generation: u64,
    pub outcome: Option<SearchOutcome>,
    pub accessibility: Option<Accessibility>,
    pub surface: Option<Arc<Surface>>,
    pub pinned: Option<PinnedProbe>,
}

impl SessionState {
    fn from_outcome(generation: Generation, outcome: SearchOutcome) -> Self {
        let accessibility = outcome.accessibility();
        let surface = accessibility.as_ref().map(|a| Arc::new(a.surface()));

        Self {
            generation: generation.get(),
            outcome: Some(outcome),
            accessibility,
            surface,
            pinned: None,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.accessibility.as_ref().map(Accessibility::mode)
    }

    pub fn probe(&self, point: GeoPoint) -> Option<ProbeResult> {
        self.surface.as_ref()?.probe(point)
    }
}

#[derive(Default)]
pub struct Session {
    generation: AtomicU64,
    state: RwLock<Arc<SessionState>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<SessionState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<SessionState>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self) -> Generation {
        Generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation.load(Ordering::SeqCst) == generation.get()
    }

    /// Installs `state` unless a newer search or reset has started since
    /// `generation` was handed out.
    fn install(&self, generation: Generation, state: SessionState) -> bool {
        let mut guard = self.write();
        if !self.is_current(generation) {
            warn!(generation = generation.get(), "discarding superseded result");
            return false;
        }

        *guard = Arc::new(state);
        true
    }

    pub fn commit(&self, generation: Generation, outcome: SearchOutcome) -> bool {
        // The surface is built before taking the lock
        self.install(generation, SessionState::from_outcome(generation, outcome))
    }

    pub async fn search<S: StationServices + Sync>(
        &self,
        services: &S,
        request: &SearchRequest,
    ) -> Result<Arc<SessionState>, SearchError> {
        if request.is_empty() {
            return Err(SearchError::NoAddress);
        }

        let generation = self.begin();
        info!(
            generation = generation.get(),
            address1 = %request.address1,
            address2 = %request.address2,
            "search started"
        );

        match search(services, request).await {
            Ok(outcome) => {
                if !self.commit(generation, outcome) {
                    return Err(SearchError::Superseded);
                }

                let state = self.snapshot();
                info!(generation = generation.get(), mode = ?state.mode(), "search finished");
                Ok(state)
            }
            Err(e) => {
                let cleared = SessionState {
                    generation: generation.get(),
                    ..SessionState::default()
                };
                if !self.install(generation, cleared) {
                    return Err(SearchError::Superseded);
                }

                warn!(generation = generation.get(), error = %e, "search failed");
                Err(e)
            }
        }
    }

    /// Drops results and pin, and invalidates any search still in flight.
    pub fn reset(&self) {
        let generation = self.begin();
        let mut guard = self.write();
        *guard = Arc::new(SessionState {
            generation: generation.get(),
            ..SessionState::default()
        });
        info!(generation = generation.get(), "session reset");
    }

    /// `None` when there is nothing to probe against.
    pub fn pin(&self, point: GeoPoint) -> Option<PinnedProbe> {
        let mut guard = self.write();
        let pinned = PinnedProbe::new(point, &guard.probe(point)?);

        let mut next = (**guard).clone();
        next.pinned = Some(pinned.clone());
        *guard = Arc::new(next);

        Some(pinned)
    }

    /// Returns whether a pin was removed.
    pub fn unpin(&self) -> bool {
        let mut guard = self.write();
        if guard.pinned.is_none() {
            return false;
        }

        let mut next = (**guard).clone();
        next.pinned = None;
        *guard = Arc::new(next);
        true
    }
}
