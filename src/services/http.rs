use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};

use crate::{
    geo::GeoPoint,
    services::{NearestStation, StationServices, coordinate_from_value},
};

const GEOCODE: &str = "/api/geocode";
const NEAREST_STATION: &str = "/api/nearest-station";
const CONTOUR_DATA: &str = "/api/contour-data";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("{endpoint} returned an unusable payload")]
    Malformed { endpoint: &'static str },
}

/// JSON-over-HTTP client for the upstream lookup service.
#[derive(Clone, Debug)]
pub struct HttpServices {
    client: Client,
    base_url: String,
}

impl HttpServices {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("subway_isochrones/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn post(&self, endpoint: &'static str, body: &Value) -> Result<Value, LookupError> {
        let url = format!("{}{endpoint}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| LookupError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|source| LookupError::Transport { endpoint, source })
    }
}

impl StationServices for HttpServices {
    type Error = LookupError;

    async fn geocode(&self, address: &str) -> Result<GeoPoint, LookupError> {
        let value = self.post(GEOCODE, &json!({ "address": address })).await?;
        coordinate_from_value(&value).ok_or(LookupError::Malformed { endpoint: GEOCODE })
    }

    async fn nearest_station(&self, point: GeoPoint) -> Result<NearestStation, LookupError> {
        let body = json!({ "lat": point.lat, "lng": point.lng });
        let value = self.post(NEAREST_STATION, &body).await?;
        NearestStation::from_value(&value).ok_or(LookupError::Malformed {
            endpoint: NEAREST_STATION,
        })
    }

    async fn contour_data(&self, station_name: &str) -> Result<Value, LookupError> {
        self.post(CONTOUR_DATA, &json!({ "station_name": station_name }))
            .await
    }
}
