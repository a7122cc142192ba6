use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::GeocodingConfig;
use crate::errors::ServiceError;
use crate::models::Coordinate;

/// One forward lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    pub label: String,
    pub coordinate: Coordinate,
}

/// External geocoding lookup (forward and reverse).
///
/// An empty candidate list or a `None` label is a healthy "nothing found"
/// answer; `Err` is reserved for transport and protocol failures.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<GeocodeCandidate>, ServiceError>;

    async fn reverse(&self, coordinate: Coordinate, zoom: u8) -> Result<Option<String>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct SearchPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReversePlace {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a Nominatim-compatible geocoding service.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(config: &GeocodingConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ServiceError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, ServiceError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::NetworkError(format!(
                "Geocoding service returned {}",
                status
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl GeocodingProvider for NominatimClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<GeocodeCandidate>, ServiceError> {
        let body = self
            .get(
                "search",
                &[
                    ("q", query.to_string()),
                    ("format", "json".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let places: Vec<SearchPlace> = serde_json::from_str(&body).map_err(|e| {
            ServiceError::NetworkError(format!("Unexpected geocoding response: {}", e))
        })?;

        let candidates: Vec<GeocodeCandidate> = places
            .into_iter()
            .filter_map(|place| {
                let latitude = place.lat.trim().parse::<f64>().ok()?;
                let longitude = place.lon.trim().parse::<f64>().ok()?;
                Some(GeocodeCandidate {
                    label: place.display_name,
                    coordinate: Coordinate::new(latitude, longitude),
                })
            })
            .collect();

        debug!(count = candidates.len(), "Forward lookup finished");
        Ok(candidates)
    }

    #[instrument(skip(self))]
    async fn reverse(&self, coordinate: Coordinate, zoom: u8) -> Result<Option<String>, ServiceError> {
        let body = self
            .get(
                "reverse",
                &[
                    ("lat", coordinate.latitude.to_string()),
                    ("lon", coordinate.longitude.to_string()),
                    ("format", "json".to_string()),
                    ("zoom", zoom.to_string()),
                ],
            )
            .await?;

        let place: ReversePlace = serde_json::from_str(&body).map_err(|e| {
            ServiceError::NetworkError(format!("Unexpected geocoding response: {}", e))
        })?;

        if let Some(error) = place.error {
            debug!(%error, "Reverse lookup returned no place");
            return Ok(None);
        }
        Ok(place
            .display_name
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty()))
    }
}
