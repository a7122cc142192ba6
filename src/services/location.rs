use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::GeocodingConfig;
use crate::errors::{ServiceError, Violation};
use crate::map_bridge::MapBridge;
use crate::models::{AddressPoint, Coordinate, LocationStep};
use crate::services::geocoding::{GeocodeCandidate, GeocodingProvider};

/// Single-shot "current position" query of the device.
///
/// A user who denies access yields `LocationPermissionDenied`.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, ServiceError>;
}

/// Turns typed addresses, tapped points and the device position into
/// [`AddressPoint`]s.
#[derive(Clone)]
pub struct LocationResolver {
    provider: Arc<dyn GeocodingProvider>,
    device: Option<Arc<dyn DeviceLocator>>,
    bridge: MapBridge,
    breaker: CircuitBreaker,
    config: GeocodingConfig,
}

impl LocationResolver {
    pub fn new(
        provider: Arc<dyn GeocodingProvider>,
        bridge: MapBridge,
        config: GeocodingConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            "geocoding",
            CircuitBreakerConfig {
                failure_threshold: config.breaker_failure_threshold,
                timeout: Duration::from_secs(config.breaker_reset_secs),
            },
        );
        Self {
            provider,
            device: None,
            bridge,
            breaker,
            config,
        }
    }

    pub fn with_device_locator(mut self, device: Arc<dyn DeviceLocator>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn bridge(&self) -> &MapBridge {
        &self.bridge
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Forward lookup variants, tried in order: the text with each locality
    /// suffix, then the text alone.
    pub fn query_variants(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        let lowered = text.to_lowercase();
        let mut variants: Vec<String> = Vec::with_capacity(self.config.locality_suffixes.len() + 1);

        for suffix in &self.config.locality_suffixes {
            if lowered.ends_with(&suffix.to_lowercase()) {
                continue;
            }
            variants.push(format!("{}, {}", text, suffix));
        }
        variants.push(text.to_string());
        variants.dedup();
        variants
    }

    /// Picks the candidate inside the expected region, else the first one.
    pub fn pick_candidate(&self, candidates: Vec<GeocodeCandidate>) -> Option<GeocodeCandidate> {
        let hint = self.config.region_hint.to_lowercase();
        let in_region = candidates
            .iter()
            .position(|c| !hint.is_empty() && c.label.to_lowercase().contains(&hint));
        let index = in_region.unwrap_or(0);
        candidates.into_iter().nth(index)
    }

    /// Resolves free text to a point without touching the map.
    #[instrument(skip(self))]
    pub async fn locate_address(&self, text: &str) -> Result<AddressPoint, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Validation(vec![Violation::new(
                "address",
                "Enter an address to search for",
            )]));
        }

        let variants = self.query_variants(text);
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            for query in &variants {
                match self.search(query).await {
                    Ok(candidates) => {
                        if let Some(candidate) = self.pick_candidate(candidates) {
                            info!(%query, label = %candidate.label, "Address resolved");
                            return Ok(AddressPoint::resolved(
                                text,
                                candidate.label,
                                candidate.coordinate,
                            ));
                        }
                        debug!(%query, "No candidates for query variant");
                    }
                    Err(ServiceError::CircuitBreakerOpen) => {
                        warn!("Geocoding circuit open; skipping lookup");
                        return Err(ServiceError::CircuitBreakerOpen);
                    }
                    Err(e) => warn!(%query, attempt, "Geocoding lookup failed: {}", e),
                }
            }

            if attempt < attempts {
                warn!(attempt, "No geocoding candidates; retrying");
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        Err(ServiceError::GeocodingNotFound {
            query: text.to_string(),
        })
    }

    /// Resolves free text and places the marker for `step` on the map.
    #[instrument(skip(self))]
    pub async fn resolve_address(
        &self,
        text: &str,
        step: LocationStep,
    ) -> Result<AddressPoint, ServiceError> {
        let point = self.locate_address(text).await?;
        self.show_on_map(step, &point).await;
        Ok(point)
    }

    /// Sends the `addMarker` message for an accepted point.
    pub async fn show_on_map(&self, step: LocationStep, point: &AddressPoint) {
        if let Some(coordinate) = point.coordinate {
            self.bridge
                .place_marker(step, coordinate, point.display_label())
                .await;
        }
    }

    /// Label for a coordinate. Never fails: when no zoom level yields a
    /// label the coordinate itself is used.
    #[instrument(skip(self))]
    pub async fn reverse_geocode(&self, coordinate: Coordinate) -> String {
        for &zoom in &self.config.reverse_zoom_levels {
            match self.reverse(coordinate, zoom).await {
                Ok(Some(label)) => return label,
                Ok(None) => debug!(zoom, "No label at zoom level"),
                Err(ServiceError::CircuitBreakerOpen) => break,
                Err(e) => debug!(zoom, "Reverse lookup failed: {}", e),
            }
        }

        warn!(%coordinate, "ReverseGeocodingDegraded: using coordinate label");
        coordinate.fallback_label()
    }

    /// Resolves a point tapped on the map.
    #[instrument(skip(self))]
    pub async fn resolve_tapped_point(&self, coordinate: Coordinate) -> AddressPoint {
        self.point_for(coordinate).await
    }

    /// Resolves the device position to a labelled point.
    #[instrument(skip(self))]
    pub async fn resolve_current_device_position(&self) -> Result<AddressPoint, ServiceError> {
        let device = self.device.as_ref().ok_or_else(|| {
            ServiceError::DeviceLocationUnavailable("no device locator configured".to_string())
        })?;
        let coordinate = device.current_position().await?;
        Ok(self.point_for(coordinate).await)
    }

    async fn point_for(&self, coordinate: Coordinate) -> AddressPoint {
        let label = self.reverse_geocode(coordinate).await;
        if label == coordinate.fallback_label() {
            AddressPoint::fallback(coordinate)
        } else {
            AddressPoint::resolved(label.clone(), label, coordinate)
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, ServiceError> {
        let limit = self.config.result_limit;
        let timeout = self.config.timeout();
        self.breaker
            .execute(|| async {
                tokio::time::timeout(timeout, self.provider.search(query, limit))
                    .await
                    .unwrap_or(Err(ServiceError::Timeout))
            })
            .await
    }

    async fn reverse(&self, coordinate: Coordinate, zoom: u8) -> Result<Option<String>, ServiceError> {
        let timeout = self.config.timeout();
        self.breaker
            .execute(|| async {
                tokio::time::timeout(timeout, self.provider.reverse(coordinate, zoom))
                    .await
                    .unwrap_or(Err(ServiceError::Timeout))
            })
            .await
    }
}
