//! Message channel between the wizard and the embedded map surface.
//!
//! The surface renders independently and announces itself with `mapReady`.
//! Anything sent before that is queued and flushed, in send order, once
//! readiness is observed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument, warn};

use crate::config::MapBridgeConfig;
use crate::errors::ServiceError;
use crate::models::{Coordinate, LocationStep};

/// Wire schema shared with the map surface (serialized JSON, `type` tag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapMessage {
    MapReady,
    MapClick {
        coords: Coordinate,
    },
    AddMarker {
        coords: Coordinate,
        step: LocationStep,
        address: String,
    },
    ShowRoute {
        origin: Coordinate,
        destination: Coordinate,
    },
    UpdateCurrentLocation {
        coords: Coordinate,
    },
}

/// Inbound messages the wizard has to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    Ready,
    Click(Coordinate),
}

/// Host-side messaging primitive towards the rendered map.
#[async_trait]
pub trait MapSurface: Send + Sync {
    async fn post_message(&self, payload: String) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct Outbox {
    queue: VecDeque<MapMessage>,
    markers: HashMap<LocationStep, Coordinate>,
}

#[derive(Clone)]
pub struct MapBridge {
    surface: Arc<dyn MapSurface>,
    config: MapBridgeConfig,
    outbox: Arc<Mutex<Outbox>>,
    ready: Arc<watch::Sender<bool>>,
}

impl MapBridge {
    pub fn new(surface: Arc<dyn MapSurface>, config: MapBridgeConfig) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            surface,
            config,
            outbox: Arc::new(Mutex::new(Outbox::default())),
            ready: Arc::new(ready),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Queues a message and delivers everything queued if the map is ready.
    pub async fn send(&self, message: MapMessage) {
        let mut outbox = self.outbox.lock().await;
        outbox.queue.push_back(message);
        if self.is_ready() {
            self.deliver(&mut outbox).await;
        } else {
            debug!(pending = outbox.queue.len(), "Map not ready; message queued");
        }
    }

    /// Places the marker for a route point. Once both points have markers the
    /// route between them is requested as well.
    pub async fn place_marker(&self, step: LocationStep, coords: Coordinate, address: &str) {
        let mut outbox = self.outbox.lock().await;
        outbox.markers.insert(step, coords);
        outbox.queue.push_back(MapMessage::AddMarker {
            coords,
            step,
            address: address.to_string(),
        });

        let origin = outbox.markers.get(&LocationStep::Origin).copied();
        let destination = outbox.markers.get(&LocationStep::Destination).copied();
        if let (Some(origin), Some(destination)) = (origin, destination) {
            outbox.queue.push_back(MapMessage::ShowRoute {
                origin,
                destination,
            });
        }

        if self.is_ready() {
            self.deliver(&mut outbox).await;
        }
    }

    /// Forgets the marker of a point that is being re-entered.
    pub async fn clear_marker(&self, step: LocationStep) {
        self.outbox.lock().await.markers.remove(&step);
    }

    pub async fn update_current_location(&self, coords: Coordinate) {
        self.send(MapMessage::UpdateCurrentLocation { coords }).await;
    }

    /// Handles a raw message posted by the map surface.
    ///
    /// Malformed payloads are logged and ignored.
    #[instrument(skip(self, raw))]
    pub async fn receive(&self, raw: &str) -> Option<MapEvent> {
        let message = match serde_json::from_str::<MapMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                let err = ServiceError::MapBridgeParseError(e.to_string());
                warn!(payload = %raw, "{}", err);
                return None;
            }
        };

        match message {
            MapMessage::MapReady => {
                self.ready.send_replace(true);
                let mut outbox = self.outbox.lock().await;
                self.deliver(&mut outbox).await;
                Some(MapEvent::Ready)
            }
            MapMessage::MapClick { coords } => Some(MapEvent::Click(coords)),
            other => {
                debug!(?other, "Ignoring unexpected inbound map message");
                None
            }
        }
    }

    /// Waits for the `mapReady` handshake with a bounded number of checks at
    /// doubling intervals, then flushes the queue.
    ///
    /// Returns whether readiness was observed. When it was not, the queue is
    /// still pushed best-effort; undelivered messages stay queued for the
    /// next `mapReady`.
    pub async fn wait_until_ready(&self) -> bool {
        let mut ready_rx = self.ready.subscribe();
        let mut delay = Duration::from_millis(self.config.ready_base_delay_ms);

        for attempt in 1..=self.config.ready_max_attempts {
            if self.is_ready() {
                break;
            }
            let observed =
                tokio::time::timeout(delay, ready_rx.wait_for(|ready| *ready)).await;
            if matches!(observed, Ok(Ok(_))) {
                break;
            }
            debug!(attempt, ?delay, "Map surface not ready yet");
            delay *= 2;
        }

        let ready = self.is_ready();
        if !ready {
            warn!(
                attempts = self.config.ready_max_attempts,
                "Map surface never signalled readiness; sending queued messages anyway"
            );
        }
        let mut outbox = self.outbox.lock().await;
        self.deliver(&mut outbox).await;
        ready
    }

    async fn deliver(&self, outbox: &mut Outbox) {
        while let Some(message) = outbox.queue.front() {
            let payload = match serde_json::to_string(message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Dropping unserializable map message: {}", e);
                    outbox.queue.pop_front();
                    continue;
                }
            };
            match self.surface.post_message(payload).await {
                Ok(()) => {
                    outbox.queue.pop_front();
                }
                Err(e) => {
                    warn!(pending = outbox.queue.len(), "Map delivery failed: {}", e);
                    break;
                }
            }
        }
    }
}
