#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use freight_quote::{
    config::{GeocodingConfig, MapBridgeConfig, QuoteApiConfig, ScheduleConfig},
    events::{EventSender, WizardEvent},
    models::{CargoDetails, TruckType},
    services::{
        geocoding::NominatimClient,
        location::DeviceLocator,
        quotes::HttpQuoteApi,
    },
    Coordinate, LocationResolver, MapBridge, MapMessage, MapSurface, QuoteAssembler, ServiceError,
    WizardController,
};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub const CLIENT_ID: &str = "client-42";

/// Matches forward lookups whose `q` parameter contains the given text.
pub struct QueryContains(pub String);

impl Match for QueryContains {
    fn matches(&self, request: &Request) -> bool {
        request
            .url
            .query_pairs()
            .any(|(key, value)| key == "q" && value.contains(self.0.as_str()))
    }
}

/// Map surface that keeps every payload it was sent.
#[derive(Default)]
pub struct RecordingSurface {
    sent: Mutex<Vec<String>>,
}

impl RecordingSurface {
    pub fn messages(&self) -> Vec<MapMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("bridge sent invalid JSON"))
            .collect()
    }
}

#[async_trait]
impl MapSurface for RecordingSurface {
    async fn post_message(&self, payload: String) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Device locator returning a fixed answer.
pub struct FixedDevice(pub Result<Coordinate, ()>);

#[async_trait]
impl DeviceLocator for FixedDevice {
    async fn current_position(&self) -> Result<Coordinate, ServiceError> {
        self.0.map_err(|_| ServiceError::LocationPermissionDenied)
    }
}

pub fn geocoding_config(base_url: &str) -> GeocodingConfig {
    GeocodingConfig {
        base_url: base_url.to_string(),
        retry_delay_ms: 10,
        ..GeocodingConfig::default()
    }
}

pub fn resolver_for(
    config: GeocodingConfig,
    surface: Arc<RecordingSurface>,
) -> LocationResolver {
    let bridge = MapBridge::new(
        surface,
        MapBridgeConfig {
            ready_max_attempts: 3,
            ready_base_delay_ms: 5,
        },
    );
    let client = NominatimClient::new(&config).expect("geocoding client");
    LocationResolver::new(Arc::new(client), bridge, config)
}

pub fn assembler_for(base_url: &str) -> QuoteAssembler {
    let config = QuoteApiConfig {
        base_url: base_url.to_string(),
        auth_token: Some("test-token".to_string()),
        ..QuoteApiConfig::default()
    };
    let api = HttpQuoteApi::new(&config).expect("quote client");
    QuoteAssembler::new(Arc::new(api), config, ScheduleConfig::default())
}

/// A wizard wired against mock geocoding and quote services.
pub struct TestApp {
    pub geocoder: MockServer,
    pub quotes: MockServer,
    pub surface: Arc<RecordingSurface>,
    pub controller: WizardController,
    pub events: mpsc::Receiver<WizardEvent>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    pub async fn with_device(device: FixedDevice) -> Self {
        Self::build(Some(device)).await
    }

    async fn build(device: Option<FixedDevice>) -> Self {
        let geocoder = MockServer::start().await;
        let quotes = MockServer::start().await;
        let surface = Arc::new(RecordingSurface::default());

        let mut resolver = resolver_for(geocoding_config(&geocoder.uri()), surface.clone());
        if let Some(device) = device {
            resolver = resolver.with_device_locator(Arc::new(device));
        }

        let (events, rx) = EventSender::channel(64);
        let controller = WizardController::new(
            resolver,
            assembler_for(&quotes.uri()),
            CLIENT_ID,
            &ScheduleConfig::default(),
        )
        .with_events(events);

        Self {
            geocoder,
            quotes,
            surface,
            controller,
            events: rx,
        }
    }

    /// Answers forward lookups whose query contains `needle` with one place.
    pub async fn mount_place(&self, needle: &str, lat: f64, lon: f64, label: &str) {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(QueryContains(needle.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"lat": lat.to_string(), "lon": lon.to_string(), "display_name": label}
            ])))
            .mount(&self.geocoder)
            .await;
    }

    pub async fn mount_reverse(&self, label: &str) {
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"display_name": label})))
            .mount(&self.geocoder)
            .await;
    }

    pub async fn mount_routes(&self) {
        self.mount_place(
            "Calle Principal",
            13.6989,
            -89.1914,
            "Calle Principal, San Salvador, El Salvador",
        )
        .await;
        self.mount_place(
            "Avenida Independencia",
            13.7034,
            -89.1797,
            "Avenida Independencia, San Salvador, El Salvador",
        )
        .await;
    }

    pub async fn mount_quote_api(&self, prior_quotes: serde_json::Value, created_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/quotes/client/{}", CLIENT_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(prior_quotes))
            .mount(&self.quotes)
            .await;
        Mock::given(method("POST"))
            .and(path("/quotes"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {"_id": created_id, "status": "pendiente"}
            })))
            .mount(&self.quotes)
            .await;
    }

    /// Runs both location steps and lands on truck selection.
    pub async fn advance_to_truck_selection(&self) {
        self.controller
            .resolve_address("Calle Principal, San Salvador")
            .await
            .expect("pickup lookup")
            .expect("pickup applied");
        self.controller.confirm_origin().await.expect("confirm origin");
        self.controller
            .resolve_address("Avenida Independencia")
            .await
            .expect("destination lookup")
            .expect("destination applied");
        self.controller
            .confirm_destination()
            .await
            .expect("confirm destination");
    }

    pub async fn advance_to_details(&self) {
        self.advance_to_truck_selection().await;
        self.controller
            .select_truck(TruckType::Furgon)
            .await
            .expect("select truck");
        self.controller
            .proceed_to_details()
            .await
            .expect("details");
    }

    pub async fn fill_details(&self) {
        self.controller
            .set_cargo(CargoDetails {
                cargo_type: "electrodomésticos".into(),
                weight_value: 500.0,
                ..CargoDetails::default()
            })
            .await
            .expect("cargo");
        self.controller
            .set_request_date(NaiveDate::from_ymd_opt(2024, 6, 3))
            .await
            .expect("request date");
        self.controller
            .set_delivery_date(NaiveDate::from_ymd_opt(2024, 6, 4))
            .await
            .expect("delivery date");
    }

    pub fn drain_events(&mut self) -> Vec<WizardEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
