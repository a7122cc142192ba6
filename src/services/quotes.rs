use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::{QuoteApiConfig, ScheduleConfig};
use crate::errors::{ServiceError, Violation};
use crate::models::schedule::parse_time_of_day;
use crate::models::{
    AddressPoint, Carga, Coordinate, FlexibilidadHoraria, Horarios, Peso, PuntoRuta, QuoteRequest,
    QuoteResponse, Ruta, WeightUnit,
};
use crate::services::first_quote::FirstQuoteDetector;
use crate::services::routing::RouteEstimator;
use crate::wizard::WizardState;

/// Remote quote service.
#[async_trait]
pub trait QuoteApi: Send + Sync {
    async fn create_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, ServiceError>;

    /// Quotes of one client (server-side filter).
    async fn list_client_quotes(&self, client_id: &str) -> Result<Vec<Value>, ServiceError>;

    /// Every quote visible to the caller.
    async fn list_quotes(&self) -> Result<Vec<Value>, ServiceError>;
}

/// REST client for the quote backend.
#[derive(Debug, Clone)]
pub struct HttpQuoteApi {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpQuoteApi {
    pub fn new(config: &QuoteApiConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ServiceError::NetworkError(format!("Invalid quote API URL {}: {}", config.base_url, e))
        })?;

        Ok(Self {
            client,
            base_url,
            auth_token: config.auth_token.clone(),
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::NetworkError(format!(
                    "Quote API URL cannot take a path: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ServiceError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::from_status(status, &body));
        }
        serde_json::from_str(&body).map_err(|_| {
            ServiceError::NetworkError(format!(
                "Unexpected response body from quote service (status {})",
                status
            ))
        })
    }

    async fn fetch_list(&self, url: Url) -> Result<Vec<Value>, ServiceError> {
        let response = self.authorized(self.client.get(url)).send().await?;
        match unwrap_envelope(Self::read_json(response).await?, &["data", "quotes"]) {
            Value::Array(items) => Ok(items),
            other => Err(ServiceError::NetworkError(format!(
                "Expected a quote list, got {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl QuoteApi for HttpQuoteApi {
    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    async fn create_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, ServiceError> {
        let response = self
            .authorized(self.client.post(self.endpoint(&["quotes"])?))
            .json(request)
            .send()
            .await?;

        let body = unwrap_envelope(Self::read_json(response).await?, &["data", "quote"]);
        serde_json::from_value(body).map_err(|e| {
            ServiceError::NetworkError(format!("Unexpected quote in response: {}", e))
        })
    }

    #[instrument(skip(self))]
    async fn list_client_quotes(&self, client_id: &str) -> Result<Vec<Value>, ServiceError> {
        self.fetch_list(self.endpoint(&["quotes", "client", client_id])?)
            .await
    }

    #[instrument(skip(self))]
    async fn list_quotes(&self) -> Result<Vec<Value>, ServiceError> {
        self.fetch_list(self.endpoint(&["quotes"])?).await
    }
}

/// Peels `{"data": ...}`-style wrappers the backend puts around payloads.
fn unwrap_envelope(mut value: Value, keys: &[&str]) -> Value {
    loop {
        let inner = keys.iter().find_map(|key| match value.get(*key) {
            Some(inner) if inner.is_object() || inner.is_array() => Some(inner.clone()),
            _ => None,
        });
        match inner {
            Some(inner) => value = inner,
            None => return value,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Departure and arrival instants in the operating timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleTimestamps {
    pub departure: DateTime<FixedOffset>,
    pub arrival: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub quote: QuoteResponse,
    /// Selects the first-quote path in the host
    pub first_quote: bool,
}

/// Validates wizard state, builds the backend payload and submits it.
#[derive(Clone)]
pub struct QuoteAssembler {
    api: Arc<dyn QuoteApi>,
    detector: FirstQuoteDetector,
    quote_config: QuoteApiConfig,
    schedule_config: ScheduleConfig,
}

impl QuoteAssembler {
    pub fn new(
        api: Arc<dyn QuoteApi>,
        quote_config: QuoteApiConfig,
        schedule_config: ScheduleConfig,
    ) -> Self {
        Self {
            detector: FirstQuoteDetector::new(api.clone()),
            api,
            quote_config,
            schedule_config,
        }
    }

    /// Every missing or invalid input, in form order.
    pub fn validate(state: &WizardState) -> Vec<Violation> {
        let mut violations = Vec::new();
        let cargo = state.cargo();
        let schedule = state.schedule();

        if cargo.cargo_type.trim().is_empty() {
            violations.push(Violation::new("cargo_type", "Cargo type is required"));
        }
        if !(cargo.weight_value.is_finite() && cargo.weight_value > 0.0) {
            violations.push(Violation::new("weight", "Weight must be greater than zero"));
        }
        if schedule.request_date.is_none() {
            violations.push(Violation::new("request_date", "Request date is required"));
        }
        if schedule.delivery_date.is_none() {
            violations.push(Violation::new("delivery_date", "Delivery date is required"));
        }
        if parse_time_of_day(&schedule.departure_time).is_none() {
            violations.push(Violation::new(
                "departure_time",
                "Departure time must look like 8:30 AM",
            ));
        }
        if let (Some(request), Some(delivery)) = (schedule.request_date, schedule.delivery_date) {
            if delivery < request {
                violations.push(Violation::new(
                    "delivery_date",
                    "Delivery date cannot be earlier than the request date",
                ));
            }
        }

        violations
    }

    /// Kilograms, rounded to two decimals on the value as stored, so an
    /// input of 5.005 (held as 5.00499...) becomes 5.0.
    pub fn convert_weight(value: f64, unit: WeightUnit) -> f64 {
        round2(value * unit.kg_factor())
    }

    pub fn compose_schedule(
        &self,
        request_date: NaiveDate,
        departure_time: &str,
        eta_minutes: u32,
    ) -> Result<ScheduleTimestamps, ServiceError> {
        let time = parse_time_of_day(departure_time).ok_or_else(|| {
            ServiceError::Validation(vec![Violation::new(
                "departure_time",
                format!("Unrecognised departure time \"{}\"", departure_time),
            )])
        })?;
        let departure = self.local_instant(request_date, time)?;
        let arrival = departure + Duration::minutes(i64::from(eta_minutes));
        Ok(ScheduleTimestamps { departure, arrival })
    }

    fn local_instant(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<DateTime<FixedOffset>, ServiceError> {
        let offset = FixedOffset::east_opt(self.schedule_config.utc_offset_minutes * 60)
            .ok_or_else(|| {
                ServiceError::Other(anyhow::anyhow!(
                    "invalid UTC offset of {} minutes",
                    self.schedule_config.utc_offset_minutes
                ))
            })?;
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or_else(|| ServiceError::Other(anyhow::anyhow!("ambiguous local time {}", date)))
    }

    /// Assembles the backend payload from a completed wizard.
    pub fn build_quote_request(
        &self,
        state: &WizardState,
        client_id: &str,
    ) -> Result<QuoteRequest, ServiceError> {
        let violations = Self::validate(state);
        if !violations.is_empty() {
            return Err(ServiceError::Validation(violations));
        }

        let truck_type = state
            .selected_truck_type()
            .ok_or_else(|| ServiceError::InvalidTransition("No truck type selected".to_string()))?;
        let origin = require_point(state.pickup(), "pickup")?;
        let destination = require_point(state.destination(), "destination")?;
        let route = state
            .route()
            .unwrap_or_else(|| RouteEstimator::estimate(origin, destination));

        let cargo = state.cargo();
        let schedule = state.schedule();
        let (Some(request_date), Some(delivery_date)) = (schedule.request_date, schedule.delivery_date)
        else {
            return Err(ServiceError::InvalidTransition("Schedule dates missing".to_string()));
        };

        let times = self.compose_schedule(request_date, &schedule.departure_time, route.eta_minutes)?;
        let delivery = self.local_instant(delivery_date, times.departure.time())?;

        let pickup_label = state.pickup().display_label().to_string();
        let destination_label = state.destination().display_label().to_string();
        let distance = round2(route.distance_km);
        let weight_kg = Self::convert_weight(cargo.weight_value, cargo.weight_unit);

        let description = if cargo.description.trim().is_empty() {
            format!("{}, {} kg", cargo.cargo_type.trim(), weight_kg)
        } else {
            cargo.description.trim().to_string()
        };

        Ok(QuoteRequest {
            client_id: client_id.to_string(),
            quote_description: description.clone(),
            quote_name: format!("{} - {}", truck_type.label(), cargo.cargo_type.trim()),
            travel_locations: format!("{} → {}", pickup_label, destination_label),
            truck_type,
            fecha_necesaria: times.departure.with_timezone(&Utc),
            delivery_date: delivery.with_timezone(&Utc),
            request_date,
            payment_method: state.payment_method(),
            pickup_location: pickup_label.clone(),
            destination_location: destination_label.clone(),
            estimated_distance: distance,
            ruta: Ruta {
                origen: PuntoRuta {
                    nombre: pickup_label,
                    coordenadas: origin.into(),
                    tipo: "origen".to_string(),
                },
                destino: PuntoRuta {
                    nombre: destination_label,
                    coordenadas: destination.into(),
                    tipo: "destino".to_string(),
                },
                distancia_total: distance,
                tiempo_estimado: route.eta_minutes,
            },
            carga: Carga {
                categoria: cargo.category,
                tipo: cargo.cargo_type.trim().to_string(),
                descripcion: description,
                peso: Peso {
                    valor: weight_kg,
                    unidad: WeightUnit::Kg,
                    valor_original: cargo.weight_value,
                    unidad_original: cargo.weight_unit,
                },
                clasificacion_riesgo: cargo.risk_classification.clone(),
                observaciones: cargo.notes.clone(),
            },
            horarios: Horarios {
                fecha_salida: times.departure.date_naive(),
                hora_salida: times.departure.format("%H:%M").to_string(),
                fecha_llegada_estimada: times.arrival.date_naive(),
                hora_llegada_estimada: times.arrival.format("%H:%M").to_string(),
                tiempo_estimado_viaje: route.eta_minutes,
                flexibilidad_horaria: FlexibilidadHoraria {
                    permitida: self.schedule_config.flexibility_allowed,
                    rango_tolerancia: if self.schedule_config.flexibility_allowed {
                        self.schedule_config.tolerance_minutes
                    } else {
                        0
                    },
                },
            },
            observaciones: state.notes().to_string(),
            created_from: self.quote_config.created_from.clone(),
            version: self.quote_config.payload_version.clone(),
        })
    }

    /// Checks for prior quotes, then sends the request.
    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn submit(&self, request: QuoteRequest) -> Result<SubmissionOutcome, ServiceError> {
        let first_quote = self.detector.is_first_quote(&request.client_id).await;

        match self.api.create_quote(&request).await {
            Ok(quote) => {
                info!(quote_id = %quote.id, first_quote, "Quote submitted");
                Ok(SubmissionOutcome { quote, first_quote })
            }
            Err(e) => {
                error!(status = ?e.status_code(), "Quote submission failed: {}", e);
                Err(e)
            }
        }
    }
}

fn require_point(point: &AddressPoint, name: &str) -> Result<Coordinate, ServiceError> {
    point
        .coordinate
        .ok_or_else(|| ServiceError::InvalidTransition(format!("The {} location is not set", name)))
}

// Scaling by 100 first would turn 5.005 into 500.50000000000006.
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
