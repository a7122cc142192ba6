use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CargoCategory, Coordinate, PaymentMethod, TruckType, WeightUnit};

/// Quote payload accepted by the backend's create operation.
///
/// Field names are the backend's wire names; the nested `ruta`, `carga` and
/// `horarios` blocks are what the dispatch team reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub client_id: String,
    pub quote_description: String,
    pub quote_name: String,
    pub travel_locations: String,
    pub truck_type: TruckType,
    pub fecha_necesaria: DateTime<Utc>,
    pub delivery_date: DateTime<Utc>,
    pub request_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub pickup_location: String,
    pub destination_location: String,
    pub estimated_distance: f64,
    pub ruta: Ruta,
    pub carga: Carga,
    pub horarios: Horarios,
    pub observaciones: String,
    pub created_from: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ruta {
    pub origen: PuntoRuta,
    pub destino: PuntoRuta,
    /// Kilometres, two decimals
    pub distancia_total: f64,
    /// Minutes
    pub tiempo_estimado: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuntoRuta {
    pub nombre: String,
    pub coordenadas: Coordenadas,
    /// "origen" or "destino"
    pub tipo: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordenadas {
    pub lat: f64,
    pub lng: f64,
}

impl From<Coordinate> for Coordenadas {
    fn from(coordinate: Coordinate) -> Self {
        Self {
            lat: coordinate.latitude,
            lng: coordinate.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Carga {
    pub categoria: CargoCategory,
    pub tipo: String,
    pub descripcion: String,
    pub peso: Peso,
    pub clasificacion_riesgo: String,
    pub observaciones: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peso {
    /// Always kilograms
    pub valor: f64,
    pub unidad: WeightUnit,
    pub valor_original: f64,
    pub unidad_original: WeightUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Horarios {
    pub fecha_salida: NaiveDate,
    /// 24-hour "HH:MM"
    pub hora_salida: String,
    pub fecha_llegada_estimada: NaiveDate,
    pub hora_llegada_estimada: String,
    /// Minutes
    pub tiempo_estimado_viaje: u32,
    pub flexibilidad_horaria: FlexibilidadHoraria,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexibilidadHoraria {
    pub permitida: bool,
    /// Minutes either side of the departure time
    pub rango_tolerancia: u32,
}

/// Quote as returned by the backend after creation or in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawQuoteResponse")]
pub struct QuoteResponse {
    pub id: String,
    pub status: Option<String>,
    pub quote_name: Option<String>,
    pub client_id: Option<String>,
}

// Backends send `_id`, `id`, `quoteId` or several of them at once.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuoteResponse {
    #[serde(rename = "_id", default)]
    mongo_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    quote_id: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    quote_name: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

impl TryFrom<RawQuoteResponse> for QuoteResponse {
    type Error = String;

    fn try_from(raw: RawQuoteResponse) -> Result<Self, Self::Error> {
        let id = [raw.mongo_id, raw.id, raw.quote_id]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::String(text) if !text.is_empty() => Some(text),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .ok_or_else(|| "quote response carries no `_id`, `id` or `quoteId`".to_string())?;

        Ok(Self {
            id,
            status: raw.status,
            quote_name: raw.quote_name,
            client_id: raw.client_id,
        })
    }
}
