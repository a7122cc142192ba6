use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cargo;
pub mod quote;
pub mod schedule;

pub use cargo::*;
pub use quote::*;
pub use schedule::ScheduleDetails;

/// Geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Label used when no geocoded name is available.
    pub fn fallback_label(&self) -> String {
        format!("Ubicación: {:.5}, {:.5}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Which of the two route points an operation refers to.
///
/// Serialized as the map surface's step index (1 = pickup, 2 = destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LocationStep {
    Origin,
    Destination,
}

impl LocationStep {
    pub fn index(self) -> u8 {
        match self {
            LocationStep::Origin => 1,
            LocationStep::Destination => 2,
        }
    }
}

impl From<LocationStep> for u8 {
    fn from(step: LocationStep) -> Self {
        step.index()
    }
}

impl TryFrom<u8> for LocationStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(LocationStep::Origin),
            2 => Ok(LocationStep::Destination),
            other => Err(format!("invalid location step {}", other)),
        }
    }
}

impl fmt::Display for LocationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationStep::Origin => f.write_str("origin"),
            LocationStep::Destination => f.write_str("destination"),
        }
    }
}

/// How trustworthy the coordinate/label pair of an [`AddressPoint`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Nothing resolved yet
    #[default]
    None,
    /// Coordinate known but the label was synthesized from it
    Fallback,
    /// Coordinate and label both came from the geocoding service
    Resolved,
}

/// A pickup or destination point as entered and resolved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddressPoint {
    pub raw_text: String,
    pub resolved_label: String,
    pub coordinate: Option<Coordinate>,
    pub confidence: Confidence,
}

impl AddressPoint {
    pub fn unresolved(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Default::default()
        }
    }

    pub fn resolved(raw_text: impl Into<String>, label: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            raw_text: raw_text.into(),
            resolved_label: label.into(),
            coordinate: Some(coordinate),
            confidence: Confidence::Resolved,
        }
    }

    pub fn fallback(coordinate: Coordinate) -> Self {
        let label = coordinate.fallback_label();
        Self {
            raw_text: label.clone(),
            resolved_label: label,
            coordinate: Some(coordinate),
            confidence: Confidence::Fallback,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinate.is_some()
    }

    /// Best label to show or send: the resolved one, else what the user typed.
    pub fn display_label(&self) -> &str {
        if self.resolved_label.is_empty() {
            &self.raw_text
        } else {
            &self.resolved_label
        }
    }
}

/// Great-circle distance and heuristic travel time between the two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub eta_minutes: u32,
}
