use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Truck body types offered by the fleet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TruckType {
    Pickup,
    CamionPequeno,
    Furgon,
    Plataforma,
    Refrigerado,
    Rastra,
}

impl TruckType {
    /// Name shown in the quote summary.
    pub fn label(self) -> &'static str {
        match self {
            TruckType::Pickup => "Pick-up",
            TruckType::CamionPequeno => "Camión pequeño",
            TruckType::Furgon => "Furgón",
            TruckType::Plataforma => "Plataforma",
            TruckType::Refrigerado => "Camión refrigerado",
            TruckType::Rastra => "Rastra",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
    Ton,
}

impl WeightUnit {
    /// Kilograms per one unit.
    pub fn kg_factor(self) -> f64 {
        match self {
            WeightUnit::Kg => 1.0,
            WeightUnit::Lb => 0.453592,
            WeightUnit::Ton => 1000.0,
        }
    }
}

/// Handling category of the load.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CargoCategory {
    #[default]
    General,
    Perecedera,
    Fragil,
    Peligrosa,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoDetails {
    /// Free-text kind of goods, e.g. "electrodomésticos"
    pub cargo_type: String,
    pub category: CargoCategory,
    pub description: String,
    pub weight_value: f64,
    pub weight_unit: WeightUnit,
    pub risk_classification: String,
    pub notes: String,
}

impl Default for CargoDetails {
    fn default() -> Self {
        Self {
            cargo_type: String::new(),
            category: CargoCategory::General,
            description: String::new(),
            weight_value: 0.0,
            weight_unit: WeightUnit::Kg,
            risk_classification: "bajo".to_string(),
            notes: String::new(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentMethod {
    #[default]
    Cash,
    Transfer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn truck_types_parse_from_wire_names() {
        for truck in TruckType::iter() {
            let wire = serde_json::to_value(truck).unwrap();
            assert_eq!(wire.as_str().unwrap(), truck.to_string());
            assert_eq!(TruckType::from_str(&truck.to_string()).unwrap(), truck);
        }
        assert_eq!(TruckType::from_str("FURGON").unwrap(), TruckType::Furgon);
    }

    #[test]
    fn weight_unit_names() {
        assert_eq!(WeightUnit::from_str("LB").unwrap(), WeightUnit::Lb);
        assert_eq!(WeightUnit::Ton.to_string(), "ton");
        assert!(WeightUnit::from_str("stone").is_err());
    }
}
