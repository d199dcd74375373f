use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::ChargerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyType {
    Electric,
    Gasoline,
}

impl EnergyType {
    /// Unit of stored energy for this type.
    pub fn units(&self) -> &'static str {
        match self {
            EnergyType::Electric => "kwh",
            EnergyType::Gasoline => "gal_gasoline",
        }
    }
}

impl fmt::Display for EnergyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyType::Electric => f.write_str("electric"),
            EnergyType::Gasoline => f.write_str("gasoline"),
        }
    }
}

/// A kind of charger (or fuel pump).
///
/// `rate` is kilowatts for electric chargers and gallons per second for pumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charger {
    pub id: ChargerId,
    pub energy_type: EnergyType,
    pub rate: f64,
    pub units: String,
}

impl Charger {
    pub fn electric(id: impl Into<ChargerId>, rate_kw: f64) -> Self {
        Self {
            id: id.into(),
            energy_type: EnergyType::Electric,
            rate: rate_kw,
            units: "kw".to_string(),
        }
    }

    pub fn gasoline(id: impl Into<ChargerId>, gallons_per_second: f64) -> Self {
        Self {
            id: id.into(),
            energy_type: EnergyType::Gasoline,
            rate: gallons_per_second,
            units: "gal_per_second".to_string(),
        }
    }

    pub fn with_rate(&self, rate: f64) -> Self {
        Self {
            rate,
            ..self.clone()
        }
    }
}
