//! Per-model configuration values.
//!
//! These are plain serde structs. Commodity and recipe references are names;
//! the factory resolves them through the [`Catalog`](crate::catalog::Catalog)
//! when it constructs a model. Quantities are `f64` here and become
//! [`Fixed64`](crate::fixed::Fixed64) at construction.

use crate::catalog::CatalogError;
use crate::fixed::{Fixed64, Quantity, Ticks};
use serde::{Deserialize, Serialize};

/// One input to output conversion channel of a production facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelPairConfig {
    pub in_commodity: String,
    pub in_recipe: String,
    pub out_commodity: String,
    pub out_recipe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReactorConfig {
    /// Ticks of operation between refuelings.
    pub cycle_length: Ticks,
    /// Ticks after which the facility shuts down.
    pub lifetime: Ticks,
    /// Mass of a full core.
    pub core_loading: f64,
    /// Batches per core. One batch is swapped at each refueling.
    pub batches: u32,
    pub fuel_pairs: Vec<FuelPairConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub commodity: String,
    pub recipe: String,
    /// Maximum quantity offered and shipped per step.
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub commodities: Vec<String>,
    /// Maximum quantity requested per step, per commodity.
    pub capacity: f64,
    /// Total inventory bound. Unbounded when absent.
    #[serde(default)]
    pub inventory_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub commodity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionConfig {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {}

/// Configuration for any built-in model type, tagged by type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelConfig {
    BatchReactor(BatchReactorConfig),
    Source(SourceConfig),
    Sink(SinkConfig),
    Market(MarketConfig),
    Institution(InstitutionConfig),
    Region(RegionConfig),
}

impl ModelConfig {
    /// The model type name this configuration belongs to.
    pub fn model_type(&self) -> &'static str {
        match self {
            ModelConfig::BatchReactor(_) => "BatchReactor",
            ModelConfig::Source(_) => "Source",
            ModelConfig::Sink(_) => "Sink",
            ModelConfig::Market(_) => "Market",
            ModelConfig::Institution(_) => "Institution",
            ModelConfig::Region(_) => "Region",
        }
    }
}

/// Errors raised while turning configuration into a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown model type: {0}")]
    UnknownModelType(String),
    #[error("model type {expected} cannot be built from a {found} configuration")]
    WrongModelType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid {model} configuration: {reason}")]
    Invalid { model: &'static str, reason: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ConfigError {
    pub(crate) fn invalid(model: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            model,
            reason: reason.into(),
        }
    }
}

/// Convert a configured quantity, rejecting values `Fixed64` cannot hold and
/// negative ones.
pub(crate) fn quantity(model: &'static str, field: &str, value: f64) -> Result<Quantity, ConfigError> {
    match Fixed64::checked_from_num(value) {
        Some(q) if q >= Fixed64::ZERO => Ok(q),
        _ => Err(ConfigError::invalid(
            model,
            format!("{field} must be a non-negative finite quantity, got {value}"),
        )),
    }
}
