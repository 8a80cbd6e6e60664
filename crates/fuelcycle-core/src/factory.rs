//! Model registry: maps a model-type name to its constructor.
//!
//! The factory is how configuration becomes agents. Every built-in type is
//! registered by [`ModelFactory::with_builtins`]; other crates can add their
//! own with [`ModelFactory::register`].

use crate::agent::Model;
use crate::agents::{
    BatchReactor, InstitutionAgent, Market, RegionAgent, SinkFacility, SourceFacility,
};
use crate::catalog::Catalog;
use crate::config::{ConfigError, ModelConfig};
use std::collections::HashMap;

/// Builds a model of one type from its configuration.
pub type ModelConstructor = fn(&ModelConfig, &Catalog) -> Result<Box<dyn Model>, ConfigError>;

#[derive(Debug, Clone, Default)]
pub struct ModelFactory {
    constructors: HashMap<String, ModelConstructor>,
}

impl ModelFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory knowing every model type this crate defines.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register("BatchReactor", BatchReactor::construct);
        factory.register("Source", SourceFacility::construct);
        factory.register("Sink", SinkFacility::construct);
        factory.register("Market", Market::construct);
        factory.register("Institution", InstitutionAgent::construct);
        factory.register("Region", RegionAgent::construct);
        factory
    }

    /// Register `constructor` under `model_type`. Returns the constructor it
    /// replaced, if any.
    pub fn register(&mut self, model_type: &str, constructor: ModelConstructor) -> Option<ModelConstructor> {
        self.constructors.insert(model_type.to_string(), constructor)
    }

    pub fn contains(&self, model_type: &str) -> bool {
        self.constructors.contains_key(model_type)
    }

    /// Construct a `model_type` model from `config`.
    pub fn create(
        &self,
        model_type: &str,
        config: &ModelConfig,
        catalog: &Catalog,
    ) -> Result<Box<dyn Model>, ConfigError> {
        let constructor = self
            .constructors
            .get(model_type)
            .ok_or_else(|| ConfigError::UnknownModelType(model_type.to_string()))?;
        constructor(config, catalog)
    }

    /// Construct whatever model type `config` is tagged with.
    pub fn create_from(&self, config: &ModelConfig, catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        self.create(config.model_type(), config, catalog)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
