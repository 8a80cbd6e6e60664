//! Serde data file structs for scenario descriptions.
//!
//! A scenario names its commodities and recipes, one market per traded
//! commodity, the facility prototypes, and the region/institution tree with
//! the facilities each institution deploys at startup. All cross-references
//! are by name; the loader resolves them.

use fuelcycle_core::config::ModelConfig;
use serde::Deserialize;

// ===========================================================================
// Scenario
// ===========================================================================

/// A complete scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioData {
    #[serde(default)]
    pub commodities: Vec<CommodityData>,
    #[serde(default)]
    pub recipes: Vec<String>,
    #[serde(default)]
    pub markets: Vec<MarketData>,
    #[serde(default)]
    pub prototypes: Vec<PrototypeData>,
    #[serde(default)]
    pub regions: Vec<RegionData>,
}

// ===========================================================================
// Catalog entries
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CommodityData {
    pub name: String,
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_units() -> String {
    "kg".to_string()
}

// ===========================================================================
// Markets and prototypes
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MarketData {
    pub name: String,
    pub commodity: String,
}

/// A named facility template, constructed through the model factory.
#[derive(Debug, Clone, Deserialize)]
pub struct PrototypeData {
    pub name: String,
    pub config: ModelConfig,
}

// ===========================================================================
// Ownership tree
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegionData {
    pub name: String,
    #[serde(default)]
    pub institutions: Vec<InstitutionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstitutionData {
    pub name: String,
    /// Facilities deployed when the scenario is built.
    #[serde(default)]
    pub deploy: Vec<DeployData>,
}

/// `count` fresh copies of a prototype.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployData {
    pub prototype: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commodity_defaults_to_kilograms() {
        let c: CommodityData = ron::from_str(r#"(name: "fresh_fuel")"#).unwrap();
        assert_eq!(c.units, "kg");
        let c: CommodityData = ron::from_str(r#"(name: "power", units: "MWh")"#).unwrap();
        assert_eq!(c.units, "MWh");
    }

    #[test]
    fn deploy_count_defaults_to_one() {
        let d: DeployData = ron::from_str(r#"(prototype: "lwr")"#).unwrap();
        assert_eq!(d.count, 1);
    }

    #[test]
    fn empty_scenario_from_ron() {
        let s: ScenarioData = ron::from_str("()").unwrap();
        assert!(s.commodities.is_empty());
        assert!(s.regions.is_empty());
    }

    #[test]
    fn source_prototype_from_ron() {
        let ron = r#"
            (
                name: "enrichment",
                config: Source((commodity: "fresh_fuel", recipe: "uox", capacity: 500.0)),
            )
        "#;
        let p: PrototypeData = ron::from_str(ron).unwrap();
        assert_eq!(p.name, "enrichment");
        assert_eq!(p.config.model_type(), "Source");
    }

    #[test]
    fn sink_prototype_from_json() {
        let json = r#"{
            "name": "repository",
            "config": { "Sink": { "commodities": ["spent_fuel"], "capacity": 1000.0 } }
        }"#;
        let p: PrototypeData = serde_json::from_str(json).unwrap();
        match p.config {
            ModelConfig::Sink(sink) => {
                assert_eq!(sink.commodities, vec!["spent_fuel".to_string()]);
                assert!(sink.inventory_limit.is_none());
            }
            other => panic!("expected Sink, got: {other:?}"),
        }
    }

    #[test]
    fn region_tree_from_toml() {
        let toml_str = r#"
            [[regions]]
            name = "east"

            [[regions.institutions]]
            name = "utility"
            deploy = [{ prototype = "lwr", count = 3 }, { prototype = "repository" }]
        "#;
        let s: ScenarioData = toml::from_str(toml_str).unwrap();
        assert_eq!(s.regions.len(), 1);
        let utility = &s.regions[0].institutions[0];
        assert_eq!(utility.name, "utility");
        assert_eq!(utility.deploy[0].count, 3);
        assert_eq!(utility.deploy[1].count, 1);
    }
}
