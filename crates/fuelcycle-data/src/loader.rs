//! Resolution pipeline: reads scenario files, resolves names, builds an engine.
//!
//! Provides format detection (RON/JSON/TOML), deserialization helpers, and
//! [`build_scenario`], which freezes the catalog, registers markets and
//! prototypes, and deploys the region/institution tree.

use crate::schema::ScenarioData;
use fuelcycle_core::catalog::{Catalog, CatalogBuilder, CatalogError};
use fuelcycle_core::config::ModelConfig;
use fuelcycle_core::engine::Engine;
use fuelcycle_core::error::SimError;
use fuelcycle_core::factory::ModelFactory;
use fuelcycle_core::id::AgentId;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during scenario loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A prototype whose model type cannot be deployed as a facility.
    #[error("prototype '{name}' in {file} is a {model_type}, not a facility")]
    NotAFacility {
        file: PathBuf,
        name: String,
        model_type: &'static str,
    },

    /// The engine rejected a resolved definition.
    #[error(transparent)]
    Sim(#[from] SimError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in the given format. `file` labels parse errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parse_err = |detail: String| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(duplicate(file, name))
    } else {
        Ok(())
    }
}

fn unresolved(file: &Path, name: &str, expected_kind: &'static str) -> DataLoadError {
    DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    }
}

fn duplicate(file: &Path, name: &str) -> DataLoadError {
    DataLoadError::DuplicateName {
        file: file.to_path_buf(),
        name: name.to_string(),
    }
}

/// Every commodity and recipe name a model configuration refers to.
fn config_refs(config: &ModelConfig) -> (Vec<&str>, Vec<&str>) {
    match config {
        ModelConfig::BatchReactor(c) => {
            let mut commodities = Vec::new();
            let mut recipes = Vec::new();
            for pair in &c.fuel_pairs {
                commodities.extend([pair.in_commodity.as_str(), pair.out_commodity.as_str()]);
                recipes.extend([pair.in_recipe.as_str(), pair.out_recipe.as_str()]);
            }
            (commodities, recipes)
        }
        ModelConfig::Source(c) => (vec![c.commodity.as_str()], vec![c.recipe.as_str()]),
        ModelConfig::Sink(c) => (c.commodities.iter().map(String::as_str).collect(), vec![]),
        ModelConfig::Market(c) => (vec![c.commodity.as_str()], vec![]),
        ModelConfig::Institution(_) | ModelConfig::Region(_) => (vec![], vec![]),
    }
}

fn check_config_refs(config: &ModelConfig, catalog: &Catalog, file: &Path) -> Result<(), DataLoadError> {
    let (commodities, recipes) = config_refs(config);
    if let Some(name) = commodities.into_iter().find(|n| catalog.commodity_id(n).is_none()) {
        return Err(unresolved(file, name, "commodity"));
    }
    if let Some(name) = recipes.into_iter().find(|n| catalog.recipe_id(n).is_none()) {
        return Err(unresolved(file, name, "recipe"));
    }
    Ok(())
}

// ===========================================================================
// Scenario building
// ===========================================================================

/// A ready-to-run engine and the names its agents were declared under.
#[derive(Debug)]
pub struct Scenario {
    pub engine: Engine,
    pub regions: HashMap<String, AgentId>,
    pub institutions: HashMap<String, AgentId>,
    pub markets: HashMap<String, AgentId>,
    /// Deployed facilities, in deployment order.
    pub facilities: Vec<AgentId>,
}

/// Load a scenario file with the built-in model types.
pub fn load_scenario(path: &Path) -> Result<Scenario, DataLoadError> {
    let data: ScenarioData = deserialize_file(path)?;
    build_scenario(&data, path, ModelFactory::with_builtins())
}

/// Load a scenario from an in-memory string with the built-in model types.
pub fn load_scenario_str(content: &str, format: Format) -> Result<Scenario, DataLoadError> {
    let file = Path::new("<inline>");
    let data: ScenarioData = deserialize_str(content, format, file)?;
    build_scenario(&data, file, ModelFactory::with_builtins())
}

fn build_catalog(data: &ScenarioData, file: &Path) -> Result<Catalog, DataLoadError> {
    let catalog_err = |e: CatalogError| match e {
        CatalogError::Duplicate(name) => duplicate(file, &name),
        other => DataLoadError::Sim(other.into()),
    };
    let mut builder = CatalogBuilder::new();
    for commodity in &data.commodities {
        builder
            .register_commodity_in(&commodity.name, &commodity.units)
            .map_err(catalog_err)?;
    }
    for recipe in &data.recipes {
        builder.register_recipe(recipe).map_err(catalog_err)?;
    }
    Ok(builder.build())
}

/// Resolve `data` into an engine whose factory is `factory`.
///
/// Resolution order: catalog, markets, prototypes, then the region tree.
/// Names are checked before anything is handed to the engine, so a bad
/// reference reports the offending name instead of an engine error.
pub fn build_scenario(
    data: &ScenarioData,
    file: &Path,
    factory: ModelFactory,
) -> Result<Scenario, DataLoadError> {
    let catalog = build_catalog(data, file)?;
    let mut engine = Engine::with_factory(catalog, factory);

    let mut markets = HashMap::new();
    for market in &data.markets {
        check_duplicate(&markets, &market.name, file)?;
        let commodity = engine
            .catalog()
            .commodity_id(&market.commodity)
            .ok_or_else(|| unresolved(file, &market.commodity, "commodity"))?;
        let id = engine.add_market(&market.name, commodity)?;
        markets.insert(market.name.clone(), id);
    }

    for proto in &data.prototypes {
        if engine.prototype(&proto.name).is_some() {
            return Err(duplicate(file, &proto.name));
        }
        match &proto.config {
            ModelConfig::Market(_) | ModelConfig::Institution(_) | ModelConfig::Region(_) => {
                return Err(DataLoadError::NotAFacility {
                    file: file.to_path_buf(),
                    name: proto.name.clone(),
                    model_type: proto.config.model_type(),
                });
            }
            _ => {}
        }
        check_config_refs(&proto.config, engine.catalog(), file)?;
        engine.add_prototype_config(&proto.name, &proto.config)?;
    }

    let mut regions = HashMap::new();
    let mut institutions = HashMap::new();
    let mut facilities = Vec::new();
    for region in &data.regions {
        check_duplicate(&regions, &region.name, file)?;
        let region_id = engine.add_region(&region.name);
        regions.insert(region.name.clone(), region_id);

        for inst in &region.institutions {
            check_duplicate(&institutions, &inst.name, file)?;
            let inst_id = engine.add_institution(&inst.name, region_id)?;
            institutions.insert(inst.name.clone(), inst_id);

            for deploy in &inst.deploy {
                if engine.prototype(&deploy.prototype).is_none() {
                    return Err(unresolved(file, &deploy.prototype, "prototype"));
                }
                for _ in 0..deploy.count {
                    facilities.push(engine.build(&deploy.prototype, inst_id)?);
                }
            }
        }
    }

    Ok(Scenario {
        engine,
        regions,
        institutions,
        markets,
        facilities,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fuelcycle_core::agents::{BatchReactor, Phase};
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fuelcycle_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const CATALOG: &str = r#"
        commodities: [(name: "fresh_fuel"), (name: "spent_fuel")],
        recipes: ["uox", "spent_uox"],
    "#;

    fn ron_scenario(body: &str) -> String {
        format!("({CATALOG} {body})")
    }

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("s.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("s.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("s.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        for name in ["scenario.yaml", "scenario"] {
            assert!(matches!(
                detect_format(Path::new(name)),
                Err(DataLoadError::UnsupportedFormat { .. })
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn malformed_input_is_a_parse_error() {
        let err = load_scenario_str("(commodities: [", Format::Ron).unwrap_err();
        match err {
            DataLoadError::Parse { file, .. } => assert_eq!(file, PathBuf::from("<inline>")),
            other => panic!("expected Parse, got: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = make_test_dir("missing");
        let err = load_scenario(&dir.join("absent.ron")).unwrap_err();
        assert!(matches!(err, DataLoadError::Io(_)));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Catalog and markets
    // -----------------------------------------------------------------------

    #[test]
    fn catalog_carries_units() {
        let s = load_scenario_str(
            r#"(commodities: [(name: "fresh_fuel"), (name: "power", units: "MWh")])"#,
            Format::Ron,
        )
        .unwrap();
        let catalog = s.engine.catalog();
        let power = catalog.commodity_id("power").unwrap();
        assert_eq!(catalog.commodity_units(power), "MWh");
        assert_eq!(catalog.commodity_count(), 2);
    }

    #[test]
    fn duplicate_commodity_is_rejected() {
        let err = load_scenario_str(
            r#"(commodities: [(name: "fresh_fuel"), (name: "fresh_fuel")])"#,
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateName { name, .. } if name == "fresh_fuel"));
    }

    #[test]
    fn markets_resolve_their_commodity() {
        let s = load_scenario_str(
            &ron_scenario(r#"markets: [(name: "fresh", commodity: "fresh_fuel")],"#),
            Format::Ron,
        )
        .unwrap();
        let fresh = s.engine.catalog().commodity_id("fresh_fuel").unwrap();
        assert_eq!(s.engine.market_for(fresh), Some(s.markets["fresh"]));
    }

    #[test]
    fn market_for_unknown_commodity() {
        let err = load_scenario_str(
            &ron_scenario(r#"markets: [(name: "mox", commodity: "mox_fuel")],"#),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::UnresolvedRef { expected_kind: "commodity", name, .. } if name == "mox_fuel"
        ));
    }

    #[test]
    fn second_market_for_a_commodity_is_an_engine_error() {
        let err = load_scenario_str(
            &ron_scenario(
                r#"markets: [
                    (name: "a", commodity: "fresh_fuel"),
                    (name: "b", commodity: "fresh_fuel"),
                ],"#,
            ),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(err, DataLoadError::Sim(SimError::DuplicateMarket(_))));
    }

    // -----------------------------------------------------------------------
    // Prototypes
    // -----------------------------------------------------------------------

    #[test]
    fn prototype_with_unknown_recipe() {
        let err = load_scenario_str(
            &ron_scenario(
                r#"prototypes: [(
                    name: "mine",
                    config: Source((commodity: "fresh_fuel", recipe: "mox", capacity: 10.0)),
                )],"#,
            ),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::UnresolvedRef { expected_kind: "recipe", name, .. } if name == "mox"
        ));
    }

    #[test]
    fn market_prototype_is_rejected() {
        let err = load_scenario_str(
            &ron_scenario(
                r#"prototypes: [(name: "m", config: Market((commodity: "fresh_fuel")))],"#,
            ),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::NotAFacility { model_type: "Market", .. }
        ));
    }

    #[test]
    fn duplicate_prototype_is_rejected() {
        let err = load_scenario_str(
            &ron_scenario(
                r#"prototypes: [
                    (name: "mine", config: Source((commodity: "fresh_fuel", recipe: "uox", capacity: 1.0))),
                    (name: "mine", config: Source((commodity: "fresh_fuel", recipe: "uox", capacity: 2.0))),
                ],"#,
            ),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateName { name, .. } if name == "mine"));
    }

    #[test]
    fn invalid_quantity_surfaces_as_config_error() {
        let err = load_scenario_str(
            &ron_scenario(
                r#"prototypes: [(
                    name: "mine",
                    config: Source((commodity: "fresh_fuel", recipe: "uox", capacity: -5.0)),
                )],"#,
            ),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(err, DataLoadError::Sim(SimError::Config(_))));
    }

    // -----------------------------------------------------------------------
    // Region tree
    // -----------------------------------------------------------------------

    #[test]
    fn deploy_builds_copies_under_the_institution() {
        let s = load_scenario_str(
            &ron_scenario(
                r#"prototypes: [(
                    name: "lwr",
                    config: BatchReactor((
                        cycle_length: 3,
                        lifetime: 30,
                        core_loading: 100.0,
                        batches: 4,
                        fuel_pairs: [(
                            in_commodity: "fresh_fuel",
                            in_recipe: "uox",
                            out_commodity: "spent_fuel",
                            out_recipe: "spent_uox",
                        )],
                    )),
                )],
                regions: [(
                    name: "east",
                    institutions: [(name: "utility", deploy: [(prototype: "lwr", count: 3)])],
                )],"#,
            ),
            Format::Ron,
        )
        .unwrap();
        let utility = s.institutions["utility"];
        assert_eq!(s.engine.parent(utility), Some(s.regions["east"]));
        assert_eq!(s.facilities.len(), 3);
        assert_eq!(s.engine.children(utility), s.facilities);
        for &id in &s.facilities {
            let reactor = s.engine.agent_as::<BatchReactor>(id).unwrap();
            assert_eq!(reactor.phase(), Phase::Begin);
        }
    }

    #[test]
    fn deploy_of_unknown_prototype() {
        let err = load_scenario_str(
            &ron_scenario(
                r#"regions: [(
                    name: "east",
                    institutions: [(name: "utility", deploy: [(prototype: "fbr")])],
                )],"#,
            ),
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::UnresolvedRef { expected_kind: "prototype", name, .. } if name == "fbr"
        ));
    }

    #[test]
    fn institution_names_are_unique_across_regions() {
        let err = load_scenario_str(
            r#"(regions: [
                (name: "east", institutions: [(name: "utility")]),
                (name: "west", institutions: [(name: "utility")]),
            ])"#,
            Format::Ron,
        )
        .unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateName { name, .. } if name == "utility"));
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    #[test]
    fn load_toml_file() {
        let dir = make_test_dir("toml");
        let path = dir.join("scenario.toml");
        fs::write(
            &path,
            r#"
                recipes = ["uox"]

                [[commodities]]
                name = "fresh_fuel"

                [[markets]]
                name = "fresh"
                commodity = "fresh_fuel"

                [[prototypes]]
                name = "mine"
                [prototypes.config.Source]
                commodity = "fresh_fuel"
                recipe = "uox"
                capacity = 250.0

                [[regions]]
                name = "east"
                [[regions.institutions]]
                name = "miner"
                deploy = [{ prototype = "mine", count = 2 }]
            "#,
        )
        .unwrap();

        let s = load_scenario(&path).unwrap();
        assert_eq!(s.facilities.len(), 2);
        assert_eq!(s.engine.name(s.facilities[0]), Some("mine"));
        assert_eq!(s.engine.agent_count(), 5);

        cleanup(&dir);
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = make_test_dir("bad_json");
        let path = dir.join("scenario.json");
        fs::write(&path, "{ \"commodities\": 3 }").unwrap();

        match load_scenario(&path).unwrap_err() {
            DataLoadError::Parse { file, .. } => assert_eq!(file, path),
            other => panic!("expected Parse, got: {other:?}"),
        }

        cleanup(&dir);
    }
}
