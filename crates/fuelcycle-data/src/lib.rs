pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, Format, Scenario, build_scenario, load_scenario, load_scenario_str};
