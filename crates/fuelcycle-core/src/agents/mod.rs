//! Built-in agent models.
//!
//! Facilities ([`BatchReactor`], [`SourceFacility`], [`SinkFacility`]) trade
//! through per-commodity [`Market`]s. Containers ([`InstitutionAgent`],
//! [`RegionAgent`]) own facilities and relay their messages.

pub mod batch_reactor;
pub mod institution;
pub mod market;
pub mod region;
pub mod sink;
pub mod source;

pub use batch_reactor::{BatchReactor, BatchReactorParams, FuelPair, Phase};
pub use institution::InstitutionAgent;
pub use market::Market;
pub use region::RegionAgent;
pub use sink::SinkFacility;
pub use source::SourceFacility;
