//! Region: root of the ownership tree. Owns institutions and relays traffic.

use crate::agent::{AgentContext, Communicator, Institution, Model, TimeAgent};
use crate::agents::institution::relay;
use crate::catalog::Catalog;
use crate::config::{ConfigError, ModelConfig};
use crate::error::SimError;
use crate::id::AgentId;
use crate::message::Message;

#[derive(Debug, Clone, Default)]
pub struct RegionAgent {
    institutions: Vec<AgentId>,
}

impl RegionAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn construct(config: &ModelConfig, _catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        match config {
            ModelConfig::Region(_) => Ok(Box::new(Self::new())),
            other => Err(ConfigError::WrongModelType {
                expected: "Region",
                found: other.model_type(),
            }),
        }
    }

    pub fn institutions(&self) -> &[AgentId] {
        &self.institutions
    }
}

impl TimeAgent for RegionAgent {}

impl Communicator for RegionAgent {
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        relay(msg, ctx)
    }
}

// A region is the institution of its institutions.
impl Institution for RegionAgent {
    fn add_facility(&mut self, institution: AgentId) {
        if !self.institutions.contains(&institution) {
            self.institutions.push(institution);
        }
    }

    fn facilities(&self) -> &[AgentId] {
        &self.institutions
    }

    fn decommission(&mut self, institution: AgentId) -> bool {
        let before = self.institutions.len();
        self.institutions.retain(|&i| i != institution);
        self.institutions.len() != before
    }
}

impl Model for RegionAgent {
    fn model_type(&self) -> &'static str {
        "Region"
    }

    fn copy_fresh(&self) -> Box<dyn Model> {
        Box::new(Self::new())
    }

    fn summary(&self, _catalog: &Catalog) -> String {
        format!("Region: {} institutions", self.institutions.len())
    }

    fn as_institution(&self) -> Option<&dyn Institution> {
        Some(self)
    }

    fn as_institution_mut(&mut self) -> Option<&mut dyn Institution> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
