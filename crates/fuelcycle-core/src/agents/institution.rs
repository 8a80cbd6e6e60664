//! Institution: owns an ordered set of facilities and relays their traffic.

use crate::agent::{AgentContext, Communicator, Institution, Model, TimeAgent};
use crate::catalog::Catalog;
use crate::config::{ConfigError, ModelConfig};
use crate::error::SimError;
use crate::id::AgentId;
use crate::message::{Message, ProtocolError};

#[derive(Debug, Clone, Default)]
pub struct InstitutionAgent {
    facilities: Vec<AgentId>,
    decommissioned: usize,
}

impl InstitutionAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn construct(config: &ModelConfig, _catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        match config {
            ModelConfig::Institution(_) => Ok(Box::new(Self::new())),
            other => Err(ConfigError::WrongModelType {
                expected: "Institution",
                found: other.model_type(),
            }),
        }
    }

    /// Facilities this institution has stopped owning.
    pub fn decommissioned(&self) -> usize {
        self.decommissioned
    }
}

/// Containers relay everything; nothing may be addressed to them.
pub(crate) fn relay(msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
    if msg.recipient() == ctx.id {
        return Err(ProtocolError::ProtocolViolation {
            agent: ctx.id,
            message: msg.id(),
            reason: "containers do not accept messages addressed to themselves".to_string(),
        }
        .into());
    }
    ctx.forward(msg)?;
    Ok(())
}

impl TimeAgent for InstitutionAgent {}

impl Communicator for InstitutionAgent {
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        relay(msg, ctx)
    }
}

impl Institution for InstitutionAgent {
    fn add_facility(&mut self, facility: AgentId) {
        if !self.facilities.contains(&facility) {
            self.facilities.push(facility);
        }
    }

    fn facilities(&self) -> &[AgentId] {
        &self.facilities
    }

    fn decommission(&mut self, facility: AgentId) -> bool {
        let Some(pos) = self.facilities.iter().position(|&f| f == facility) else {
            return false;
        };
        self.facilities.remove(pos);
        self.decommissioned += 1;
        true
    }
}

impl Model for InstitutionAgent {
    fn model_type(&self) -> &'static str {
        "Institution"
    }

    fn copy_fresh(&self) -> Box<dyn Model> {
        Box::new(Self::new())
    }

    fn summary(&self, _catalog: &Catalog) -> String {
        format!(
            "Institution: {} facilities, {} decommissioned",
            self.facilities.len(),
            self.decommissioned,
        )
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
