//! Error types shared by agents and the engine.
//!
//! Each concern keeps its own enum next to the code that raises it
//! ([`BufferError`], [`ProtocolError`], [`ExchangeError`], [`ConfigError`],
//! [`CatalogError`]). [`SimError`] aggregates them so agent callbacks can
//! propagate any of them with `?`.

use crate::buffer::BufferError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::exchange::ExchangeError;
use crate::fixed::Quantity;
use crate::id::{AgentId, CommodityId, RecipeId};
use crate::message::ProtocolError;

/// Facility state machine failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacilityError {
    #[error("over-delivery: received {received} against an outstanding request of {outstanding}")]
    OverDelivery {
        received: Quantity,
        outstanding: Quantity,
    },
    #[error("unknown phase: {0}")]
    UnknownPhase(String),
    #[error("no fuel pair converts recipe {0:?}")]
    NoFuelPair(RecipeId),
    #[error("facility not configured: {0}")]
    NotConfigured(&'static str),
    #[error("ordered {ordered} exceeds the {available} left to supply this step")]
    OverCommitted {
        ordered: Quantity,
        available: Quantity,
    },
    #[error("running total {total} cannot grow by {added}")]
    TotalOverflow { total: Quantity, added: Quantity },
}

/// Any failure that aborts a simulation step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Facility(#[from] FacilityError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("agent {agent:?} failed: {source}")]
    Agent {
        agent: AgentId,
        #[source]
        source: Box<SimError>,
    },
    #[error("unknown prototype: {0}")]
    UnknownPrototype(String),
    #[error("duplicate prototype: {0}")]
    DuplicatePrototype(String),
    #[error("commodity {0:?} already has a market")]
    DuplicateMarket(CommodityId),
}

impl SimError {
    /// Attribute this error to `agent`. Already attributed errors are kept.
    pub fn at(self, agent: AgentId) -> Self {
        match self {
            SimError::Agent { .. } => self,
            other => SimError::Agent {
                agent,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with agent attribution stripped.
    pub fn root(&self) -> &SimError {
        match self {
            SimError::Agent { source, .. } => source.root(),
            other => other,
        }
    }

    /// The agent the error is attributed to, if any.
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            SimError::Agent { agent, .. } => Some(*agent),
            _ => None,
        }
    }
}
