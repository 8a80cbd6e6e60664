//! Simulation clock and per-step reporting.

use crate::fixed::Ticks;
use crate::id::AgentId;

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable simulation state tracked by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Current tick. Incremented by 1 at the end of each step.
    pub tick: Ticks,
}

impl SimState {
    /// Create a new simulation state starting at tick 0.
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Step report
// ---------------------------------------------------------------------------

/// What happened during one or more `Engine::step()` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,

    /// Message hops delivered, counting relays.
    pub messages_delivered: u64,

    /// Orders produced by the clearing stage.
    pub orders: u64,

    /// Shipments delivered to requesters.
    pub shipments: u64,

    /// Agents removed from the schedule, in removal order.
    pub decommissioned: Vec<AgentId>,
}

impl StepReport {
    /// Fold `other` into this report.
    pub fn merge(&mut self, other: StepReport) {
        self.steps_run += other.steps_run;
        self.messages_delivered += other.messages_delivered;
        self.orders += other.orders;
        self.shipments += other.shipments;
        self.decommissioned.extend(other.decommissioned);
    }
}
