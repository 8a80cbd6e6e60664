//! Batch-cycling production facility.
//!
//! The reactor loads a full core, operates for a fixed cycle, then swaps one
//! batch at each refueling until its lifetime runs out. Material moves
//! through three buffers:
//!
//! - **pre-core**: fresh fuel received but not yet loaded.
//! - **in-core**: the active inventory.
//! - **post-core**: spent fuel awaiting shipment.
//!
//! ```text
//! BEGIN --request met--> OPERATION --cycle done--> REFUEL --request met--> OPERATION ...
//!   any phase --lifetime reached--> END --post-core empty--> decommission
//! ```

use crate::agent::{AgentContext, Communicator, Model, TimeAgent};
use crate::buffer::ResourceBuffer;
use crate::catalog::Catalog;
use crate::config::{BatchReactorConfig, ConfigError, ModelConfig};
use crate::error::{FacilityError, SimError};
use crate::event::Event;
use crate::fixed::{Fixed64, Quantity, Ticks, exceeds, is_positive};
use crate::id::{CommodityId, RecipeId};
use crate::message::{Message, Payload, ProtocolError, Transaction};
use crate::resource::{Manifest, Material, total_quantity};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle state of a batch reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Begin,
    Refuel,
    Operation,
    End,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Begin => "BEGIN",
            Phase::Refuel => "REFUEL",
            Phase::Operation => "OPERATION",
            Phase::End => "END",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Phase {
    type Error = FacilityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Phase::Begin),
            1 => Ok(Phase::Refuel),
            2 => Ok(Phase::Operation),
            3 => Ok(Phase::End),
            other => Err(FacilityError::UnknownPhase(other.to_string())),
        }
    }
}

impl FromStr for Phase {
    type Err = FacilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BEGIN" => Ok(Phase::Begin),
            "REFUEL" => Ok(Phase::Refuel),
            "OPERATION" => Ok(Phase::Operation),
            "END" => Ok(Phase::End),
            _ => Err(FacilityError::UnknownPhase(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// One conversion channel: fresh `in_*` material becomes spent `out_*`
/// material when it leaves the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuelPair {
    pub in_commodity: CommodityId,
    pub in_recipe: RecipeId,
    pub out_commodity: CommodityId,
    pub out_recipe: RecipeId,
}

/// Resolved, validated reactor parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReactorParams {
    pub cycle_length: Ticks,
    pub lifetime: Ticks,
    pub core_loading: Quantity,
    pub batches: u32,
    /// The first pair is the one fresh fuel is requested through.
    pub fuel_pairs: Vec<FuelPair>,
}

impl BatchReactorParams {
    pub fn validate(&self) -> Result<(), FacilityError> {
        if self.fuel_pairs.is_empty() {
            return Err(FacilityError::NotConfigured("no fuel pairs"));
        }
        if self.batches == 0 {
            return Err(FacilityError::NotConfigured("batch count must be positive"));
        }
        if !is_positive(self.core_loading) {
            return Err(FacilityError::NotConfigured("core loading must be positive"));
        }
        if self.cycle_length == 0 {
            return Err(FacilityError::NotConfigured("cycle length must be positive"));
        }
        Ok(())
    }

    /// Mass of one batch: core loading over batch count.
    pub fn batch_loading(&self) -> Quantity {
        self.core_loading / Fixed64::saturating_from_num(self.batches.max(1))
    }

    /// Resolve names in `config` against `catalog`.
    pub fn from_config(config: &BatchReactorConfig, catalog: &Catalog) -> Result<Self, ConfigError> {
        let fuel_pairs = config
            .fuel_pairs
            .iter()
            .map(|p| {
                Ok(FuelPair {
                    in_commodity: catalog.require_commodity(&p.in_commodity)?,
                    in_recipe: catalog.require_recipe(&p.in_recipe)?,
                    out_commodity: catalog.require_commodity(&p.out_commodity)?,
                    out_recipe: catalog.require_recipe(&p.out_recipe)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let params = Self {
            cycle_length: config.cycle_length,
            lifetime: config.lifetime,
            core_loading: crate::config::quantity("BatchReactor", "core_loading", config.core_loading)?,
            batches: config.batches,
            fuel_pairs,
        };
        params
            .validate()
            .map_err(|e| ConfigError::invalid("BatchReactor", e.to_string()))?;
        Ok(params)
    }
}

// ---------------------------------------------------------------------------
// BatchReactor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchReactor {
    params: BatchReactorParams,
    phase: Phase,
    /// Fresh fuel still wanted before the next load.
    request_amount: Quantity,
    /// Fresh fuel accepted since the last tock.
    received: Quantity,
    /// Tocks spent in the current operating cycle.
    cycle_timer: Ticks,
    /// Tocks since construction.
    operation_timer: Ticks,
    pre_core: ResourceBuffer<Material>,
    in_core: ResourceBuffer<Material>,
    post_core: ResourceBuffer<Material>,
    /// Filed orders. Newest at the front.
    orders: VecDeque<Message>,
    decommission_requested: bool,
}

impl BatchReactor {
    pub fn new(params: BatchReactorParams) -> Result<Self, FacilityError> {
        params.validate()?;
        Ok(Self::fresh(params))
    }

    /// Initial state: BEGIN with a full core outstanding.
    fn fresh(params: BatchReactorParams) -> Self {
        let request_amount = params.core_loading;
        Self {
            params,
            phase: Phase::Begin,
            request_amount,
            received: Fixed64::ZERO,
            cycle_timer: 0,
            operation_timer: 0,
            pre_core: ResourceBuffer::new(),
            in_core: ResourceBuffer::new(),
            post_core: ResourceBuffer::new(),
            orders: VecDeque::new(),
            decommission_requested: false,
        }
    }

    pub fn from_config(config: &BatchReactorConfig, catalog: &Catalog) -> Result<Self, ConfigError> {
        Ok(Self::fresh(BatchReactorParams::from_config(config, catalog)?))
    }

    /// Factory entry point.
    pub fn construct(config: &ModelConfig, catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        match config {
            ModelConfig::BatchReactor(cfg) => Ok(Box::new(Self::from_config(cfg, catalog)?)),
            other => Err(ConfigError::WrongModelType {
                expected: "BatchReactor",
                found: other.model_type(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn params(&self) -> &BatchReactorParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn request_amount(&self) -> Quantity {
        self.request_amount
    }

    /// Fuel accepted since the last tock and not yet counted against the
    /// request.
    pub fn received(&self) -> Quantity {
        self.received
    }

    /// What the next request asks for: the request less fuel already
    /// received. Deliveries landing after this reactor's tock are only
    /// counted against the request at its next tock.
    pub fn outstanding(&self) -> Quantity {
        (self.request_amount - self.received).max(Fixed64::ZERO)
    }

    pub fn cycle_timer(&self) -> Ticks {
        self.cycle_timer
    }

    pub fn operation_timer(&self) -> Ticks {
        self.operation_timer
    }

    pub fn batch_loading(&self) -> Quantity {
        self.params.batch_loading()
    }

    pub fn pre_core(&self) -> &ResourceBuffer<Material> {
        &self.pre_core
    }

    pub fn in_core(&self) -> &ResourceBuffer<Material> {
        &self.in_core
    }

    pub fn post_core(&self) -> &ResourceBuffer<Material> {
        &self.post_core
    }

    pub fn pending_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn lifetime_reached(&self) -> bool {
        self.operation_timer >= self.params.lifetime
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn set_phase(&mut self, to: Phase, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let from = self.phase;
        match to {
            Phase::Begin => {
                self.request_amount = self.params.core_loading;
            }
            Phase::Refuel => {
                self.offload_batch()?;
                self.request_amount = self.params.batch_loading();
            }
            Phase::Operation => {
                self.request_amount = Fixed64::ZERO;
                self.cycle_timer = 0;
            }
            Phase::End => {
                self.request_amount = Fixed64::ZERO;
                self.offload_core()?;
                self.offload_pending()?;
            }
        }
        self.phase = to;
        ctx.emit(Event::PhaseChanged {
            agent: ctx.id,
            from,
            to,
            tick: ctx.tick,
        });
        Ok(())
    }

    /// Move one batch of in-core material to post-core as spent fuel.
    fn offload_batch(&mut self) -> Result<(), SimError> {
        let amount = self.params.batch_loading().min(self.in_core.total_quantity());
        let batch = self.in_core.pop_quantity(amount)?;
        self.discharge(batch)
    }

    /// Move the whole core to post-core as spent fuel.
    fn offload_core(&mut self) -> Result<(), SimError> {
        let core = self.in_core.pop_all();
        self.discharge(core)
    }

    /// Move fuel delivered but never loaded to post-core with the core, so a
    /// partial reload still leaves the reactor before it decommissions.
    fn offload_pending(&mut self) -> Result<(), SimError> {
        let pending = self.pre_core.pop_all();
        self.received = Fixed64::ZERO;
        self.discharge(pending)
    }

    fn discharge(&mut self, fuel: Vec<Material>) -> Result<(), SimError> {
        let spent = fuel
            .into_iter()
            .map(|m| {
                let pair = self.pair_for_input(m.recipe)?;
                Ok(m.transmute(pair.out_recipe))
            })
            .collect::<Result<Vec<_>, FacilityError>>()?;
        self.post_core.push_all(spent)?;
        Ok(())
    }

    fn pair_for_input(&self, recipe: RecipeId) -> Result<FuelPair, FacilityError> {
        self.params
            .fuel_pairs
            .iter()
            .find(|p| p.in_recipe == recipe)
            .copied()
            .ok_or(FacilityError::NoFuelPair(recipe))
    }

    fn primary_pair(&self) -> Result<FuelPair, FacilityError> {
        self.params
            .fuel_pairs
            .first()
            .copied()
            .ok_or(FacilityError::NotConfigured("no fuel pairs"))
    }

    // -----------------------------------------------------------------------
    // Trading
    // -----------------------------------------------------------------------

    fn make_request(&self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let pair = self.primary_pair()?;
        let fuel = Material::new(pair.in_recipe, self.outstanding());
        ctx.issue(Transaction::request(pair.in_commodity, Payload::Material(fuel)))?;
        Ok(())
    }

    /// One offer per output commodity and recipe, for everything held.
    fn make_offers(&self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let mut grouped: BTreeMap<(CommodityId, RecipeId), Quantity> = BTreeMap::new();
        for unit in self.post_core.iter() {
            let commodity = self
                .params
                .fuel_pairs
                .iter()
                .find(|p| p.out_recipe == unit.recipe)
                .map(|p| p.out_commodity)
                .ok_or(FacilityError::NoFuelPair(unit.recipe))?;
            *grouped.entry((commodity, unit.recipe)).or_insert(Fixed64::ZERO) += unit.quantity;
        }
        for ((commodity, recipe), quantity) in grouped {
            if is_positive(quantity) {
                let spent = Material::new(recipe, quantity);
                ctx.issue(Transaction::offer(commodity, Payload::Material(spent)))?;
            }
        }
        Ok(())
    }

    /// Fill filed orders from post-core, newest first.
    fn handle_orders(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        while let Some(msg) = self.orders.pop_front() {
            let requester = msg.requester().ok_or_else(|| ProtocolError::ProtocolViolation {
                agent: ctx.id,
                message: msg.id(),
                reason: "order names no requester".to_string(),
            })?;
            let trans = msg.into_transaction();
            let quantity = trans.quantity();
            let manifest: Manifest = match &trans.payload {
                Payload::Material(m) => {
                    let recipe = m.recipe;
                    self.post_core.pop_matching(quantity, |u| u.recipe == recipe)?
                }
                Payload::Generic(_) => self.post_core.pop_quantity(quantity)?,
            };
            ctx.ship(requester, trans, manifest);
        }
        Ok(())
    }

    /// BEGIN/REFUEL: load once the outstanding request is met, otherwise
    /// shrink it by what arrived.
    fn load_received(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let received = self.received;
        if exceeds(received, self.request_amount) {
            return Err(FacilityError::OverDelivery {
                received,
                outstanding: self.request_amount,
            }
            .into());
        }
        self.received = Fixed64::ZERO;
        if exceeds(self.request_amount, received) {
            self.request_amount -= received;
            return Ok(());
        }
        let fuel = self.pre_core.pop_all();
        self.in_core.push_all(fuel)?;
        self.set_phase(Phase::Operation, ctx)
    }
}

impl TimeAgent for BatchReactor {
    fn tick(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        if self.lifetime_reached() && self.phase != Phase::End {
            self.set_phase(Phase::End, ctx)?;
        }
        if is_positive(self.outstanding()) {
            self.make_request(ctx)?;
        }
        if !self.post_core.is_empty() {
            self.make_offers(ctx)?;
        }
        Ok(())
    }

    fn tock(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        self.handle_orders(ctx)?;
        match self.phase {
            Phase::Begin | Phase::Refuel => self.load_received(ctx)?,
            Phase::Operation => {
                self.cycle_timer += 1;
                if self.cycle_timer >= self.params.cycle_length {
                    self.set_phase(Phase::Refuel, ctx)?;
                }
            }
            Phase::End => {
                if self.post_core.is_empty() && !self.decommission_requested {
                    self.decommission_requested = true;
                    ctx.request_decommission();
                }
            }
        }
        self.operation_timer += 1;
        Ok(())
    }
}

impl Communicator for BatchReactor {
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        ctx.accept_order(&msg)?;
        self.orders.push_front(msg);
        Ok(())
    }

    fn accept_resources(
        &mut self,
        _transaction: Transaction,
        manifest: Manifest,
        _ctx: &mut AgentContext<'_>,
    ) -> Result<(), SimError> {
        for unit in &manifest {
            self.pair_for_input(unit.recipe)?;
        }
        let quantity = total_quantity(&manifest);
        // Nothing is requested while operating or shut down.
        if matches!(self.phase, Phase::Operation | Phase::End) && is_positive(quantity) {
            return Err(FacilityError::OverDelivery {
                received: quantity,
                outstanding: Fixed64::ZERO,
            }
            .into());
        }
        self.pre_core.push_all(manifest)?;
        self.received += quantity;
        Ok(())
    }
}

impl Model for BatchReactor {
    fn model_type(&self) -> &'static str {
        "BatchReactor"
    }

    fn copy_fresh(&self) -> Box<dyn Model> {
        Box::new(Self::fresh(self.params.clone()))
    }

    fn summary(&self, catalog: &Catalog) -> String {
        let fuel = self
            .params
            .fuel_pairs
            .first()
            .map(|p| catalog.commodity_name(p.in_commodity))
            .unwrap_or("?");
        format!(
            "BatchReactor burning {fuel} [{}]: request {}, pre-core {}, in-core {}, post-core {}, \
             cycle {}/{}, age {}/{}",
            self.phase,
            self.request_amount,
            self.pre_core.total_quantity(),
            self.in_core.total_quantity(),
            self.post_core.total_quantity(),
            self.cycle_timer,
            self.params.cycle_length,
            self.operation_timer,
            self.params.lifetime,
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ===========================================================================
// Tests
// ===========================================================================
