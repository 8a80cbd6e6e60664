//! The simulation engine: owns the agents and orchestrates the step
//! pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - Every live agent as a `Box<dyn Model>`, keyed by [`AgentId`]
//! - The schedule (registration order), names and the ownership tree
//! - A [`World`] (catalog, market directory, post office, event bus)
//! - Named prototypes and the [`ModelFactory`] that builds them
//! - An optional [`Clearing`] stage
//!
//! # Step Pipeline
//!
//! Each `step()` runs:
//! 1. **Pre-step** -- remove agents decommissioned during the previous step
//! 2. **Tick** -- every agent's tick in schedule order; messages are posted
//! 3. **Route** -- deliver posted messages hop by hop until none remain
//! 4. **Exchange** -- collect portfolios, clear, route the orders down
//! 5. **Tock** -- every agent's tock; shipments and decommission requests
//!    are applied right after the agent that produced them
//! 6. **Post-step** -- deliver buffered events, advance the clock
//!
//! A failing callback aborts the step and the error is returned attributed
//! to the agent. The clock does not advance for an aborted step.

use crate::agent::{Model, Shipment, World};
use crate::agents::{InstitutionAgent, Market, RegionAgent};
use crate::catalog::Catalog;
use crate::config::ModelConfig;
use crate::error::SimError;
use crate::event::{Event, EventBus, EventKind, PassiveListener};
use crate::exchange::{Clearing, ExchangeRound, Trader};
use crate::factory::ModelFactory;
use crate::fixed::Ticks;
use crate::id::{AgentId, CommodityId};
use crate::message::{Message, Order, ProtocolError};
use crate::resource::{GenericResource, Material, Resource};
use crate::sim::{SimState, StepReport};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    /// Simulation state (tick counter).
    pub sim_state: SimState,

    /// Everything agent callbacks can reach.
    pub(crate) world: World,

    pub(crate) agents: SlotMap<AgentId, Box<dyn Model>>,

    /// Live agents in registration order.
    pub(crate) schedule: Vec<AgentId>,

    pub(crate) names: SecondaryMap<AgentId, String>,

    /// Templates copied by [`Engine::build`].
    pub(crate) prototypes: BTreeMap<String, Box<dyn Model>>,

    pub(crate) factory: ModelFactory,

    pub(crate) clearing: Option<Box<dyn Clearing>>,

    /// Agents to remove at the start of the next step.
    pub(crate) pending_removals: Vec<AgentId>,

    /// Portfolios collected during the most recent exchange phase.
    pub(crate) last_round: ExchangeRound,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sim_state", &self.sim_state)
            .field("schedule", &self.schedule)
            .field("prototypes", &self.prototypes.keys().collect::<Vec<_>>())
            .field("clearing", &self.clearing.is_some())
            .field("pending_removals", &self.pending_removals)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over `catalog` with the built-in model types.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_factory(catalog, ModelFactory::with_builtins())
    }

    pub fn with_factory(catalog: Catalog, factory: ModelFactory) -> Self {
        Self {
            sim_state: SimState::new(),
            world: World::new(catalog),
            agents: SlotMap::with_key(),
            schedule: Vec::new(),
            names: SecondaryMap::new(),
            prototypes: BTreeMap::new(),
            factory,
            clearing: None,
            pending_removals: Vec::new(),
            last_round: ExchangeRound::default(),
        }
    }

    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn catalog(&self) -> &Catalog {
        self.world.catalog()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn factory(&self) -> &ModelFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut ModelFactory {
        &mut self.factory
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Add `model` to the schedule under `parent`, which must be an
    /// institution (or a region, for institutions).
    pub fn register(
        &mut self,
        name: &str,
        model: Box<dyn Model>,
        parent: Option<AgentId>,
    ) -> Result<AgentId, SimError> {
        if let Some(parent) = parent {
            let owner = self
                .agents
                .get(parent)
                .ok_or(ProtocolError::UnknownAgent(parent))?;
            if owner.as_institution().is_none() {
                return Err(ProtocolError::MissingCapability {
                    agent: parent,
                    capability: "institution",
                }
                .into());
            }
        }
        Ok(self.insert(name, model, parent))
    }

    fn insert(&mut self, name: &str, model: Box<dyn Model>, parent: Option<AgentId>) -> AgentId {
        let id = self.agents.insert(model);
        self.schedule.push(id);
        self.names.insert(id, name.to_string());
        if let Some(parent) = parent {
            self.world.parents.insert(id, parent);
            if let Some(owner) = self
                .agents
                .get_mut(parent)
                .and_then(|a| a.as_institution_mut())
            {
                owner.add_facility(id);
            }
        }
        id
    }

    pub fn add_region(&mut self, name: &str) -> AgentId {
        self.insert(name, Box::new(RegionAgent::new()), None)
    }

    pub fn add_institution(&mut self, name: &str, region: AgentId) -> Result<AgentId, SimError> {
        self.register(name, Box::new(InstitutionAgent::new()), Some(region))
    }

    pub fn add_facility(
        &mut self,
        name: &str,
        model: Box<dyn Model>,
        institution: AgentId,
    ) -> Result<AgentId, SimError> {
        self.register(name, model, Some(institution))
    }

    /// Register the market clearing `commodity`. One market per commodity.
    pub fn add_market(&mut self, name: &str, commodity: CommodityId) -> Result<AgentId, SimError> {
        if self.world.markets.contains_key(&commodity) {
            return Err(SimError::DuplicateMarket(commodity));
        }
        let id = self.insert(name, Box::new(Market::new(commodity)), None);
        self.world.markets.insert(commodity, id);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Prototypes
    // -----------------------------------------------------------------------

    pub fn add_prototype(&mut self, name: &str, model: Box<dyn Model>) -> Result<(), SimError> {
        if self.prototypes.contains_key(name) {
            return Err(SimError::DuplicatePrototype(name.to_string()));
        }
        self.prototypes.insert(name.to_string(), model);
        Ok(())
    }

    /// Construct a prototype through the factory.
    pub fn add_prototype_config(&mut self, name: &str, config: &ModelConfig) -> Result<(), SimError> {
        let model = self.factory.create_from(config, self.world.catalog())?;
        self.add_prototype(name, model)
    }

    pub fn prototype(&self, name: &str) -> Option<&dyn Model> {
        self.prototypes.get(name).map(|m| &**m)
    }

    pub fn prototype_names(&self) -> impl Iterator<Item = &str> {
        self.prototypes.keys().map(String::as_str)
    }

    /// Register a fresh copy of `prototype` under `institution`.
    pub fn build(&mut self, prototype: &str, institution: AgentId) -> Result<AgentId, SimError> {
        let model = self
            .prototypes
            .get(prototype)
            .ok_or_else(|| SimError::UnknownPrototype(prototype.to_string()))?
            .copy_fresh();
        self.register(prototype, model, Some(institution))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn agent(&self, id: AgentId) -> Option<&dyn Model> {
        self.agents.get(id).map(|m| &**m)
    }

    /// The agent as its concrete model type, for inspection.
    pub fn agent_as<T: Model + 'static>(&self, id: AgentId) -> Option<&T> {
        self.agents.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn name(&self, id: AgentId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// First live agent registered under `name`.
    pub fn find(&self, name: &str) -> Option<AgentId> {
        self.schedule
            .iter()
            .copied()
            .find(|&id| self.name(id) == Some(name))
    }

    pub fn parent(&self, id: AgentId) -> Option<AgentId> {
        self.world.parent(id)
    }

    /// Live agents whose parent is `id`, in schedule order.
    pub fn children(&self, id: AgentId) -> Vec<AgentId> {
        self.schedule
            .iter()
            .copied()
            .filter(|&child| self.world.parent(child) == Some(id))
            .collect()
    }

    pub fn schedule(&self) -> &[AgentId] {
        &self.schedule
    }

    pub fn market_for(&self, commodity: CommodityId) -> Option<AgentId> {
        self.world.markets.get(&commodity).copied()
    }

    pub fn last_round(&self) -> &ExchangeRound {
        &self.last_round
    }

    /// `name: summary` for every live agent, in schedule order.
    pub fn summaries(&self) -> Vec<String> {
        let catalog = self.world.catalog();
        self.schedule
            .iter()
            .filter_map(|&id| {
                let agent = self.agents.get(id)?;
                Some(format!(
                    "{}: {}",
                    self.name(id).unwrap_or("?"),
                    agent.summary(catalog)
                ))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Clearing and events
    // -----------------------------------------------------------------------

    pub fn set_clearing(&mut self, clearing: Box<dyn Clearing>) {
        self.clearing = Some(clearing);
    }

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress_event(&mut self, kind: EventKind) {
        self.world.events.suppress(kind);
    }

    /// Register a passive listener for an event kind.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.world.events.on_passive(kind, listener);
    }

    pub fn events(&self) -> &EventBus {
        &self.world.events
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Run one step.
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        let mut report = StepReport {
            steps_run: 1,
            ..Default::default()
        };

        // Phase 1: Pre-step -- apply last step's decommissions.
        self.phase_pre_step(&mut report);

        // Phase 2: Tick -- agents issue requests and offers.
        self.phase_tick()?;

        // Phase 3: Route -- deliver them to the markets.
        self.route(&mut report)?;

        // Phase 4: Exchange -- collect, clear and route orders.
        self.phase_exchange(&mut report)?;

        // Phase 5: Tock -- agents apply mutations and ship.
        self.phase_tock(&mut report)?;

        // Phase 6: Post-step.
        self.phase_post_step();

        Ok(report)
    }

    /// Run `steps` steps, stopping at the first error.
    pub fn run(&mut self, steps: u64) -> Result<StepReport, SimError> {
        let mut total = StepReport::default();
        for _ in 0..steps {
            total.merge(self.step()?);
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Phase 1: Pre-step
    // -----------------------------------------------------------------------

    fn phase_pre_step(&mut self, report: &mut StepReport) {
        let tick = self.sim_state.tick;
        for id in std::mem::take(&mut self.pending_removals) {
            if self.agents.remove(id).is_none() {
                continue;
            }
            self.schedule.retain(|&a| a != id);
            self.names.remove(id);
            self.world.parents.remove(id);
            self.world.markets.retain(|_, market| *market != id);
            self.world
                .events
                .emit(Event::AgentDecommissioned { agent: id, tick });
            report.decommissioned.push(id);
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: Tick
    // -----------------------------------------------------------------------

    fn phase_tick(&mut self) -> Result<(), SimError> {
        let tick = self.sim_state.tick;
        for &id in &self.schedule {
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            let mut ctx = self.world.context(id, tick);
            agent.tick(&mut ctx).map_err(|e| e.at(id))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase 3: Route
    // -----------------------------------------------------------------------

    /// Deliver posted messages until the post office is empty.
    fn route(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        let tick = self.sim_state.tick;
        while let Some((dest, msg)) = self.world.post.pop() {
            let agent = self
                .agents
                .get_mut(dest)
                .ok_or(ProtocolError::UnknownAgent(dest))?;
            let mut ctx = self.world.context(dest, tick);
            agent.receive_message(msg, &mut ctx).map_err(|e| e.at(dest))?;
            report.messages_delivered += 1;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase 4: Exchange
    // -----------------------------------------------------------------------

    fn phase_exchange(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        let tick = self.sim_state.tick;
        let traders: Vec<(AgentId, &dyn Trader)> = self
            .schedule
            .iter()
            .filter_map(|&id| {
                let trader = self.agents.get(id)?.as_trader()?;
                Some((id, trader))
            })
            .collect();
        let round = ExchangeRound::collect(&traders)?;

        let counts = [
            (
                Material::KIND,
                round.material.requests().len(),
                round.material.bids().len(),
            ),
            (
                GenericResource::KIND,
                round.generic.requests().len(),
                round.generic.bids().len(),
            ),
        ];
        for (kind, requests, bids) in counts {
            self.world.events.emit(Event::ExchangeCollected {
                kind,
                requests,
                bids,
                tick,
            });
        }

        let orders = match self.clearing.as_mut() {
            Some(clearing) => clearing.clear(&round, &self.world.markets)?,
            None => Vec::new(),
        };
        self.last_round = round;

        report.orders += orders.len() as u64;
        for order in orders {
            self.send_order(order)?;
        }
        self.route(report)
    }

    /// Post `order` down the supplier's ownership chain, root first.
    fn send_order(&mut self, order: Order) -> Result<(), SimError> {
        if !self.agents.contains_key(order.supplier) {
            return Err(ProtocolError::UnknownAgent(order.supplier).into());
        }
        let mut ancestors = Vec::new();
        let mut next = self.world.parent(order.supplier);
        while let Some(owner) = next {
            ancestors.push(owner);
            next = self.world.parent(owner);
        }
        ancestors.reverse();
        Message::order(order)
            .with_route(ancestors)
            .send_on(&mut self.world.post)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase 5: Tock
    // -----------------------------------------------------------------------

    fn phase_tock(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        let tick = self.sim_state.tick;
        for i in 0..self.schedule.len() {
            let id = self.schedule[i];
            if let Some(agent) = self.agents.get_mut(id) {
                let mut ctx = self.world.context(id, tick);
                agent.tock(&mut ctx).map_err(|e| e.at(id))?;
            }
            self.deliver_shipments(report)?;
            self.apply_decommissions()?;
        }
        Ok(())
    }

    fn deliver_shipments(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        let tick = self.sim_state.tick;
        while !self.world.shipments.is_empty() {
            for shipment in std::mem::take(&mut self.world.shipments) {
                let Shipment {
                    to,
                    transaction,
                    manifest,
                    ..
                } = shipment;
                let agent = self
                    .agents
                    .get_mut(to)
                    .ok_or(ProtocolError::UnknownAgent(to))?;
                let mut ctx = self.world.context(to, tick);
                agent
                    .accept_resources(transaction, manifest, &mut ctx)
                    .map_err(|e| e.at(to))?;
                report.shipments += 1;
            }
        }
        Ok(())
    }

    /// Hand decommission requests to the owning institution and queue the
    /// agents for removal.
    fn apply_decommissions(&mut self) -> Result<(), SimError> {
        for id in std::mem::take(&mut self.world.decommissions) {
            if let Some(owner) = self.world.parent(id) {
                let institution = self
                    .agents
                    .get_mut(owner)
                    .and_then(|a| a.as_institution_mut())
                    .ok_or(ProtocolError::MissingCapability {
                        agent: owner,
                        capability: "institution",
                    })?;
                institution.decommission(id);
            }
            if !self.pending_removals.contains(&id) {
                self.pending_removals.push(id);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase 6: Post-step
    // -----------------------------------------------------------------------

    fn phase_post_step(&mut self) {
        self.world.events.deliver();
        self.sim_state.tick += 1;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
