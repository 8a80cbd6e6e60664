//! Agent capabilities and the context agents act through.
//!
//! An agent is any value implementing [`Model`], which bundles the
//! independent capabilities [`TimeAgent`] (tick/tock) and [`Communicator`]
//! (message and resource receipt). Optional roles ([`Trader`],
//! [`Institution`]) are reached through the `as_*` accessors, never by
//! downcasting.
//!
//! Agents never touch each other. Everything they do to the outside world
//! goes through an [`AgentContext`]: messages are posted, shipments queued,
//! and decommission requests recorded for the engine to act on.

use crate::catalog::Catalog;
use crate::error::SimError;
use crate::event::{Event, EventBus};
use crate::exchange::{MarketDirectory, Trader};
use crate::fixed::Ticks;
use crate::id::{AgentId, CommodityId};
use crate::message::{Direction, Message, PostOffice, ProtocolError, Side, Transaction};
use crate::resource::{Manifest, total_quantity};
use slotmap::SecondaryMap;
use std::any::Any;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The two-phase step callbacks. Tick reads state and issues intents; tock
/// applies mutations.
pub trait TimeAgent {
    fn tick(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let _ = ctx;
        Ok(())
    }

    fn tock(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let _ = ctx;
        Ok(())
    }
}

/// Receipt of messages and of shipped material.
pub trait Communicator {
    /// Called when `msg` arrives at this agent, either as a relay hop or as
    /// its terminal recipient.
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError>;

    /// Called when a supplier ships material filling `transaction`.
    fn accept_resources(
        &mut self,
        transaction: Transaction,
        manifest: Manifest,
        ctx: &mut AgentContext<'_>,
    ) -> Result<(), SimError> {
        let _ = (transaction, manifest);
        Err(ProtocolError::ProtocolViolation {
            agent: ctx.id,
            message: None,
            reason: "agent does not accept resources".to_string(),
        }
        .into())
    }
}

/// Owner of an ordered collection of facilities.
pub trait Institution {
    fn add_facility(&mut self, facility: AgentId);

    fn facilities(&self) -> &[AgentId];

    fn facility_count(&self) -> usize {
        self.facilities().len()
    }

    /// Stop owning `facility`. Returns `false` if it was not owned.
    fn decommission(&mut self, facility: AgentId) -> bool;
}

/// The fixed capability set every agent type provides.
pub trait Model: TimeAgent + Communicator + std::fmt::Debug {
    /// Registered type name, e.g. `"BatchReactor"`.
    fn model_type(&self) -> &'static str;

    /// A fresh instance with this one's configuration and initial state.
    fn copy_fresh(&self) -> Box<dyn Model>;

    /// One-line human-readable state summary.
    fn summary(&self, catalog: &Catalog) -> String;

    fn as_trader(&self) -> Option<&dyn Trader> {
        None
    }

    fn as_institution(&self) -> Option<&dyn Institution> {
        None
    }

    fn as_institution_mut(&mut self) -> Option<&mut dyn Institution> {
        None
    }

    /// Downcast to `&dyn Any` for read access to concrete model types.
    fn as_any(&self) -> &dyn Any;
}

// ---------------------------------------------------------------------------
// AgentContext
// ---------------------------------------------------------------------------

/// Material moved from a supplier to a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shipment {
    pub from: AgentId,
    pub to: AgentId,
    pub transaction: Transaction,
    pub manifest: Manifest,
}

/// Mutable context passed to agent callbacks.
pub struct AgentContext<'a> {
    /// The agent being called.
    pub id: AgentId,
    /// Owning institution (facilities) or region (institutions).
    pub parent: Option<AgentId>,
    pub tick: Ticks,
    pub catalog: &'a Catalog,
    pub markets: &'a MarketDirectory,
    pub post: &'a mut PostOffice,
    pub shipments: &'a mut Vec<Shipment>,
    pub decommissions: &'a mut Vec<AgentId>,
    pub events: &'a mut EventBus,
}

impl AgentContext<'_> {
    /// The market clearing `commodity`.
    pub fn market_for(&self, commodity: CommodityId) -> Result<AgentId, ProtocolError> {
        self.markets
            .get(&commodity)
            .copied()
            .ok_or(ProtocolError::NoMarket(commodity))
    }

    /// Send `transaction` up to its commodity's market through the owning
    /// institution. Returns the market.
    pub fn issue(&mut self, transaction: Transaction) -> Result<AgentId, ProtocolError> {
        let market = self.market_for(transaction.commodity)?;
        let (commodity, quantity) = (transaction.commodity, transaction.quantity());
        let side = transaction.side;

        let mut msg = Message::new(self.id, market, transaction);
        if let Some(parent) = self.parent {
            msg.set_next_dest(parent);
        }
        msg.send_on(self.post)?;

        let (agent, tick) = (self.id, self.tick);
        self.events.emit(match side {
            Side::Request => Event::RequestIssued {
                agent,
                market,
                commodity,
                quantity,
                tick,
            },
            Side::Offer => Event::OfferIssued {
                agent,
                market,
                commodity,
                quantity,
                tick,
            },
        });
        Ok(market)
    }

    /// Relay a message that is passing through this agent. Upward messages
    /// detour through this agent's parent first.
    pub fn forward(&mut self, mut msg: Message) -> Result<(), ProtocolError> {
        if msg.direction() == Direction::Up
            && let Some(parent) = self.parent
        {
            msg.set_next_dest(parent);
        }
        self.events.emit(Event::MessageForwarded {
            message: msg.id(),
            via: self.id,
            tick: self.tick,
        });
        msg.send_on(self.post)
    }

    /// Queue `manifest` for delivery to `to`.
    pub fn ship(&mut self, to: AgentId, transaction: Transaction, manifest: Manifest) {
        self.events.emit(Event::ResourcesShipped {
            from: self.id,
            to,
            quantity: total_quantity(&manifest),
            tick: self.tick,
        });
        self.shipments.push(Shipment {
            from: self.id,
            to,
            transaction,
            manifest,
        });
    }

    /// Ask the owning institution to stop scheduling this agent.
    pub fn request_decommission(&mut self) {
        self.events.emit(Event::DecommissionRequested {
            agent: self.id,
            institution: self.parent,
            tick: self.tick,
        });
        self.decommissions.push(self.id);
    }

    pub fn emit(&mut self, event: Event) {
        self.events.emit(event);
    }

    /// Fail unless `msg` is an order naming this agent as supplier; record
    /// the filing otherwise.
    pub fn accept_order(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        msg.check_supplier(self.id)?;
        let trans = msg.trans();
        self.events.emit(Event::OrderFiled {
            supplier: self.id,
            requester: msg.requester().unwrap_or(msg.sender()),
            commodity: trans.commodity,
            quantity: trans.quantity(),
            tick: self.tick,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Everything an agent callback may read or append to, apart from the agents
/// themselves. Owned by the engine; agents see it through an
/// [`AgentContext`].
#[derive(Debug, Default)]
pub struct World {
    pub(crate) catalog: Catalog,
    pub(crate) markets: MarketDirectory,
    pub(crate) parents: SecondaryMap<AgentId, AgentId>,
    pub(crate) post: PostOffice,
    pub(crate) shipments: Vec<Shipment>,
    pub(crate) decommissions: Vec<AgentId>,
    pub(crate) events: EventBus,
}

impl World {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Context for a callback on agent `id` at `tick`.
    pub fn context(&mut self, id: AgentId, tick: Ticks) -> AgentContext<'_> {
        AgentContext {
            id,
            parent: self.parents.get(id).copied(),
            tick,
            catalog: &self.catalog,
            markets: &self.markets,
            post: &mut self.post,
            shipments: &mut self.shipments,
            decommissions: &mut self.decommissions,
            events: &mut self.events,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn markets(&self) -> &MarketDirectory {
        &self.markets
    }

    pub fn parent(&self, id: AgentId) -> Option<AgentId> {
        self.parents.get(id).copied()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Messages waiting for their next hop.
    pub fn post(&self) -> &PostOffice {
        &self.post
    }

    pub fn pending_shipments(&self) -> &[Shipment] {
        &self.shipments
    }

    pub fn pending_decommissions(&self) -> &[AgentId] {
        &self.decommissions
    }
}
