//! Transactions and the messages that carry them between agents.
//!
//! A [`Message`] travels hop by hop. Each hop is either the next entry of its
//! forwarding route or, once the route is exhausted, the terminal recipient.
//! [`Message::send_on`] posts the message for its next hop in the
//! [`PostOffice`]; the engine drains the post office and hands each message
//! to the agent it is addressed to. Ownership moves with the message: nothing
//! is shared between sender and recipient.

use crate::fixed::{Fixed64, Quantity};
use crate::id::{AgentId, CommodityId, MessageId};
use crate::resource::{GenericResource, Material, Resource};
use std::collections::VecDeque;

/// Routing cycles are cut off after this many hops.
pub const MAX_HOPS: u32 = 64;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Whether a transaction asks for or provides a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Request,
    Offer,
}

/// The resource a transaction is about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Payload {
    Material(Material),
    Generic(GenericResource),
}

impl Payload {
    pub fn quantity(&self) -> Quantity {
        match self {
            Payload::Material(m) => m.quantity(),
            Payload::Generic(g) => g.quantity(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Material(_) => Material::KIND,
            Payload::Generic(_) => GenericResource::KIND,
        }
    }
}

/// A trade proposal. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transaction {
    pub commodity: CommodityId,
    pub side: Side,
    /// Unit price.
    pub price: Fixed64,
    /// Smallest acceptable fraction of the payload quantity.
    pub min_fraction: Fixed64,
    pub payload: Payload,
}

impl Transaction {
    /// A full-quantity, zero-price transaction.
    pub fn new(commodity: CommodityId, side: Side, payload: Payload) -> Self {
        Self {
            commodity,
            side,
            price: Fixed64::ZERO,
            min_fraction: Fixed64::ONE,
            payload,
        }
    }

    pub fn request(commodity: CommodityId, payload: Payload) -> Self {
        Self::new(commodity, Side::Request, payload)
    }

    pub fn offer(commodity: CommodityId, payload: Payload) -> Self {
        Self::new(commodity, Side::Offer, payload)
    }

    pub fn with_price(self, price: Fixed64) -> Self {
        Self { price, ..self }
    }

    pub fn with_min_fraction(self, min_fraction: Fixed64) -> Self {
        Self {
            min_fraction,
            ..self
        }
    }

    pub fn quantity(&self) -> Quantity {
        self.payload.quantity()
    }

    pub fn is_offer(&self) -> bool {
        self.side == Side::Offer
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Travel direction through the ownership tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a facility toward a market.
    Up,
    /// From a market toward a facility.
    Down,
}

/// A settled trade produced by a clearing stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Market that cleared the trade.
    pub market: AgentId,
    pub supplier: AgentId,
    pub requester: AgentId,
    pub transaction: Transaction,
}

/// Directed unit of communication. Owns exactly one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: Option<MessageId>,
    sender: AgentId,
    recipient: AgentId,
    direction: Direction,
    route: VecDeque<AgentId>,
    hops: u32,
    supplier: Option<AgentId>,
    requester: Option<AgentId>,
    transaction: Transaction,
}

impl Message {
    /// An upward message from `sender` to `recipient`.
    pub fn new(sender: AgentId, recipient: AgentId, transaction: Transaction) -> Self {
        Self {
            id: None,
            sender,
            recipient,
            direction: Direction::Up,
            route: VecDeque::new(),
            hops: 0,
            supplier: None,
            requester: None,
            transaction,
        }
    }

    /// A downward order message from the clearing market to the supplier.
    pub fn order(order: Order) -> Self {
        Self {
            id: None,
            sender: order.market,
            recipient: order.supplier,
            direction: Direction::Down,
            route: VecDeque::new(),
            hops: 0,
            supplier: Some(order.supplier),
            requester: Some(order.requester),
            transaction: order.transaction,
        }
    }

    /// Relay through `hop` before any hop already queued.
    pub fn set_next_dest(&mut self, hop: AgentId) {
        self.route.push_front(hop);
    }

    /// Append hops to the end of the forwarding route.
    pub fn with_route(mut self, hops: impl IntoIterator<Item = AgentId>) -> Self {
        self.route.extend(hops);
        self
    }

    /// Post this message for its next hop.
    pub fn send_on(mut self, post: &mut PostOffice) -> Result<(), ProtocolError> {
        self.hops += 1;
        if self.hops > MAX_HOPS {
            return Err(ProtocolError::HopLimitExceeded {
                message: self.id,
                hops: self.hops,
            });
        }
        let dest = self.route.pop_front().unwrap_or(self.recipient);
        post.post(dest, self);
        Ok(())
    }

    /// Fail with a protocol violation unless `me` is the declared supplier.
    pub fn check_supplier(&self, me: AgentId) -> Result<(), ProtocolError> {
        if self.supplier == Some(me) {
            Ok(())
        } else {
            Err(ProtocolError::ProtocolViolation {
                agent: me,
                message: self.id,
                reason: format!("declared supplier is {:?}", self.supplier),
            })
        }
    }

    pub fn id(&self) -> Option<MessageId> {
        self.id
    }

    pub fn sender(&self) -> AgentId {
        self.sender
    }

    pub fn recipient(&self) -> AgentId {
        self.recipient
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// Remaining forwarding hops before the terminal recipient.
    pub fn pending_route(&self) -> impl Iterator<Item = &AgentId> {
        self.route.iter()
    }

    pub fn supplier(&self) -> Option<AgentId> {
        self.supplier
    }

    pub fn requester(&self) -> Option<AgentId> {
        self.requester
    }

    pub fn is_order(&self) -> bool {
        self.supplier.is_some()
    }

    pub fn trans(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

// ---------------------------------------------------------------------------
// PostOffice
// ---------------------------------------------------------------------------

/// FIFO of messages awaiting delivery to their next hop.
#[derive(Debug, Default)]
pub struct PostOffice {
    queue: VecDeque<(AgentId, Message)>,
    next_id: u64,
    posted: u64,
}

impl PostOffice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `msg` for delivery to `dest`, stamping an id on first post.
    pub fn post(&mut self, dest: AgentId, mut msg: Message) {
        if msg.id.is_none() {
            msg.id = Some(MessageId(self.next_id));
            self.next_id += 1;
        }
        self.posted += 1;
        self.queue.push_back((dest, msg));
    }

    /// Next `(hop, message)` pair in posting order.
    pub fn pop(&mut self) -> Option<(AgentId, Message)> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Total hops posted since creation.
    pub fn total_posted(&self) -> u64 {
        self.posted
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Message routing and delivery failures. All are fatal for the step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol violation at agent {agent:?} (message {message:?}): {reason}")]
    ProtocolViolation {
        agent: AgentId,
        message: Option<MessageId>,
        reason: String,
    },
    #[error("message addressed to unknown agent {0:?}")]
    UnknownAgent(AgentId),
    #[error("message {message:?} exceeded the hop limit ({hops} hops)")]
    HopLimitExceeded {
        message: Option<MessageId>,
        hops: u32,
    },
    #[error("no market registered for commodity {0:?}")]
    NoMarket(CommodityId),
    #[error("agent {agent:?} lacks the {capability} capability")]
    MissingCapability {
        agent: AgentId,
        capability: &'static str,
    },
}
