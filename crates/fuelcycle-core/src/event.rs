//! Typed event system with pre-allocated ring buffers.
//!
//! Agents and the engine emit events while a step runs; the engine delivers
//! them in batch at the end of the step. Each event kind has its own
//! [`EventBuffer`] ring buffer with a configurable capacity.
//!
//! Listeners are passive: they observe events read-only and cannot feed
//! mutations back into the simulation. Anything that changes the world goes
//! through the message protocol.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any allocation or recording for that kind.

use crate::agents::batch_reactor::Phase;
use crate::fixed::{Quantity, Ticks};
use crate::id::*;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Trading --
    RequestIssued {
        agent: AgentId,
        market: AgentId,
        commodity: CommodityId,
        quantity: Quantity,
        tick: Ticks,
    },
    OfferIssued {
        agent: AgentId,
        market: AgentId,
        commodity: CommodityId,
        quantity: Quantity,
        tick: Ticks,
    },
    /// A supplier accepted an order into its pending queue.
    OrderFiled {
        supplier: AgentId,
        requester: AgentId,
        commodity: CommodityId,
        quantity: Quantity,
        tick: Ticks,
    },
    ExchangeCollected {
        kind: &'static str,
        requests: usize,
        bids: usize,
        tick: Ticks,
    },

    // -- Routing --
    MessageForwarded {
        message: Option<MessageId>,
        via: AgentId,
        tick: Ticks,
    },
    ResourcesShipped {
        from: AgentId,
        to: AgentId,
        quantity: Quantity,
        tick: Ticks,
    },

    // -- Lifecycle --
    PhaseChanged {
        agent: AgentId,
        from: Phase,
        to: Phase,
        tick: Ticks,
    },
    DecommissionRequested {
        agent: AgentId,
        institution: Option<AgentId>,
        tick: Ticks,
    },
    AgentDecommissioned {
        agent: AgentId,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestIssued,
    OfferIssued,
    OrderFiled,
    ExchangeCollected,
    MessageForwarded,
    ResourcesShipped,
    PhaseChanged,
    DecommissionRequested,
    AgentDecommissioned,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 9;

impl Event {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RequestIssued { .. } => EventKind::RequestIssued,
            Event::OfferIssued { .. } => EventKind::OfferIssued,
            Event::OrderFiled { .. } => EventKind::OrderFiled,
            Event::ExchangeCollected { .. } => EventKind::ExchangeCollected,
            Event::MessageForwarded { .. } => EventKind::MessageForwarded,
            Event::ResourcesShipped { .. } => EventKind::ResourcesShipped,
            Event::PhaseChanged { .. } => EventKind::PhaseChanged,
            Event::DecommissionRequested { .. } => EventKind::DecommissionRequested,
            Event::AgentDecommissioned { .. } => EventKind::AgentDecommissioned,
        }
    }

    /// The tick the event was recorded at.
    pub fn tick(&self) -> Ticks {
        match self {
            Event::RequestIssued { tick, .. }
            | Event::OfferIssued { tick, .. }
            | Event::OrderFiled { tick, .. }
            | Event::ExchangeCollected { tick, .. }
            | Event::MessageForwarded { tick, .. }
            | Event::ResourcesShipped { tick, .. }
            | Event::PhaseChanged { tick, .. }
            | Event::DecommissionRequested { tick, .. }
            | Event::AgentDecommissioned { tick, .. } => *tick,
        }
    }
}

impl EventKind {
    /// Every kind, in index order.
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::RequestIssued,
        EventKind::OfferIssued,
        EventKind::OrderFiled,
        EventKind::ExchangeCollected,
        EventKind::MessageForwarded,
        EventKind::ResourcesShipped,
        EventKind::PhaseChanged,
        EventKind::DecommissionRequested,
        EventKind::AgentDecommissioned,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer: pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event into the ring buffer. If full, the oldest event is dropped.
    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total events written since creation (including dropped).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Iterate over events in order from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        // Once full, head points at the oldest entry.
        let start = if self.len < self.capacity() { 0 } else { self.head };
        let cap = self.capacity();
        (0..self.len).filter_map(move |i| self.events[(start + i) % cap].as_ref())
    }

    /// Clear all events from the buffer. The lifetime counter is kept.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    listener: PassiveListener,
    priority: ListenerPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Holds one ring buffer per event kind, listener lists, and suppression flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    /// Capacity for lazily allocated buffers.
    default_capacity: usize,
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with the given default buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Default::default(),
            default_capacity,
            next_insertion_order: 0,
        }
    }

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Register a listener with Normal priority and no filter.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_passive_filtered(kind, ListenerPriority::Normal, None, listener);
    }

    /// Register a listener with explicit priority and optional filter.
    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.listeners[kind.index()].push(ListenerEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
    }

    /// Deliver all buffered events to listeners, oldest first, then clear the
    /// buffers. Listeners run in `(priority, registration)` order.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            if self.suppressed[idx] {
                continue;
            }
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }

            let events: Vec<Event> = buffer.iter().cloned().collect();
            buffer.clear();

            let listeners = &mut self.listeners[idx];
            listeners.sort_by_key(|entry| (entry.priority, entry.insertion_order));
            for entry in listeners.iter_mut() {
                for event in &events {
                    if let Some(ref filter) = entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    /// Events of `kind` buffered since the last delivery, oldest first.
    pub fn buffered(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.buffers[kind.index()].iter().flat_map(|b| b.iter())
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Clear all buffers. Listeners and suppression settings are kept.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
