//! Fuelcycle Core -- a discrete-time agent economy for material flows.
//!
//! Facilities, institutions and regions are agents. Each step, facilities
//! request and offer quantified material through per-commodity markets; a
//! clearing stage turns the collected portfolios into orders, and suppliers
//! ship material straight into their requesters' buffers.
//!
//! # Step Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the simulation by one tick:
//!
//! 1. **Pre-step** -- Remove agents decommissioned during the previous step.
//! 2. **Tick** -- Agents read their state and issue requests and offers.
//! 3. **Route** -- Messages travel up the ownership tree to their market.
//! 4. **Exchange** -- Markets report portfolios; the clearing stage returns
//!    orders, which travel down the tree to each supplier.
//! 5. **Tock** -- Agents apply mutations; suppliers ship filled orders.
//! 6. **Post-step** -- Deliver buffered events and advance the clock.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns the agents and orchestrates the pipeline.
//! - [`agent::Model`] -- The capability set every agent implements.
//! - [`agents::BatchReactor`] -- Batch-cycling production facility.
//! - [`buffer::ResourceBuffer`] -- Quantity-conserving inventory.
//! - [`exchange::ResourceExchange`] -- Per-kind portfolio collection.
//! - [`message::Message`] -- Routed request, offer or order.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`catalog::Catalog`] -- Immutable commodity and recipe registry.
//! - [`event::EventBus`] -- Typed event bus with buffered delivery.

pub mod agent;
pub mod agents;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod exchange;
pub mod factory;
pub mod fixed;
pub mod id;
pub mod message;
pub mod resource;
pub mod sim;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
