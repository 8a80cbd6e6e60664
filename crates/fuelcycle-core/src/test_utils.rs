//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::agent::{AgentContext, World};
use crate::agents::{
    BatchReactor, BatchReactorParams, FuelPair, SinkFacility, SourceFacility,
};
use crate::catalog::{Catalog, CatalogBuilder};
use crate::engine::Engine;
use crate::exchange::{Clearing, ExchangeError, ExchangeRound, MarketDirectory};
use crate::fixed::{Fixed64, Quantity, Ticks, is_positive};
use crate::id::{AgentId, CommodityId, RecipeId};
use crate::message::{Order, Payload, Transaction};
use crate::resource::Material;
use slotmap::SlotMap;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Catalog
// ===========================================================================

/// A two-commodity fuel catalog and the ids it assigned.
#[derive(Debug, Clone)]
pub struct FuelIds {
    pub catalog: Catalog,
    pub fresh: CommodityId,
    pub spent: CommodityId,
    pub uox: RecipeId,
    pub spent_uox: RecipeId,
}

/// `fresh_fuel` and `spent_fuel` in kg, recipes `uox` and `spent_uox`.
pub fn fuel_catalog() -> FuelIds {
    let mut b = CatalogBuilder::new();
    let fresh = b.register_commodity("fresh_fuel").unwrap();
    let spent = b.register_commodity("spent_fuel").unwrap();
    let uox = b.register_recipe("uox").unwrap();
    let spent_uox = b.register_recipe("spent_uox").unwrap();
    FuelIds {
        catalog: b.build(),
        fresh,
        spent,
        uox,
        spent_uox,
    }
}

/// Reactor burning `uox` into `spent_uox`.
pub fn reactor_params(
    ids: &FuelIds,
    cycle_length: Ticks,
    lifetime: Ticks,
    core_loading: f64,
    batches: u32,
) -> BatchReactorParams {
    BatchReactorParams {
        cycle_length,
        lifetime,
        core_loading: fixed(core_loading),
        batches,
        fuel_pairs: vec![FuelPair {
            in_commodity: ids.fresh,
            in_recipe: ids.uox,
            out_commodity: ids.spent,
            out_recipe: ids.spent_uox,
        }],
    }
}

// ===========================================================================
// Harness
// ===========================================================================

/// A [`World`] with a reactor id owned by an institution and one market per
/// fuel commodity, for calling agent callbacks directly.
pub struct Harness {
    pub world: World,
    pub ids: FuelIds,
    pub tick: Ticks,
    pub reactor: AgentId,
    pub institution: AgentId,
    pub fresh_market: AgentId,
    pub spent_market: AgentId,
    keys: SlotMap<AgentId, ()>,
}

impl Harness {
    pub fn new() -> Self {
        let ids = fuel_catalog();
        let mut world = World::new(ids.catalog.clone());
        let mut keys = SlotMap::with_key();
        let institution = keys.insert(());
        let reactor = keys.insert(());
        let fresh_market = keys.insert(());
        let spent_market = keys.insert(());
        world.parents.insert(reactor, institution);
        world.markets.insert(ids.fresh, fresh_market);
        world.markets.insert(ids.spent, spent_market);
        Self {
            world,
            ids,
            tick: 0,
            reactor,
            institution,
            fresh_market,
            spent_market,
            keys,
        }
    }

    /// A new id unknown to the world.
    pub fn agent_id(&mut self) -> AgentId {
        self.keys.insert(())
    }

    pub fn ctx(&mut self, id: AgentId) -> AgentContext<'_> {
        self.world.context(id, self.tick)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Clearing
// ===========================================================================

/// Fills each request from the bids of its commodity in collection order.
///
/// Material requests only take bids of the requested recipe; generic
/// requests take any recipe. An agent never trades with itself. Prices and
/// minimum fractions are ignored.
#[derive(Debug, Default)]
pub struct FirstComeClearing;

impl Clearing for FirstComeClearing {
    fn clear(
        &mut self,
        round: &ExchangeRound,
        markets: &MarketDirectory,
    ) -> Result<Vec<Order>, ExchangeError> {
        let mut supply: Vec<(AgentId, CommodityId, RecipeId, Quantity)> = round
            .material
            .bids()
            .iter()
            .flat_map(|p| {
                p.bids
                    .iter()
                    .map(move |b| (p.bidder, b.commodity, b.offer.recipe, b.offer.quantity))
            })
            .collect();

        let material = round.material.requests().iter().flat_map(|p| {
            p.requests
                .iter()
                .map(move |r| (p.requester, r.commodity, Some(r.target.recipe), r.target.quantity))
        });
        let generic = round.generic.requests().iter().flat_map(|p| {
            p.requests
                .iter()
                .map(move |r| (p.requester, r.commodity, None, r.target.quantity))
        });

        let mut orders = Vec::new();
        for (requester, commodity, recipe, mut wanted) in material.chain(generic) {
            let market = markets
                .get(&commodity)
                .copied()
                .ok_or_else(|| ExchangeError::Clearing(format!("no market for {commodity:?}")))?;
            for (bidder, bid_commodity, bid_recipe, left) in supply.iter_mut() {
                if !is_positive(wanted) {
                    break;
                }
                if *bid_commodity != commodity
                    || *bidder == requester
                    || !is_positive(*left)
                    || recipe.is_some_and(|r| r != *bid_recipe)
                {
                    continue;
                }
                let take = wanted.min(*left);
                *left -= take;
                wanted -= take;
                orders.push(Order {
                    market,
                    supplier: *bidder,
                    requester,
                    transaction: Transaction::request(
                        commodity,
                        Payload::Material(Material::new(*bid_recipe, take)),
                    ),
                });
            }
        }
        Ok(orders)
    }
}

// ===========================================================================
// Scenario builders
// ===========================================================================

/// Agent ids of a [`build_fuel_cycle`] engine.
#[derive(Debug, Clone, Copy)]
pub struct FuelCycle {
    pub region: AgentId,
    pub institution: AgentId,
    pub fresh_market: AgentId,
    pub spent_market: AgentId,
    pub source: AgentId,
    pub reactor: AgentId,
    pub sink: AgentId,
}

/// Which of the source and the reactor a [`build_fuel_cycle_ordered`]
/// engine schedules first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    SourceFirst,
    ReactorFirst,
}

/// Source -> reactor -> sink under one institution and region, cleared
/// first come first served. Registration order: region, institution,
/// markets, source, reactor, sink.
pub fn build_fuel_cycle(params: BatchReactorParams, source_capacity: f64, sink_capacity: f64) -> (Engine, FuelCycle, FuelIds) {
    build_fuel_cycle_ordered(params, source_capacity, sink_capacity, Schedule::SourceFirst)
}

/// [`build_fuel_cycle`] with the source and reactor registered in the given
/// order. The sink always comes last.
pub fn build_fuel_cycle_ordered(
    params: BatchReactorParams,
    source_capacity: f64,
    sink_capacity: f64,
    schedule: Schedule,
) -> (Engine, FuelCycle, FuelIds) {
    let ids = fuel_catalog();
    let mut engine = Engine::new(ids.catalog.clone());
    let region = engine.add_region("region");
    let institution = engine.add_institution("utility", region).unwrap();
    let fresh_market = engine.add_market("fresh_fuel_market", ids.fresh).unwrap();
    let spent_market = engine.add_market("spent_fuel_market", ids.spent).unwrap();

    let add_source = |engine: &mut Engine| {
        engine
            .add_facility(
                "enrichment",
                Box::new(SourceFacility::new(ids.fresh, ids.uox, fixed(source_capacity))),
                institution,
            )
            .unwrap()
    };
    let add_reactor = |engine: &mut Engine| {
        engine
            .add_facility(
                "reactor",
                Box::new(BatchReactor::new(params.clone()).unwrap()),
                institution,
            )
            .unwrap()
    };
    let (source, reactor) = match schedule {
        Schedule::SourceFirst => {
            let source = add_source(&mut engine);
            (source, add_reactor(&mut engine))
        }
        Schedule::ReactorFirst => {
            let reactor = add_reactor(&mut engine);
            (add_source(&mut engine), reactor)
        }
    };

    let sink = engine
        .add_facility(
            "repository",
            Box::new(SinkFacility::new(vec![ids.spent], fixed(sink_capacity), None)),
            institution,
        )
        .unwrap();
    engine.set_clearing(Box::new(FirstComeClearing));
    let cycle = FuelCycle {
        region,
        institution,
        fresh_market,
        spent_market,
        source,
        reactor,
        sink,
    };
    (engine, cycle, ids)
}
