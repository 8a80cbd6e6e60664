//! Integration tests for the fuel cycle engine.
//!
//! These tests run complete source -> reactor -> sink economies through the
//! full step pipeline: routing through the ownership tree, exchange and
//! clearing, shipments, phase transitions and decommissioning.

use fuelcycle_core::agents::{BatchReactor, Phase, SinkFacility, SourceFacility};
use fuelcycle_core::engine::Engine;
use fuelcycle_core::error::{FacilityError, SimError};
use fuelcycle_core::event::{Event, EventKind};
use fuelcycle_core::fixed::Fixed64;
use fuelcycle_core::test_utils::*;
use std::cell::RefCell;
use std::rc::Rc;

fn sink_total(engine: &Engine, cycle: &FuelCycle) -> Fixed64 {
    engine
        .agent_as::<SinkFacility>(cycle.sink)
        .unwrap()
        .inventory()
        .total_quantity()
}

fn source_total(engine: &Engine, cycle: &FuelCycle) -> Fixed64 {
    engine
        .agent_as::<SourceFacility>(cycle.source)
        .unwrap()
        .shipped_total()
}

// ===========================================================================
// Test 1: Full reactor lifetime
// ===========================================================================
//
// cycle 2, lifetime 8, core 100 in 5 batches. Loads at step 0, refuels at
// the end of steps 2 and 5, reloads in steps 3 and 6, shuts down at step 8
// and disappears at step 9.

#[test]
fn reactor_lifetime_end_to_end() {
    let ids = fuel_catalog();
    let (mut engine, cycle, _) = build_fuel_cycle(reactor_params(&ids, 2, 8, 100.0, 5), 1000.0, 1000.0);

    let phases = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&phases);
    engine.on_passive(
        EventKind::PhaseChanged,
        Box::new(move |event| {
            if let Event::PhaseChanged { to, tick, .. } = event {
                log.borrow_mut().push((*tick, *to));
            }
        }),
    );

    engine.step().unwrap();
    let reactor = engine.agent_as::<BatchReactor>(cycle.reactor).unwrap();
    assert_eq!(reactor.phase(), Phase::Operation);
    assert_eq!(reactor.in_core().total_quantity(), fixed(100.0));

    engine.run(8).unwrap();
    let reactor = engine.agent_as::<BatchReactor>(cycle.reactor).unwrap();
    assert_eq!(reactor.phase(), Phase::End);
    assert!(reactor.post_core().is_empty());
    assert!(reactor.in_core().is_empty());

    let report = engine.step().unwrap();
    assert_eq!(report.decommissioned, vec![cycle.reactor]);
    assert!(!engine.contains(cycle.reactor));

    assert_eq!(
        *phases.borrow(),
        vec![
            (0, Phase::Operation),
            (2, Phase::Refuel),
            (3, Phase::Operation),
            (5, Phase::Refuel),
            (6, Phase::Operation),
            (8, Phase::End),
        ]
    );

    // Everything the source shipped ends up in the sink.
    assert_eq!(source_total(&engine, &cycle), fixed(140.0));
    assert_eq!(sink_total(&engine, &cycle), fixed(140.0));
    assert!(
        engine
            .agent_as::<SinkFacility>(cycle.sink)
            .unwrap()
            .inventory()
            .iter()
            .all(|m| m.recipe == ids.spent_uox)
    );
}

// ===========================================================================
// Test 2: Removed agents stay removed
// ===========================================================================

#[test]
fn economy_keeps_running_after_decommission() {
    let ids = fuel_catalog();
    let (mut engine, cycle, _) = build_fuel_cycle(reactor_params(&ids, 2, 8, 100.0, 5), 1000.0, 1000.0);
    engine.run(20).unwrap();
    assert_eq!(engine.tick(), 20);
    assert!(!engine.contains(cycle.reactor));
    assert_eq!(engine.schedule().len(), 6);
    assert_eq!(sink_total(&engine, &cycle), fixed(140.0));
    assert_eq!(
        engine.events().total_emitted(EventKind::AgentDecommissioned),
        1
    );
}

// ===========================================================================
// Test 3: Partial deliveries across reactors
// ===========================================================================
//
// Two reactors share a source that supplies 150 per step. The first gets its
// full core at step 0, the second half of it; it completes loading at step 1.

#[test]
fn scarce_supply_is_delivered_over_several_steps() {
    let ids = fuel_catalog();
    let mut engine = Engine::new(ids.catalog.clone());
    let region = engine.add_region("region");
    let utility = engine.add_institution("utility", region).unwrap();
    engine.add_market("fresh", ids.fresh).unwrap();
    engine.add_market("spent", ids.spent).unwrap();
    engine
        .add_facility(
            "mine",
            Box::new(SourceFacility::new(ids.fresh, ids.uox, fixed(150.0))),
            utility,
        )
        .unwrap();
    engine
        .add_prototype(
            "lwr",
            Box::new(BatchReactor::new(reactor_params(&ids, 10, 100, 100.0, 4)).unwrap()),
        )
        .unwrap();
    let a = engine.build("lwr", utility).unwrap();
    let b = engine.build("lwr", utility).unwrap();
    engine.set_clearing(Box::new(FirstComeClearing));

    engine.step().unwrap();
    let first = engine.agent_as::<BatchReactor>(a).unwrap();
    let second = engine.agent_as::<BatchReactor>(b).unwrap();
    assert_eq!(first.phase(), Phase::Operation);
    assert_eq!(second.phase(), Phase::Begin);
    assert_eq!(second.request_amount(), fixed(50.0));
    assert_eq!(second.pre_core().total_quantity(), fixed(50.0));

    engine.step().unwrap();
    let second = engine.agent_as::<BatchReactor>(b).unwrap();
    assert_eq!(second.phase(), Phase::Operation);
    assert_eq!(second.in_core().total_quantity(), fixed(100.0));
    assert!(second.pre_core().is_empty());
}

// ===========================================================================
// Test 4: A full sink holds the reactor in END
// ===========================================================================

#[test]
fn full_sink_blocks_decommission() {
    let ids = fuel_catalog();
    let mut engine = Engine::new(ids.catalog.clone());
    let region = engine.add_region("region");
    let utility = engine.add_institution("utility", region).unwrap();
    engine.add_market("fresh", ids.fresh).unwrap();
    engine.add_market("spent", ids.spent).unwrap();
    engine
        .add_facility(
            "mine",
            Box::new(SourceFacility::new(ids.fresh, ids.uox, fixed(1000.0))),
            utility,
        )
        .unwrap();
    let reactor = engine
        .add_facility(
            "reactor",
            Box::new(BatchReactor::new(reactor_params(&ids, 2, 8, 100.0, 5)).unwrap()),
            utility,
        )
        .unwrap();
    let sink = engine
        .add_facility(
            "pool",
            Box::new(SinkFacility::new(vec![ids.spent], fixed(1000.0), Some(fixed(30.0)))),
            utility,
        )
        .unwrap();
    engine.set_clearing(Box::new(FirstComeClearing));

    engine.run(12).unwrap();
    let r = engine.agent_as::<BatchReactor>(reactor).unwrap();
    assert_eq!(r.phase(), Phase::End);
    assert_eq!(r.post_core().total_quantity(), fixed(110.0));
    let s = engine.agent_as::<SinkFacility>(sink).unwrap();
    assert_eq!(s.inventory().total_quantity(), fixed(30.0));
    assert_eq!(
        engine.events().total_emitted(EventKind::DecommissionRequested),
        0
    );
}

// ===========================================================================
// Test 5: Determinism
// ===========================================================================

#[test]
fn identical_setups_produce_identical_runs() {
    let run = || {
        let ids = fuel_catalog();
        let (mut engine, _, _) = build_fuel_cycle(reactor_params(&ids, 3, 12, 90.0, 3), 200.0, 50.0);
        let mut reports = Vec::new();
        for _ in 0..16 {
            reports.push(engine.step().unwrap());
        }
        (reports, engine.summaries())
    };
    assert_eq!(run(), run());
}

// ===========================================================================
// Test 6: Trading events
// ===========================================================================

#[test]
fn trading_is_visible_through_events() {
    let ids = fuel_catalog();
    let (mut engine, cycle, _) = build_fuel_cycle(reactor_params(&ids, 2, 8, 100.0, 5), 1000.0, 1000.0);

    let shipped = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&shipped);
    engine.on_passive(
        EventKind::ResourcesShipped,
        Box::new(move |event| {
            if let Event::ResourcesShipped { from, to, quantity, .. } = event {
                log.borrow_mut().push((*from, *to, *quantity));
            }
        }),
    );
    engine.run(4).unwrap();

    assert_eq!(
        *shipped.borrow(),
        vec![
            (cycle.source, cycle.reactor, fixed(100.0)),
            (cycle.source, cycle.reactor, fixed(20.0)),
            (cycle.reactor, cycle.sink, fixed(20.0)),
        ]
    );
    assert_eq!(engine.events().total_emitted(EventKind::OrderFiled), 3);
}

// ===========================================================================
// Test 7: Schedule order does not change the outcome
// ===========================================================================
//
// The reactor runs before its source, so each shipment lands after the
// reactor's tock and is only counted at the next one. The reactor must not
// order that fuel a second time. Same parameters as test 1: every phase
// change after the first load comes one step later, and the run still ends
// in a clean decommission with the material conserved.

#[test]
fn reactor_scheduled_before_its_source() {
    let ids = fuel_catalog();
    let (mut engine, cycle, _) = build_fuel_cycle_ordered(
        reactor_params(&ids, 2, 8, 100.0, 5),
        1000.0,
        1000.0,
        Schedule::ReactorFirst,
    );
    assert!(
        engine.schedule().iter().position(|&id| id == cycle.reactor)
            < engine.schedule().iter().position(|&id| id == cycle.source)
    );

    let phases = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&phases);
    engine.on_passive(
        EventKind::PhaseChanged,
        Box::new(move |event| {
            if let Event::PhaseChanged { to, tick, .. } = event {
                log.borrow_mut().push((*tick, *to));
            }
        }),
    );

    engine.step().unwrap();
    let reactor = engine.agent_as::<BatchReactor>(cycle.reactor).unwrap();
    assert_eq!(reactor.phase(), Phase::Begin);
    assert_eq!(reactor.received(), fixed(100.0));
    assert_eq!(reactor.outstanding(), Fixed64::ZERO);

    engine.step().unwrap();
    let reactor = engine.agent_as::<BatchReactor>(cycle.reactor).unwrap();
    assert_eq!(reactor.phase(), Phase::Operation);
    assert!(reactor.pre_core().is_empty());
    assert_eq!(reactor.in_core().total_quantity(), fixed(100.0));

    engine.run(7).unwrap();
    let report = engine.step().unwrap();
    assert_eq!(report.decommissioned, vec![cycle.reactor]);

    assert_eq!(
        *phases.borrow(),
        vec![
            (1, Phase::Operation),
            (3, Phase::Refuel),
            (5, Phase::Operation),
            (7, Phase::Refuel),
            (8, Phase::End),
        ]
    );
    assert_eq!(source_total(&engine, &cycle), fixed(120.0));
    assert_eq!(sink_total(&engine, &cycle), fixed(120.0));
}

// ===========================================================================
// Test 8: A limited sink of several commodities
// ===========================================================================

#[test]
fn limited_sink_shares_space_between_commodities() {
    let ids = fuel_catalog();
    let mut engine = Engine::new(ids.catalog.clone());
    let region = engine.add_region("region");
    let utility = engine.add_institution("utility", region).unwrap();
    engine.add_market("fresh", ids.fresh).unwrap();
    engine.add_market("spent", ids.spent).unwrap();
    for (name, commodity, recipe) in [
        ("mine", ids.fresh, ids.uox),
        ("pond", ids.spent, ids.spent_uox),
    ] {
        engine
            .add_facility(
                name,
                Box::new(SourceFacility::new(commodity, recipe, fixed(100.0))),
                utility,
            )
            .unwrap();
    }
    let sink = engine
        .add_facility(
            "store",
            Box::new(SinkFacility::new(
                vec![ids.fresh, ids.spent],
                fixed(100.0),
                Some(fixed(10.0)),
            )),
            utility,
        )
        .unwrap();
    engine.set_clearing(Box::new(FirstComeClearing));

    engine.run(3).unwrap();
    let s = engine.agent_as::<SinkFacility>(sink).unwrap();
    assert_eq!(s.inventory().total_quantity(), fixed(10.0));
    assert_eq!(s.inventory().count(), 2);
    assert_eq!(s.request_size(), Fixed64::ZERO);
}

// ===========================================================================
// Test 9: Running totals near the representable limit
// ===========================================================================

#[test]
fn overflowing_totals_fail_the_step() {
    let ids = fuel_catalog();
    let mut engine = Engine::new(ids.catalog.clone());
    let region = engine.add_region("region");
    let utility = engine.add_institution("utility", region).unwrap();
    engine.add_market("spent", ids.spent).unwrap();
    let pond = engine
        .add_facility(
            "pond",
            Box::new(SourceFacility::new(ids.spent, ids.spent_uox, fixed(1.5e9))),
            utility,
        )
        .unwrap();
    engine
        .add_facility(
            "store",
            Box::new(SinkFacility::new(vec![ids.spent], fixed(1.5e9), None)),
            utility,
        )
        .unwrap();
    engine.set_clearing(Box::new(FirstComeClearing));

    engine.step().unwrap();
    let err = engine.step().unwrap_err();
    assert_eq!(err.agent(), Some(pond));
    assert!(matches!(
        err.root(),
        SimError::Facility(FacilityError::TotalOverflow { .. })
    ));
}
