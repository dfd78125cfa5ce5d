//! Counter behavior across scans.

mod common;

use common::{output, running_engine};
use ilsim_vm::{Counter, CounterKind, ScanEngine};

fn counter<'a>(engine: &'a ScanEngine, id: &str) -> &'a Counter {
    engine.memory_variable(id).and_then(|v| v.as_counter()).unwrap()
}

/// Drives one false to true edge on `id`, one scan per level.
fn pulse(engine: &mut ScanEngine, id: &str) {
    engine.set_input(id, false).unwrap();
    engine.execute_cycle().unwrap();
    engine.set_input(id, true).unwrap();
    engine.execute_cycle().unwrap();
}

#[test]
fn ctu_when_held_true_then_counts_once() {
    let mut engine = running_engine("LD I0.0\nCTU C0 3");
    engine.set_input("I0.0", true).unwrap();

    for _ in 0..10 {
        engine.execute_cycle().unwrap();
    }

    assert_eq!(counter(&engine, "C0").accumulated(), 1);
}

#[test]
fn ctu_when_counted_past_preset_then_not_clamped_and_done() {
    let mut engine = running_engine("LD I0.0\nCTU C0 3\nST Q0.0");

    for edge in 1..=5 {
        pulse(&mut engine, "I0.0");
        assert_eq!(counter(&engine, "C0").accumulated(), edge);
        assert_eq!(counter(&engine, "C0").done(), edge >= 3);
        assert_eq!(output(&engine, "Q0.0"), edge >= 3);
    }
}

#[test]
fn ctd_when_loaded_by_ctl_then_counts_to_zero_and_below() {
    let mut engine = running_engine("LD I0.1\nCTL C0 3\nLD I0.0\nCTD C0\nST Q0.0");
    engine.set_input("I0.1", true).unwrap();
    engine.execute_cycle().unwrap();
    engine.set_input("I0.1", false).unwrap();
    assert_eq!(counter(&engine, "C0").accumulated(), 3);
    assert_eq!(counter(&engine, "C0").kind(), CounterKind::Down);

    for _ in 0..3 {
        pulse(&mut engine, "I0.0");
    }
    assert_eq!(counter(&engine, "C0").accumulated(), 0);
    assert!(counter(&engine, "C0").done());
    assert!(output(&engine, "Q0.0"));

    pulse(&mut engine, "I0.0");
    assert_eq!(counter(&engine, "C0").accumulated(), -1);
    assert!(counter(&engine, "C0").done());
}

#[test]
fn ctd_when_created_with_preset_then_first_edge_decrements() {
    let mut engine = running_engine("LD I0.0\nCTD C1 10");
    engine.set_input("I0.0", true).unwrap();

    engine.execute_cycle().unwrap();

    assert_eq!(counter(&engine, "C1").accumulated(), 9);
}

#[test]
fn ctr_when_triggered_then_up_counter_returns_to_zero() {
    let mut engine = running_engine("LD I0.0\nCTU C0 5\nLD I0.1\nCTR C0");
    pulse(&mut engine, "I0.0");
    pulse(&mut engine, "I0.0");
    assert_eq!(counter(&engine, "C0").accumulated(), 2);

    engine.set_input("I0.1", true).unwrap();
    engine.execute_cycle().unwrap();

    assert_eq!(counter(&engine, "C0").accumulated(), 0);
}

#[test]
fn counter_when_preset_out_of_range_then_engine_stops() {
    let mut engine = running_engine("LD I0.0\nCTU C0 10000");

    let err = engine.execute_cycle().unwrap_err();

    assert_eq!(err.problem().code(), "P0202");
    assert!(engine.memory_variable("C0").is_none());
}

#[test]
fn counter_when_cascaded_then_done_bit_chains() {
    // Two cascaded counters: C1 counts completed cycles of C0.
    let mut engine = running_engine("LD I0.0\nCTU C0 2\nCTU C1 2\nLD C0\nAND I0.0\nCTR C0");

    for _ in 0..4 {
        pulse(&mut engine, "I0.0");
    }

    assert_eq!(counter(&engine, "C1").accumulated(), 2);
    assert!(counter(&engine, "C1").done());
}
