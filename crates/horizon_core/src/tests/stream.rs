//! Event stream invariants: ordering, conservation, determinism.

use std::collections::BTreeMap;

use crate::model::{AccountType, GroupingMode, PredictionParams, SpecialDate, TransferAmount};
use crate::prediction::{CancelFlag, PredictionInput, predict};
use crate::recorder::{CollectingSink, SinkEvent};
use crate::uncertain::UncertainValue;

use super::*;

fn params(grouping: GroupingMode) -> PredictionParams {
    PredictionParams {
        duration_days: 370,
        samples: 500,
        quantile: 0.8,
        snapshot_cron: "*-*-28".parse().unwrap(),
        grouping,
    }
}

fn fixture() -> PredictionInput {
    let mut checking = with_balance(
        account("checking"),
        first_date(),
        UncertainValue::fixed(5000.0),
    );
    checking.type_id = Some("cash".to_string());
    let mut savings = with_balance(
        with_lognormal_growth(
            account("savings"),
            UncertainValue::fixed(0.04),
            Some(UncertainValue::fixed(0.02)),
        ),
        first_date(),
        UncertainValue::fixed(1000.0),
    );
    savings.type_id = Some("invest".to_string());

    PredictionInput {
        entities: vec![checking, savings],
        templates: vec![
            transfer(
                "salary",
                "",
                "checking",
                1,
                "*-*-25",
                TransferAmount::Fixed(UncertainValue::fixed(3000.0)),
            ),
            transfer(
                "save",
                "checking",
                "savings",
                2,
                "*-*-26",
                TransferAmount::Fixed(UncertainValue::fixed(500.0)),
            ),
            transfer(
                "rent",
                "checking",
                "",
                2,
                "*-*-27",
                TransferAmount::Fixed(UncertainValue::fixed(1200.0)),
            ),
        ],
        account_types: vec![
            AccountType {
                id: "cash".to_string(),
                name: "Cash".to_string(),
                color: Some("#4caf50".to_string()),
            },
            AccountType {
                id: "invest".to_string(),
                name: "Investments".to_string(),
                color: None,
            },
        ],
        special_dates: vec![SpecialDate {
            date: date(2000, 7, 1),
            name: "midpoint".to_string(),
        }],
    }
}

fn run(grouping: GroupingMode, seed: u64) -> CollectingSink {
    predict(
        &fixture(),
        &params(grouping),
        start_date(),
        seed,
        CollectingSink::new(),
        &CancelFlag::new(),
    )
    .expect("prediction failed")
}

#[test]
fn test_setup_first_close_last() {
    let sink = run(GroupingMode::ByType, 1);
    assert!(matches!(sink.events.first(), Some(SinkEvent::Setup(_))));
    assert_eq!(sink.events.last(), Some(&SinkEvent::Close));
    let closes = sink
        .events
        .iter()
        .filter(|e| matches!(e, SinkEvent::Close))
        .count();
    assert_eq!(closes, 1);
    let setups = sink
        .events
        .iter()
        .filter(|e| matches!(e, SinkEvent::Setup(_)))
        .count();
    assert_eq!(setups, 1);
}

#[test]
fn test_snapshot_days_strictly_increase_per_group() {
    for grouping in [GroupingMode::None, GroupingMode::ByType, GroupingMode::Total] {
        let sink = run(grouping, 1);
        let mut last_day: BTreeMap<String, i64> = BTreeMap::new();
        for snapshot in sink.snapshots() {
            if let Some(previous) = last_day.get(&snapshot.id) {
                assert!(
                    snapshot.day > *previous,
                    "group {} emitted day {} after {}",
                    snapshot.id,
                    snapshot.day,
                    previous
                );
            }
            last_day.insert(snapshot.id.clone(), snapshot.day);
        }
        assert!(!last_day.is_empty(), "no snapshots emitted");
    }
}

#[test]
fn test_transfers_precede_same_day_snapshots() {
    let sink = run(GroupingMode::None, 1);
    let mut snapshot_seen_for_day: BTreeMap<i64, bool> = BTreeMap::new();
    for event in &sink.events {
        match event {
            SinkEvent::Snapshot(s) => {
                snapshot_seen_for_day.insert(s.day, true);
            }
            SinkEvent::Transfer(t) => {
                let day_ms = crate::date_math::epoch_ms(t.day);
                assert!(
                    !snapshot_seen_for_day.contains_key(&day_ms),
                    "transfer on {} arrived after a snapshot for the same day",
                    t.day
                );
            }
            _ => {}
        }
    }
}

#[test]
fn test_external_endpoints_are_reported() {
    let sink = run(GroupingMode::Total, 1);
    let mut salary_events = 0;
    let mut rent_events = 0;
    for t in sink.transfers() {
        if t.from.is_empty() {
            assert_eq!(t.to, "checking");
            salary_events += 1;
        }
        if t.to.is_empty() {
            assert_eq!(t.from, "checking");
            rent_events += 1;
        }
    }
    assert_eq!(salary_events, 12, "one salary per month");
    assert_eq!(rent_events, 12, "one rent per month");
}

#[test]
fn test_conservation_between_accounts() {
    let sink = run(GroupingMode::None, 1);
    // Every internal transfer's outflow equals its inflow by construction;
    // summing the realized stream per pair checks the recorded amounts agree
    // with what the ledger moved.
    let mut moved = 0.0;
    for t in sink.transfers() {
        if t.from == "checking" && t.to == "savings" {
            moved += t.amount.mean().unwrap();
        }
    }
    assert_eq!(moved, 500.0 * 12.0);
}

#[test]
fn test_identical_seeds_produce_identical_streams() {
    let a = run(GroupingMode::ByType, 99);
    let b = run(GroupingMode::ByType, 99);
    assert_eq!(a.events.len(), b.events.len());
    assert_eq!(a.events, b.events);
}

#[test]
fn test_different_seeds_differ_in_stochastic_output() {
    let a = run(GroupingMode::ByType, 1);
    let b = run(GroupingMode::ByType, 2);
    // The savings account carries volatility, so some emitted bound must
    // differ between seeds.
    let bounds = |sink: &CollectingSink| -> Vec<(i64, String, f64, f64)> {
        sink.snapshots()
            .map(|s| (s.day, s.id.clone(), s.lower_bound, s.upper_bound))
            .collect()
    };
    assert_ne!(bounds(&a), bounds(&b));
}

#[test]
fn test_setup_carries_marklines_and_group_colors() {
    let sink = run(GroupingMode::ByType, 1);
    let SinkEvent::Setup(setup) = &sink.events[0] else {
        panic!("expected setup first");
    };
    assert_eq!(setup.marklines.len(), 1);
    assert_eq!(setup.marklines[0].name, "midpoint");
    let cash = setup.entities.iter().find(|e| e.id == "cash").unwrap();
    assert_eq!(cash.color, "#4caf50");
    assert_eq!(cash.snapshots.len(), 1, "one observed history point");
}

#[test]
fn test_balance_limit_holds_across_stream() {
    // Inbound transfers to a capped account never push any emitted sample
    // of its balance past the limit.
    let mut capped = with_balance(
        account("capped"),
        first_date(),
        UncertainValue::fixed(800.0),
    );
    capped.balance_limit = Some(crate::model::BalanceLimit {
        upper: UncertainValue::fixed(1000.0),
    });
    let source = with_balance(
        account("source"),
        first_date(),
        UncertainValue::fixed(10_000.0),
    );
    let input = PredictionInput {
        entities: vec![source, capped],
        templates: vec![transfer(
            "fill",
            "source",
            "capped",
            1,
            "*-*-25",
            TransferAmount::Fixed(UncertainValue::fixed(300.0)),
        )],
        account_types: vec![],
        special_dates: vec![],
    };
    let sink = predict(
        &input,
        &params(GroupingMode::None),
        start_date(),
        5,
        CollectingSink::new(),
        &CancelFlag::new(),
    )
    .unwrap();

    for snapshot in sink.snapshots().filter(|s| s.id == "capped") {
        assert!(
            snapshot.upper_bound <= 1000.0 + 1e-9,
            "capped account exceeded its limit: {snapshot:?}"
        );
    }
    // The first fill is clamped to the 200 of headroom.
    let first_fill = sink.transfers().next().unwrap();
    assert_eq!(first_fill.amount.mean().unwrap(), 200.0);
}
