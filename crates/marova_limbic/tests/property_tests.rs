//! Property-based tests for marova_limbic aggregation and mood.
//!
//! Verifies that one aggregation pass always lands between the old value and
//! the target, stays inside the clamp ranges, and that mood resolution is a
//! deterministic function of its inputs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use marova_core::state::{DREAM_DEBT_MAX, DREAM_ENERGY_MAX, HUNGER_MAX, METABOLISM_MAX, TOXICITY_MAX};
use marova_core::{
    MarovaConfig, MemoryLogEntry, MoodThresholds, OrganismState, SleepCycleRecord, Snapshot,
};
use marova_limbic::{blend, resolve_mood, StateAggregator, TelemetryRecorder};
use proptest::prelude::*;
use uuid::Uuid;

/// Rounding to three decimals may overshoot the interval by half a unit.
const ROUNDING_SLACK: f64 = 5e-4 + 1e-9;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).unwrap()
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_state() -> impl Strategy<Value = OrganismState> {
    (
        (0.0f64..=HUNGER_MAX, 0.0f64..=METABOLISM_MAX, 0.0f64..=TOXICITY_MAX),
        (0.0f64..=DREAM_ENERGY_MAX, 0.0f64..=DREAM_DEBT_MAX),
        (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0),
        proptest::option::of(0i64..200),
    )
        .prop_map(|((hunger, metabolism, toxicity_level), (dream_energy, dream_debt), (s, r, t), fed)| {
            OrganismState {
                hunger,
                metabolism,
                toxicity_level,
                dream_energy,
                dream_debt,
                sensitivity_threshold: s,
                toxicity_resistance: r,
                dream_tolerance: t,
                last_feed: fed.map(|h| now() - Duration::hours(h)),
                auto_sleep_enabled: false,
                ..OrganismState::default()
            }
        })
}

fn arb_log() -> impl Strategy<Value = MemoryLogEntry> {
    (-1.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0i64..500).prop_map(|(valence, strength, toxicity, age)| {
        MemoryLogEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            timestamp: now() - Duration::hours(age),
            valence,
            strength,
            toxicity,
            embedding: vec![0.0, 1.0],
            text: "m".into(),
            tokens_awarded: 100.0,
        }
    })
}

fn arb_cycle() -> impl Strategy<Value = SleepCycleRecord> {
    (0.5f64..12.0, 0.0f64..=1.0, any::<bool>(), 0i64..100).prop_map(|(duration_hours, quality, abrupt_wake, age)| {
        SleepCycleRecord {
            id: Uuid::new_v4(),
            duration_hours,
            quality,
            abrupt_wake,
            occurred_at: now() - Duration::hours(age),
        }
    })
}

fn between(value: f64, a: f64, b: f64) -> bool {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    value >= lo - ROUNDING_SLACK && value <= hi + ROUNDING_SLACK
}

// ============================================================================
// Aggregation Properties
// ============================================================================

proptest! {
    /// **Blend stays between** current and target for factors in [0, 1].
    #[test]
    fn blend_between_endpoints(current in -500.0f64..500.0, target in -500.0f64..500.0, factor in -1.0f64..2.0) {
        let v = blend(current, target, factor);
        prop_assert!(between(v, current, target), "{} not between {} and {}", v, current, target);
    }

    /// **Core invariant**: every blended vital lands between old value and
    /// target, inside its clamp range.
    #[test]
    fn aggregation_moves_toward_target(
        state in arb_state(),
        logs in proptest::collection::vec(arb_log(), 0..40),
        cycles in proptest::collection::vec(arb_cycle(), 0..15),
    ) {
        let aggregator = StateAggregator::new(&MarovaConfig::default());
        let snapshot = Snapshot {
            organism: state.clone(),
            memory_logs: logs,
            sleep_cycles: cycles,
            ..Snapshot::default()
        };
        let agg = aggregator.rebuild(&snapshot, &state, now());
        let out = &agg.state;
        let t = &agg.targets;

        prop_assert!(between(out.hunger, state.hunger, t.hunger));
        prop_assert!(between(out.metabolism, state.metabolism, t.metabolism));
        prop_assert!(between(out.toxicity_level, state.toxicity_level, t.toxicity));
        prop_assert!(between(out.dream_energy, state.dream_energy, t.dream_energy));
        prop_assert!(between(out.dream_debt, state.dream_debt, t.dream_debt));

        prop_assert!(out.hunger >= 0.0 && out.hunger <= HUNGER_MAX);
        prop_assert!(out.metabolism >= 0.0 && out.metabolism <= METABOLISM_MAX);
        prop_assert!(out.toxicity_level >= 0.0 && out.toxicity_level <= TOXICITY_MAX);
        prop_assert!(out.dream_energy >= 0.0 && out.dream_energy <= DREAM_ENERGY_MAX);
        prop_assert!(out.dream_debt >= 0.0 && out.dream_debt <= DREAM_DEBT_MAX);
    }

    /// **Persist keeps telemetry bounded** no matter how often it runs.
    #[test]
    fn persist_telemetry_bounded(steps in 1usize..40, capacity in 1usize..10) {
        let mut config = MarovaConfig::default();
        config.telemetry.capacity = capacity;
        let aggregator = StateAggregator::new(&config);
        let mut snapshot = Snapshot::default();
        for i in 0..steps {
            aggregator.persist(&mut snapshot, now() + Duration::minutes(5 * i as i64));
        }
        prop_assert!(snapshot.telemetry.len() <= capacity);
        prop_assert!(!snapshot.telemetry.is_empty());
    }
}

// ============================================================================
// Mood Properties
// ============================================================================

proptest! {
    /// **Mood is deterministic**: identical inputs give identical moods.
    #[test]
    fn mood_is_deterministic(state in arb_state(), hours in proptest::option::of(0.0f64..72.0)) {
        let thresholds = MoodThresholds::default();
        let a = resolve_mood(&state, hours, &thresholds);
        let b = resolve_mood(&state.clone(), hours, &thresholds);
        prop_assert_eq!(a, b);
    }

    /// **Telemetry samples are rounded** to three decimals.
    #[test]
    fn telemetry_sample_rounded(state in arb_state(), sleep_hours in 0.0f64..12.0) {
        let sample = TelemetryRecorder::sample(&state, sleep_hours, now());
        for v in [sample.hunger, sample.metabolism, sample.dream_energy, sample.toxicity_level, sample.sleep_hours] {
            prop_assert!(((v * 1000.0).round() - v * 1000.0).abs() < 1e-6);
        }
    }
}
