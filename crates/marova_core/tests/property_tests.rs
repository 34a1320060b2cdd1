//! Property-based tests for marova_core.
//!
//! Uses proptest to verify that state normalization and the schedule
//! derivation hold for ALL inputs, including NaN and out-of-range values.

use marova_core::state::{
    derive_wake_hour, DREAM_DEBT_MAX, DREAM_ENERGY_MAX, HUNGER_MAX, METABOLISM_MAX,
    MIN_SLEEP_DURATION_HOURS, TOXICITY_MAX,
};
use marova_core::OrganismState;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Any f64 at all, including the non-finite ones.
fn arb_wild_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1.0e6f64..1.0e6,
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]
}

fn arb_wild_state() -> impl Strategy<Value = OrganismState> {
    (
        (arb_wild_f64(), arb_wild_f64(), arb_wild_f64(), arb_wild_f64(), arb_wild_f64()),
        (arb_wild_f64(), arb_wild_f64(), arb_wild_f64()),
        (0u32..200, arb_wild_f64()),
    )
        .prop_map(
            |(
                (hunger, metabolism, toxicity_level, dream_energy, dream_debt),
                (sensitivity_threshold, toxicity_resistance, dream_tolerance),
                (sleep_schedule_hour, sleep_duration_hours),
            )| OrganismState {
                hunger,
                metabolism,
                toxicity_level,
                dream_energy,
                dream_debt,
                sensitivity_threshold,
                toxicity_resistance,
                dream_tolerance,
                sleep_schedule_hour,
                sleep_duration_hours,
                ..OrganismState::default()
            },
        )
}

fn in_range(v: f64, max: f64) -> bool {
    v.is_finite() && (0.0..=max).contains(&v)
}

// ============================================================================
// normalize() Properties
// ============================================================================

proptest! {
    /// **Core invariant**: after normalize every bounded field is finite and in range.
    #[test]
    fn normalize_always_produces_valid_state(state in arb_wild_state()) {
        let mut s = state;
        s.normalize();

        prop_assert!(in_range(s.hunger, HUNGER_MAX), "hunger out of range: {}", s.hunger);
        prop_assert!(in_range(s.metabolism, METABOLISM_MAX), "metabolism out of range: {}", s.metabolism);
        prop_assert!(in_range(s.toxicity_level, TOXICITY_MAX), "toxicity out of range: {}", s.toxicity_level);
        prop_assert!(in_range(s.dream_energy, DREAM_ENERGY_MAX), "energy out of range: {}", s.dream_energy);
        prop_assert!(in_range(s.dream_debt, DREAM_DEBT_MAX), "debt out of range: {}", s.dream_debt);
        prop_assert!(in_range(s.sensitivity_threshold, 1.0));
        prop_assert!(in_range(s.toxicity_resistance, 1.0));
        prop_assert!(in_range(s.dream_tolerance, 1.0));
        prop_assert!(s.sleep_schedule_hour <= 23);
        prop_assert!(s.sleep_duration_hours >= MIN_SLEEP_DURATION_HOURS);
        prop_assert!(s.wake_schedule_hour <= 23);
    }

    /// **normalize() is idempotent**: calling it twice is the same as once.
    #[test]
    fn normalize_idempotent(state in arb_wild_state()) {
        let mut a = state;
        a.normalize();
        let mut b = a.clone();
        b.normalize();

        prop_assert_eq!(a.hunger.to_bits(), b.hunger.to_bits());
        prop_assert_eq!(a.metabolism.to_bits(), b.metabolism.to_bits());
        prop_assert_eq!(a.toxicity_level.to_bits(), b.toxicity_level.to_bits());
        prop_assert_eq!(a.dream_energy.to_bits(), b.dream_energy.to_bits());
        prop_assert_eq!(a.dream_debt.to_bits(), b.dream_debt.to_bits());
        prop_assert_eq!(a.wake_schedule_hour, b.wake_schedule_hour);
    }

    /// **Wake hour is always derived** from the sleep hour and duration.
    #[test]
    fn wake_hour_matches_formula(hour in 0u32..24, duration in 0.5f64..48.0) {
        let wake = derive_wake_hour(hour, duration);
        let expected = ((hour as f64 + duration) % 24.0).floor() as u32;
        prop_assert_eq!(wake, expected);
    }

    /// **Session fields are both-or-neither** after normalize.
    #[test]
    fn session_pair_consistent(has_start in any::<bool>(), has_end in any::<bool>()) {
        let now = chrono::Utc::now();
        let mut s = OrganismState::default();
        s.sleep_session_started_at = has_start.then_some(now);
        s.sleep_session_ends_at = has_end.then_some(now + chrono::Duration::hours(7));
        s.normalize();

        prop_assert_eq!(
            s.sleep_session_started_at.is_some(),
            s.sleep_session_ends_at.is_some()
        );
    }
}
