//! Mood Resolver - vitals to a named emotional state
//!
//! A pure threshold cascade: the same vitals and sleep recency always give the
//! same mood. The first matching rule wins, in this order:
//!
//! | mood      | energy | toxicity | sleep | hunger     |
//! |-----------|--------|----------|-------|------------|
//! | angry     | low    | high     | poor  | high       |
//! | depressed | low    | high     | poor  |            |
//! | sad       | low    | high     | good  | not high   |
//! | excited   | high   | low      | good  | low        |
//! | relaxed   | low    | low      | good  | low        |
//! | happy     | mid    | low      | good  | low        |
//! | neutral   | (anything else)                        |

use marova_core::{MoodThresholds, Mood, OrganismState};

/// Boolean reading of the vitals against the threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodSignals {
    pub energy_low: bool,
    pub energy_high: bool,
    pub toxicity_low: bool,
    pub toxicity_high: bool,
    pub hunger_low: bool,
    pub hunger_high: bool,
    pub sleep_good: bool,
    pub sleep_poor: bool,
}

impl MoodSignals {
    pub fn read(
        state: &OrganismState,
        hours_since_last_sleep: Option<f64>,
        thresholds: &MoodThresholds,
    ) -> Self {
        let debt_low = state.dream_debt <= thresholds.sleep_debt.low;
        let debt_high = state.dream_debt >= thresholds.sleep_debt.high;
        let overdue = hours_since_last_sleep
            .map(|h| h >= thresholds.overdue_sleep_hours)
            .unwrap_or(false);

        Self {
            energy_low: state.dream_energy <= thresholds.energy.low,
            energy_high: state.dream_energy >= thresholds.energy.high,
            toxicity_low: state.toxicity_level <= thresholds.toxicity.low,
            toxicity_high: state.toxicity_level >= thresholds.toxicity.high,
            hunger_low: state.hunger <= thresholds.hunger.low,
            hunger_high: state.hunger >= thresholds.hunger.high,
            sleep_good: debt_low && !overdue,
            sleep_poor: debt_high || overdue,
        }
    }
}

/// Classify the organism's mood.
///
/// `hours_since_last_sleep` is `None` when the organism has never slept; an
/// unknown gap never counts as overdue.
pub fn resolve_mood(
    state: &OrganismState,
    hours_since_last_sleep: Option<f64>,
    thresholds: &MoodThresholds,
) -> Mood {
    let s = MoodSignals::read(state, hours_since_last_sleep, thresholds);
    let energy_mid = !s.energy_low && !s.energy_high;

    if s.energy_low && s.sleep_poor && s.toxicity_high && s.hunger_high {
        Mood::Angry
    } else if s.energy_low && s.sleep_poor && s.toxicity_high {
        Mood::Depressed
    } else if s.energy_low && s.toxicity_high && s.sleep_good && !s.hunger_high {
        Mood::Sad
    } else if s.energy_high && s.toxicity_low && s.sleep_good && s.hunger_low {
        Mood::Excited
    } else if s.energy_low && s.toxicity_low && s.sleep_good && s.hunger_low {
        Mood::Relaxed
    } else if energy_mid && s.toxicity_low && s.sleep_good && s.hunger_low {
        Mood::Happy
    } else {
        Mood::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(energy: f64, toxicity: f64, hunger: f64, debt: f64) -> OrganismState {
        OrganismState {
            dream_energy: energy,
            toxicity_level: toxicity,
            hunger,
            dream_debt: debt,
            ..OrganismState::default()
        }
    }

    fn mood(state: &OrganismState, hours: Option<f64>) -> Mood {
        resolve_mood(state, hours, &MoodThresholds::default())
    }

    #[test]
    fn test_angry() {
        assert_eq!(mood(&vitals(2.0, 70.0, 100.0, 7.0), None), Mood::Angry);
        // Overdue sleep counts as poor sleep even with no debt
        assert_eq!(mood(&vitals(2.0, 70.0, 100.0, 0.0), Some(20.0)), Mood::Angry);
    }

    #[test]
    fn test_depressed() {
        assert_eq!(mood(&vitals(3.0, 65.0, 50.0, 6.0), None), Mood::Depressed);
    }

    #[test]
    fn test_sad() {
        assert_eq!(mood(&vitals(3.0, 65.0, 50.0, 1.0), Some(2.0)), Mood::Sad);
        // High hunger blocks sad
        assert_eq!(mood(&vitals(3.0, 65.0, 96.0, 1.0), Some(2.0)), Mood::Neutral);
    }

    #[test]
    fn test_excited() {
        assert_eq!(mood(&vitals(10.0, 10.0, 30.0, 0.5), Some(1.0)), Mood::Excited);
    }

    #[test]
    fn test_relaxed() {
        assert_eq!(mood(&vitals(4.0, 25.0, 40.0, 2.0), None), Mood::Relaxed);
    }

    #[test]
    fn test_happy() {
        assert_eq!(mood(&vitals(6.0, 5.0, 20.0, 0.0), Some(3.0)), Mood::Happy);
    }

    #[test]
    fn test_neutral_default() {
        assert_eq!(mood(&OrganismState::default(), None), Mood::Neutral);
        // Overdue sleep spoils an otherwise happy reading
        assert_eq!(mood(&vitals(6.0, 5.0, 20.0, 0.0), Some(18.0)), Mood::Neutral);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let mut thresholds = MoodThresholds::default();
        thresholds.hunger.low = 60.0;
        let state = vitals(6.0, 5.0, 50.0, 0.0);
        assert_eq!(resolve_mood(&state, None, &MoodThresholds::default()), Mood::Neutral);
        assert_eq!(resolve_mood(&state, None, &thresholds), Mood::Happy);
    }
}
