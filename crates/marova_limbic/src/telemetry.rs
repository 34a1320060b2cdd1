//! Vital-sign telemetry with idle deduplication.
//!
//! A sample is dropped when it arrives within `min_interval_secs` of the
//! previous one, every tracked metric moved by less than `epsilon`, and the
//! sleep phase is unchanged. Transitions are always captured.

use chrono::{DateTime, Utc};
use marova_core::{round3, OrganismState, TelemetryConfig, TelemetryEntry};

#[derive(Debug, Clone)]
pub struct TelemetryRecorder {
    capacity: usize,
    min_interval_secs: i64,
    epsilon: f64,
}

impl TelemetryRecorder {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            min_interval_secs: config.min_interval_secs,
            epsilon: config.epsilon,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample(state: &OrganismState, sleep_hours: f64, now: DateTime<Utc>) -> TelemetryEntry {
        TelemetryEntry {
            timestamp: now,
            hunger: round3(state.hunger),
            metabolism: round3(state.metabolism),
            dream_energy: round3(state.dream_energy),
            toxicity_level: round3(state.toxicity_level),
            sleep_hours: round3(sleep_hours),
            sleep_phase: state.sleep_phase,
            dream_debt: round3(state.dream_debt),
        }
    }

    fn is_duplicate(&self, last: &TelemetryEntry, next: &TelemetryEntry) -> bool {
        let elapsed = (next.timestamp - last.timestamp).num_seconds();
        if elapsed >= self.min_interval_secs {
            return false;
        }
        let close = |a: f64, b: f64| (a - b).abs() < self.epsilon;
        close(last.hunger, next.hunger)
            && close(last.metabolism, next.metabolism)
            && close(last.dream_energy, next.dream_energy)
            && close(last.toxicity_level, next.toxicity_level)
            && close(last.sleep_hours, next.sleep_hours)
            && last.sleep_phase == next.sleep_phase
    }

    /// Append a sample unless it duplicates the last one. Returns whether it
    /// was kept. The ring never exceeds capacity.
    pub fn record(
        &self,
        entries: &mut Vec<TelemetryEntry>,
        state: &OrganismState,
        sleep_hours: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let sample = Self::sample(state, sleep_hours, now);
        if let Some(last) = entries.last() {
            if self.is_duplicate(last, &sample) {
                tracing::trace!("Telemetry sample deduplicated");
                return false;
            }
        }
        entries.push(sample);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        true
    }

    /// The most recent `limit` entries, oldest first. `limit` is clamped to
    /// `[1, capacity]`.
    pub fn recent<'a>(&self, entries: &'a [TelemetryEntry], limit: usize) -> &'a [TelemetryEntry] {
        let limit = limit.clamp(1, self.capacity);
        &entries[entries.len().saturating_sub(limit)..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use marova_core::SleepPhase;

    fn recorder() -> TelemetryRecorder {
        TelemetryRecorder::new(&TelemetryConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_idle_samples_are_dropped() {
        let rec = recorder();
        let state = OrganismState::default();
        let mut entries = Vec::new();

        assert!(rec.record(&mut entries, &state, 6.0, t0()));
        assert!(!rec.record(&mut entries, &state, 6.0, t0() + Duration::seconds(60)));
        assert_eq!(entries.len(), 1);

        // Tiny drift is still idle
        let drifted = OrganismState { hunger: state.hunger + 0.04, ..state.clone() };
        assert!(!rec.record(&mut entries, &drifted, 6.0, t0() + Duration::seconds(90)));
    }

    #[test]
    fn test_interval_elapsed_keeps_sample() {
        let rec = recorder();
        let state = OrganismState::default();
        let mut entries = Vec::new();
        rec.record(&mut entries, &state, 6.0, t0());
        assert!(rec.record(&mut entries, &state, 6.0, t0() + Duration::seconds(120)));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_changes_are_captured_immediately() {
        let rec = recorder();
        let state = OrganismState::default();
        let mut entries = Vec::new();
        rec.record(&mut entries, &state, 6.0, t0());

        let hungrier = OrganismState { hunger: state.hunger + 0.06, ..state.clone() };
        assert!(rec.record(&mut entries, &hungrier, 6.0, t0() + Duration::seconds(1)));

        let asleep = OrganismState { sleep_phase: SleepPhase::Sleeping, ..hungrier.clone() };
        assert!(rec.record(&mut entries, &asleep, 6.0, t0() + Duration::seconds(2)));

        assert!(rec.record(&mut entries, &asleep, 7.0, t0() + Duration::seconds(3)));
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_ring_is_bounded() {
        let rec = TelemetryRecorder::new(&TelemetryConfig { capacity: 5, ..Default::default() });
        let mut entries = Vec::new();
        for i in 0..12 {
            let state = OrganismState { hunger: i as f64, ..OrganismState::default() };
            rec.record(&mut entries, &state, 6.0, t0() + Duration::seconds(i));
        }
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].hunger, 7.0);
        assert_eq!(rec.recent(&entries, 2).len(), 2);
        assert_eq!(rec.recent(&entries, 0).len(), 1);
        assert_eq!(rec.recent(&entries, 500).len(), 5);
    }
}
