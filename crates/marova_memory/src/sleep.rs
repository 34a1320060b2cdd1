//! Sleep Scheduler
//!
//! Two entry points share one recovery routine:
//! - a manual sleep cycle, applied immediately
//! - the circadian window, which opens a session while "now" lies inside it
//!   and retroactively finalizes a session that ended unobserved
//!
//! Finalization runs the manual cycle again. The [`SchedulerPass`] threaded
//! through the call keeps that inner cycle from finalizing a second time.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use uuid::Uuid;

use marova_core::state::{DNA_ENERGY_MAX, DREAM_DEBT_MAX, DREAM_ENERGY_MAX, MIN_SLEEP_DURATION_HOURS};
use marova_core::{
    clamp, AutoSleepRules, EngineResult, OrganismState, SleepCycleRecord, SleepCycleRequest, SleepPhase,
    Snapshot,
};
use marova_limbic::StateAggregator;

/// Which pass a scheduler call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPass {
    /// An ordinary operation; ended sessions are finalized.
    Normal,
    /// The recovery cycle run by a finalization. Never finalizes again.
    Finalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Auto sleep disabled and no session recorded.
    Idle,
    /// Auto sleep enabled, outside the window, no session.
    WindowPending,
    Sleeping,
    /// A recorded session has ended and awaits finalization.
    Finalizing,
}

impl SchedulerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerStatus::Idle => "idle",
            SchedulerStatus::WindowPending => "scheduled-window-pending",
            SchedulerStatus::Sleeping => "sleeping",
            SchedulerStatus::Finalizing => "finalizing",
        }
    }
}

/// What one evaluation of the circadian window did.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Disabled,
    Unchanged,
    Opened { start: DateTime<Utc>, end: DateTime<Utc> },
    /// A future session was dropped without recovery.
    Cleared,
    Finalized { cycle: SleepCycleRecord },
}

impl SchedulerEvent {
    /// Subject line for the notifier, when the event is worth one.
    pub fn notification(&self) -> Option<String> {
        match self {
            SchedulerEvent::Opened { end, .. } => Some(format!(
                "Marova drifted into scheduled sleep until {}",
                end.to_rfc3339()
            )),
            SchedulerEvent::Finalized { cycle } => Some(format!(
                "Marova woke after {:.2} h of scheduled sleep",
                cycle.duration_hours
            )),
            _ => None,
        }
    }
}

/// A manual cycle together with whatever the window evaluation before it did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub record: SleepCycleRecord,
    pub schedule: SchedulerEvent,
}

fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

#[derive(Debug, Clone)]
pub struct SleepScheduler {
    rules: AutoSleepRules,
    zone: FixedOffset,
    aggregator: StateAggregator,
}

impl SleepScheduler {
    pub fn new(rules: AutoSleepRules, zone: FixedOffset, aggregator: StateAggregator) -> Self {
        Self { rules, zone, aggregator }
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    /// The window `[start, end)` containing or most recently preceding `now`:
    /// today's sleep hour in the local zone, or yesterday's if `now` is earlier.
    pub fn window(&self, state: &OrganismState, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let local = now.with_timezone(&self.zone);
        let hour = state.sleep_schedule_hour.min(23);
        let start_today = local
            .date_naive()
            .and_hms_opt(hour, 0, 0)
            .and_then(|naive| self.zone.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);
        let start = if now >= start_today {
            start_today
        } else {
            start_today - Duration::days(1)
        };
        let duration = state.sleep_duration_hours.max(MIN_SLEEP_DURATION_HOURS);
        (start, start + hours_to_duration(duration))
    }

    pub fn status(&self, state: &OrganismState, now: DateTime<Utc>) -> SchedulerStatus {
        match (state.sleep_session_started_at, state.sleep_session_ends_at) {
            (Some(_), Some(end)) if now >= end => SchedulerStatus::Finalizing,
            (Some(start), Some(_)) if now >= start => SchedulerStatus::Sleeping,
            _ if !state.auto_sleep_enabled => SchedulerStatus::Idle,
            _ => {
                let (start, end) = self.window(state, now);
                if start <= now && now < end {
                    SchedulerStatus::Sleeping
                } else {
                    SchedulerStatus::WindowPending
                }
            }
        }
    }

    // ========================================================================
    // Manual cycle
    // ========================================================================

    /// Apply a sleep cycle's recovery to the snapshot and run the persist path.
    ///
    /// With [`SchedulerPass::Normal`] the circadian window is evaluated first,
    /// so an ended session is finalized before the requested cycle applies.
    pub fn sleep_cycle(
        &self,
        snapshot: &mut Snapshot,
        request: &SleepCycleRequest,
        now: DateTime<Utc>,
        pass: SchedulerPass,
    ) -> EngineResult<CycleOutcome> {
        request.validate()?;
        let schedule = match pass {
            SchedulerPass::Normal => self.evaluate(snapshot, now, pass)?,
            SchedulerPass::Finalizing => SchedulerEvent::Unchanged,
        };
        let record = apply_sleep_cycle(snapshot, request, now);
        self.aggregator.persist(snapshot, now);
        Ok(CycleOutcome { record, schedule })
    }

    // ========================================================================
    // Circadian window
    // ========================================================================

    pub fn evaluate(
        &self,
        snapshot: &mut Snapshot,
        now: DateTime<Utc>,
        pass: SchedulerPass,
    ) -> EngineResult<SchedulerEvent> {
        if !snapshot.organism.auto_sleep_enabled {
            return Ok(SchedulerEvent::Disabled);
        }
        snapshot.organism.normalize_schedule();

        let session = (
            snapshot.organism.sleep_session_started_at,
            snapshot.organism.sleep_session_ends_at,
        );
        if let (Some(started), Some(ended)) = session {
            if now >= ended {
                if pass == SchedulerPass::Finalizing {
                    return Ok(SchedulerEvent::Unchanged);
                }
                return self.finalize(snapshot, started, ended, now);
            }
        }

        let (start, end) = self.window(&snapshot.organism, now);
        let state = &mut snapshot.organism;
        if start <= now && now < end {
            let mut event = SchedulerEvent::Unchanged;
            if state.sleep_session_started_at != Some(start) {
                state.open_session(start, end);
                tracing::info!(start = %start, end = %end, "Auto-sleep session opened");
                event = SchedulerEvent::Opened { start, end };
            }
            state.sleep_phase = SleepPhase::Sleeping;
            return Ok(event);
        }

        let mut event = SchedulerEvent::Unchanged;
        if matches!(state.sleep_session_started_at, Some(s) if now < s) {
            state.clear_session();
            tracing::info!("Stale auto-sleep session cleared");
            event = SchedulerEvent::Cleared;
        }
        if state.sleep_phase == SleepPhase::Sleeping && !state.session_active_at(now) {
            state.sleep_phase = SleepPhase::Awake;
        }
        Ok(event)
    }

    fn finalize(
        &self,
        snapshot: &mut Snapshot,
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EngineResult<SchedulerEvent> {
        let state = &mut snapshot.organism;
        state.clear_session();
        if state.sleep_phase == SleepPhase::Sleeping {
            state.sleep_phase = SleepPhase::Awake;
        }

        let duration = OrganismState::hours_between(started, ended).max(MIN_SLEEP_DURATION_HOURS);
        let request = SleepCycleRequest {
            duration_hours: duration,
            quality: self.rules.default_quality,
            abrupt_wake: false,
        };
        let cycle = self.sleep_cycle(snapshot, &request, now, SchedulerPass::Finalizing)?.record;
        snapshot.organism.sleep_phase = SleepPhase::Waking;

        tracing::info!(
            duration_hours = cycle.duration_hours,
            quality = cycle.quality,
            "Auto-sleep session finalized"
        );
        Ok(SchedulerEvent::Finalized { cycle })
    }
}

/// Recovery effects of one sleep cycle. Does not aggregate.
pub fn apply_sleep_cycle(snapshot: &mut Snapshot, request: &SleepCycleRequest, now: DateTime<Utc>) -> SleepCycleRecord {
    let duration = request.duration_hours;
    let quality = request.quality;
    let state = &mut snapshot.organism;

    state.sleep_phase = SleepPhase::Sleeping;
    let mut regen = duration * (0.4 + quality);
    if request.abrupt_wake {
        regen *= 0.6;
        state.dream_debt = clamp(state.dream_debt + 0.4, 0.0, DREAM_DEBT_MAX);
    }
    state.dream_energy = clamp(state.dream_energy + regen, 0.0, DREAM_ENERGY_MAX);

    let detox = duration * quality * 0.05;
    state.toxicity_level = (state.toxicity_level - detox).max(0.0);
    state.last_sleep = Some(now);

    let node_detox = detox * 0.25;
    for node in snapshot.memory_nodes.iter_mut() {
        node.toxicity = (node.toxicity - node_detox).max(0.0);
    }

    let mut token_regen = duration * quality * 0.4;
    if request.abrupt_wake {
        token_regen *= 0.5;
    }
    for token in snapshot.dna_tokens.iter_mut() {
        let refilled = clamp(token.remaining_energy + token_regen, 0.0, DNA_ENERGY_MAX);
        token.remaining_energy = (refilled * 1e6).round() / 1e6;
    }

    let record = SleepCycleRecord {
        id: Uuid::new_v4(),
        duration_hours: duration,
        quality,
        abrupt_wake: request.abrupt_wake,
        occurred_at: now,
    };
    snapshot.sleep_cycles.push(record.clone());
    snapshot.trim_sleep_history();

    tracing::info!(
        duration_hours = duration,
        quality,
        abrupt = request.abrupt_wake,
        "Sleep cycle applied"
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use marova_core::{DnaToken, MarovaConfig, MemoryNode, SLEEP_HISTORY_LIMIT};

    fn zone() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn local(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        zone()
            .with_ymd_and_hms(2026, 5, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn scheduler() -> SleepScheduler {
        let config = MarovaConfig::default();
        SleepScheduler::new(config.auto_sleep.clone(), zone(), StateAggregator::new(&config))
    }

    fn snapshot() -> Snapshot {
        Snapshot::initial(&MarovaConfig::default())
    }

    #[test]
    fn test_apply_cycle_effects() {
        let mut snap = snapshot();
        snap.organism.dream_energy = 5.0;
        snap.organism.toxicity_level = 10.0;
        snap.memory_nodes.push(MemoryNode {
            id: Uuid::new_v4(),
            log_id: Uuid::new_v4(),
            valence: 0.0,
            strength: 0.5,
            toxicity: 0.5,
            energy_reserve: 0.3,
            neighbors: vec![],
        });
        snap.dna_tokens.push(DnaToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_at: local(1, 9, 0),
            payload_checksum: String::new(),
            remaining_energy: 2.0,
        });

        let request = SleepCycleRequest { duration_hours: 6.0, quality: 0.6, abrupt_wake: false };
        apply_sleep_cycle(&mut snap, &request, local(1, 9, 0));

        // 6 * (0.4 + 0.6) = 6 on top of 5, capped at 12
        assert_eq!(snap.organism.dream_energy, 11.0);
        assert!((snap.organism.toxicity_level - (10.0 - 0.18)).abs() < 1e-9);
        assert!((snap.memory_nodes[0].toxicity - (0.5 - 0.045)).abs() < 1e-9);
        assert!((snap.dna_tokens[0].remaining_energy - 3.44).abs() < 1e-9);
        assert_eq!(snap.organism.sleep_phase, SleepPhase::Sleeping);
        assert_eq!(snap.organism.last_sleep, Some(local(1, 9, 0)));
        assert_eq!(snap.sleep_cycles.len(), 1);
    }

    #[test]
    fn test_abrupt_wake_penalty() {
        let mut snap = snapshot();
        snap.organism.dream_energy = 0.0;
        let request = SleepCycleRequest { duration_hours: 5.0, quality: 0.6, abrupt_wake: true };
        apply_sleep_cycle(&mut snap, &request, local(1, 9, 0));
        assert!((snap.organism.dream_energy - 3.0).abs() < 1e-9);
        assert!((snap.organism.dream_debt - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut snap = snapshot();
        for _ in 0..(SLEEP_HISTORY_LIMIT + 5) {
            apply_sleep_cycle(&mut snap, &SleepCycleRequest::default(), local(1, 9, 0));
        }
        assert_eq!(snap.sleep_cycles.len(), SLEEP_HISTORY_LIMIT);
    }

    #[test]
    fn test_window_rolls_back_before_start() {
        let sched = scheduler();
        let state = snapshot().organism;
        let (start, end) = sched.window(&state, local(2, 2, 0));
        assert_eq!(start, local(1, 23, 0));
        assert_eq!(end, local(2, 6, 0));

        let (start, _) = sched.window(&state, local(2, 23, 30));
        assert_eq!(start, local(2, 23, 0));
    }

    #[test]
    fn test_opens_session_inside_window() {
        let sched = scheduler();
        let mut snap = snapshot();
        let event = sched.evaluate(&mut snap, local(2, 2, 0), SchedulerPass::Normal).unwrap();
        assert_eq!(
            event,
            SchedulerEvent::Opened { start: local(1, 23, 0), end: local(2, 6, 0) }
        );
        assert_eq!(snap.organism.sleep_phase, SleepPhase::Sleeping);
        assert!(event.notification().is_some());

        // Second evaluation in the same window changes nothing
        let again = sched.evaluate(&mut snap, local(2, 3, 0), SchedulerPass::Normal).unwrap();
        assert_eq!(again, SchedulerEvent::Unchanged);
        assert_eq!(sched.status(&snap.organism, local(2, 3, 0)), SchedulerStatus::Sleeping);
    }

    #[test]
    fn test_finalizes_ended_session() {
        let sched = scheduler();
        let mut snap = snapshot();
        sched.evaluate(&mut snap, local(2, 2, 0), SchedulerPass::Normal).unwrap();
        assert_eq!(sched.status(&snap.organism, local(2, 7, 0)), SchedulerStatus::Finalizing);

        let event = sched.evaluate(&mut snap, local(2, 7, 0), SchedulerPass::Normal).unwrap();
        match event {
            SchedulerEvent::Finalized { ref cycle } => {
                assert!((cycle.duration_hours - 7.0).abs() < 1e-9);
                assert_eq!(cycle.quality, 0.7);
            }
            ref other => panic!("expected finalization, got {other:?}"),
        }
        assert!(!snap.organism.has_session());
        assert_eq!(snap.organism.sleep_phase, SleepPhase::Waking);
        assert_eq!(snap.sleep_cycles.len(), 1);

        // Finalizes exactly once
        let again = sched.evaluate(&mut snap, local(2, 7, 5), SchedulerPass::Normal).unwrap();
        assert_eq!(again, SchedulerEvent::Unchanged);
        assert_eq!(snap.sleep_cycles.len(), 1);
        assert_eq!(sched.status(&snap.organism, local(2, 7, 5)), SchedulerStatus::WindowPending);
    }

    #[test]
    fn test_finalizing_pass_never_recurses() {
        let sched = scheduler();
        let mut snap = snapshot();
        snap.organism.open_session(local(1, 23, 0), local(2, 6, 0));
        let event = sched.evaluate(&mut snap, local(2, 8, 0), SchedulerPass::Finalizing).unwrap();
        assert_eq!(event, SchedulerEvent::Unchanged);
        assert!(snap.organism.has_session());
        assert!(snap.sleep_cycles.is_empty());
    }

    #[test]
    fn test_stale_future_session_cleared() {
        let sched = scheduler();
        let mut snap = snapshot();
        snap.organism.open_session(local(3, 23, 0), local(4, 6, 0));
        snap.organism.sleep_phase = SleepPhase::Sleeping;
        let event = sched.evaluate(&mut snap, local(2, 12, 0), SchedulerPass::Normal).unwrap();
        assert_eq!(event, SchedulerEvent::Cleared);
        assert!(!snap.organism.has_session());
        assert_eq!(snap.organism.sleep_phase, SleepPhase::Awake);
        assert!(snap.sleep_cycles.is_empty());
    }

    #[test]
    fn test_disabled_does_nothing() {
        let sched = scheduler();
        let mut snap = snapshot();
        snap.organism.auto_sleep_enabled = false;
        let event = sched.evaluate(&mut snap, local(2, 2, 0), SchedulerPass::Normal).unwrap();
        assert_eq!(event, SchedulerEvent::Disabled);
        assert!(!snap.organism.has_session());
        assert_eq!(sched.status(&snap.organism, local(2, 2, 0)), SchedulerStatus::Idle);
    }

    #[test]
    fn test_manual_cycle_persists() {
        let sched = scheduler();
        let mut snap = snapshot();
        snap.organism.auto_sleep_enabled = false;
        let outcome = sched
            .sleep_cycle(&mut snap, &SleepCycleRequest::default(), local(2, 12, 0), SchedulerPass::Normal)
            .unwrap();
        assert_eq!(outcome.record.duration_hours, 6.0);
        assert_eq!(outcome.schedule, SchedulerEvent::Disabled);
        assert_eq!(snap.telemetry.len(), 1);
        assert_eq!(snap.organism.sleep_phase, SleepPhase::Sleeping);

        let bad = SleepCycleRequest { duration_hours: 0.0, ..SleepCycleRequest::default() };
        assert!(sched.sleep_cycle(&mut snap, &bad, local(2, 12, 0), SchedulerPass::Normal).is_err());
    }
}
