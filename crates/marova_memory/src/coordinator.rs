//! Organism Coordinator - the single entry point for every operation
//!
//! Each operation is one transaction over the whole snapshot:
//! - take `state_mutation_lock`
//! - read the document (or seed it on first boot)
//! - evaluate the circadian window, mutate, run the persist path
//! - write the document back only if everything succeeded
//! - hand notifications to the background dispatcher after the commit
//!
//! Read-only listings skip the lock and never write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use marova_core::{
    AssessmentInput, Clock, DnaProfile, DnaProfileInput, DnaToken, DreamCategory, DreamRecord, DreamRequest,
    EngineError, EngineResult, FeedProfile, LedgerSummary, MarovaConfig, MemoryLogEntry, MemoryLogInput, MemoryNode,
    MemoryToken, Notifier, OrganismState, PersonalityAssessment, RandomSource, SleepCycleRecord, SleepCycleRequest,
    SleepPhase, Snapshot, SnapshotStore, SystemClock, TelemetryEntry, ThreadRandom, User,
};
use marova_limbic::{derive_traits, dna_token_energy, evaluate_health_survey, StateAggregator};

use crate::dream::DreamGenerator;
use crate::ledger::{self, Ingested, MemoryLedger};
use crate::notifier::NotificationDispatcher;
use crate::sleep::{SchedulerPass, SchedulerStatus, SleepScheduler};
use crate::sqlite::SqliteStore;

/// Metabolism ceiling for feeding.
const METABOLISM_FEED_CAP: f64 = 100.0;
/// Largest hunger drop a single meal can cause.
const MAX_FEED_RELIEF: f64 = 10.0;
/// Sleep cycle listings return at most this many entries.
const SLEEP_LISTING_MAX: usize = 50;
/// Longest schedulable sleep, in hours.
const MAX_SCHEDULE_DURATION_HOURS: f64 = 24.0;

type Outbox = Vec<String>;

/// Apply a sensory meal to the vitals.
pub fn apply_feed(state: &mut OrganismState, profile: &FeedProfile, now: DateTime<Utc>) {
    let relief = (profile.data_volume * (1.0 + profile.sensory_intensity)).min(MAX_FEED_RELIEF);
    state.hunger = (state.hunger - relief).max(0.0);
    state.metabolism = (state.metabolism + profile.sensory_intensity * 5.0 + profile.ambient_motion * 3.0)
        .min(METABOLISM_FEED_CAP);
    state.last_feed = Some(now);
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    pub entries: Vec<TelemetryEntry>,
    pub organism_state: OrganismState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SleepReport {
    pub organism_state: OrganismState,
    pub cycle: SleepCycleRecord,
    pub nodes: Vec<MemoryNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub assessment: PersonalityAssessment,
    pub dna_token: DnaToken,
}

pub struct OrganismCoordinator {
    config: MarovaConfig,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    aggregator: StateAggregator,
    scheduler: SleepScheduler,
    dreams: DreamGenerator,
    ledger: MemoryLedger,
    dispatcher: Option<NotificationDispatcher>,
    /// Serializes read-modify-write cycles on the snapshot
    state_mutation_lock: tokio::sync::Mutex<()>,
}

impl OrganismCoordinator {
    pub fn new(config: MarovaConfig, store: Arc<dyn SnapshotStore>) -> Self {
        let aggregator = StateAggregator::new(&config);
        let scheduler = SleepScheduler::new(
            config.auto_sleep.clone(),
            config.organism.local_zone(),
            aggregator.clone(),
        );
        Self {
            dreams: DreamGenerator::new(config.dream.clone()),
            ledger: MemoryLedger::new(config.memory.clone()),
            config,
            store,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            aggregator,
            scheduler,
            dispatcher: None,
            state_mutation_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Coordinator backed by the SQLite document at `config.organism.db_path`.
    pub async fn with_sqlite(config: MarovaConfig) -> anyhow::Result<Self> {
        let store = SqliteStore::new(&config.organism.db_path).await?;
        Ok(Self::new(config, Arc::new(store)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Deliver notifications through `notifier` on a background task.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.dispatcher = Some(NotificationDispatcher::spawn(notifier));
        self
    }

    pub fn config(&self) -> &MarovaConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // Transaction plumbing
    // ========================================================================

    async fn load(&self) -> EngineResult<Snapshot> {
        let snapshot = self.store.read().await?;
        Ok(snapshot.unwrap_or_else(|| {
            tracing::info!("No snapshot stored yet, seeding a fresh organism");
            Snapshot::initial(&self.config)
        }))
    }

    async fn transact<T, F>(&self, op: F) -> EngineResult<T>
    where
        F: FnOnce(&mut Snapshot, DateTime<Utc>, &mut Outbox) -> EngineResult<T>,
    {
        let (value, outbox) = {
            let _guard = self.state_mutation_lock.lock().await;
            let mut snapshot = self.load().await?;
            let now = self.clock.now();
            let mut outbox = Outbox::new();

            let value = op(&mut snapshot, now, &mut outbox)?;
            self.store.write(&snapshot).await?;
            (value, outbox)
        };
        self.dispatch(outbox);
        Ok(value)
    }

    fn dispatch(&self, outbox: Outbox) {
        for subject in outbox {
            match &self.dispatcher {
                Some(dispatcher) => dispatcher.enqueue(subject),
                None => tracing::debug!(subject = %subject, "No notifier configured"),
            }
        }
    }

    /// Evaluate the circadian window, queueing any notification it raises.
    fn tick_schedule(&self, snapshot: &mut Snapshot, now: DateTime<Utc>, outbox: &mut Outbox) -> EngineResult<()> {
        let event = self.scheduler.evaluate(snapshot, now, SchedulerPass::Normal)?;
        outbox.extend(event.notification());
        Ok(())
    }

    fn require_user(snapshot: &Snapshot, user_id: Uuid) -> EngineResult<()> {
        if snapshot.has_user(user_id) {
            Ok(())
        } else {
            Err(EngineError::not_found(format!("user {user_id}")))
        }
    }

    // ========================================================================
    // Organism
    // ========================================================================

    pub async fn get_state(&self) -> EngineResult<OrganismState> {
        self.transact(|snapshot, now, outbox| {
            self.tick_schedule(snapshot, now, outbox)?;
            Ok(self.aggregator.persist(snapshot, now))
        })
        .await
    }

    pub async fn scheduler_status(&self) -> EngineResult<SchedulerStatus> {
        let snapshot = self.load().await?;
        Ok(self.scheduler.status(&snapshot.organism, self.clock.now()))
    }

    pub async fn feed(&self, profile: FeedProfile) -> EngineResult<OrganismState> {
        profile.validate()?;
        self.transact(|snapshot, now, outbox| {
            self.tick_schedule(snapshot, now, outbox)?;
            apply_feed(&mut snapshot.organism, &profile, now);
            tracing::info!(
                hunger = snapshot.organism.hunger,
                metabolism = snapshot.organism.metabolism,
                "Organism fed"
            );
            Ok(self.aggregator.persist(snapshot, now))
        })
        .await
    }

    /// The latest `limit` telemetry entries, clamped to `[1, capacity]`.
    pub async fn get_telemetry(&self, limit: usize) -> EngineResult<TelemetryReport> {
        self.transact(|snapshot, now, outbox| {
            self.tick_schedule(snapshot, now, outbox)?;
            let organism_state = self.aggregator.persist(snapshot, now);
            let entries = self.aggregator.telemetry().recent(&snapshot.telemetry, limit).to_vec();
            Ok(TelemetryReport { entries, organism_state })
        })
        .await
    }

    /// Turning auto sleep off drops any recorded session without recovery.
    pub async fn set_auto_sleep(&self, enabled: bool) -> EngineResult<OrganismState> {
        self.transact(|snapshot, now, outbox| {
            let state = &mut snapshot.organism;
            state.auto_sleep_enabled = enabled;
            if !enabled {
                state.clear_session();
                if state.sleep_phase == SleepPhase::Sleeping {
                    state.sleep_phase = SleepPhase::Awake;
                }
            }
            tracing::info!(enabled, "Auto sleep toggled");
            self.tick_schedule(snapshot, now, outbox)?;
            Ok(self.aggregator.persist(snapshot, now))
        })
        .await
    }

    pub async fn set_sleep_schedule(&self, hour: u32, duration_hours: f64) -> EngineResult<OrganismState> {
        if hour > 23 {
            return Err(EngineError::validation(format!("sleep hour {hour} is outside 0-23")));
        }
        if !duration_hours.is_finite() || duration_hours <= 0.0 || duration_hours > MAX_SCHEDULE_DURATION_HOURS {
            return Err(EngineError::validation(format!(
                "sleep duration {duration_hours} must be within (0, {MAX_SCHEDULE_DURATION_HOURS}]"
            )));
        }
        self.transact(|snapshot, now, outbox| {
            let state = &mut snapshot.organism;
            state.sleep_schedule_hour = hour;
            state.sleep_duration_hours = duration_hours;
            state.normalize_schedule();
            tracing::info!(
                sleep_hour = state.sleep_schedule_hour,
                wake_hour = state.wake_schedule_hour,
                duration_hours = state.sleep_duration_hours,
                "Sleep schedule updated"
            );
            self.tick_schedule(snapshot, now, outbox)?;
            Ok(self.aggregator.persist(snapshot, now))
        })
        .await
    }

    pub async fn run_sleep_cycle(&self, request: SleepCycleRequest) -> EngineResult<SleepReport> {
        request.validate()?;
        self.transact(|snapshot, now, outbox| {
            let outcome = self.scheduler.sleep_cycle(snapshot, &request, now, SchedulerPass::Normal)?;
            outbox.extend(outcome.schedule.notification());
            Ok(SleepReport {
                organism_state: snapshot.organism.clone(),
                cycle: outcome.record,
                nodes: snapshot.memory_nodes.clone(),
            })
        })
        .await
    }

    pub async fn generate_dream(&self, request: DreamRequest) -> EngineResult<DreamRecord> {
        request.validate()?;
        self.transact(|snapshot, now, outbox| {
            self.tick_schedule(snapshot, now, outbox)?;
            let record = self.dreams.generate(snapshot, &request, self.random.as_ref(), now)?;
            if record.category == DreamCategory::Nightmare && snapshot.organism.sleep_phase == SleepPhase::Waking {
                outbox.push("Marova woke from a nightmare".to_string());
            }
            self.aggregator.persist(snapshot, now);
            Ok(record)
        })
        .await
    }

    // ========================================================================
    // Users and biology
    // ========================================================================

    pub async fn register_user(&self, name: &str) -> EngineResult<User> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::validation("user name must not be empty"));
        }
        self.transact(|snapshot, now, _| {
            let user = User { id: Uuid::new_v4(), name, created_at: now };
            snapshot.users.push(user.clone());
            tracing::info!(user = %user.id, "User registered");
            Ok(user)
        })
        .await
    }

    /// Create or replace the user's biological profile.
    pub async fn record_dna_profile(&self, user_id: Uuid, input: DnaProfileInput) -> EngineResult<DnaProfile> {
        input.validate()?;
        self.transact(|snapshot, now, outbox| {
            Self::require_user(snapshot, user_id)?;
            let health = evaluate_health_survey(&input.survey);
            let medical_history = input
                .medical_history
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty());

            let profile = match snapshot.dna_profiles.iter_mut().find(|p| p.user_id == user_id) {
                Some(existing) => {
                    existing.respiration_rate = input.respiration_rate;
                    existing.energy_consumption = input.energy_consumption;
                    existing.medical_history = medical_history;
                    existing.health_score = health.score;
                    existing.health_bucket = health.bucket;
                    existing.health_summary = health.summary;
                    existing.health_risks = health.risks;
                    existing.updated_at = now;
                    existing.clone()
                }
                None => {
                    let profile = DnaProfile {
                        id: Uuid::new_v4(),
                        user_id,
                        respiration_rate: input.respiration_rate,
                        energy_consumption: input.energy_consumption,
                        medical_history,
                        health_score: health.score,
                        health_bucket: health.bucket,
                        health_summary: health.summary,
                        health_risks: health.risks,
                        created_at: now,
                        updated_at: now,
                    };
                    snapshot.dna_profiles.push(profile.clone());
                    profile
                }
            };
            tracing::info!(
                user = %user_id,
                score = profile.health_score,
                bucket = profile.health_bucket.as_str(),
                "DNA profile recorded"
            );

            self.tick_schedule(snapshot, now, outbox)?;
            self.aggregator.persist(snapshot, now);
            Ok(profile)
        })
        .await
    }

    /// Store an assessment, mint its DNA token and nudge the organism.
    pub async fn record_assessment(&self, user_id: Uuid, input: AssessmentInput) -> EngineResult<AssessmentReport> {
        input.validate()?;
        self.transact(|snapshot, now, outbox| {
            Self::require_user(snapshot, user_id)?;
            let narrative = input
                .narrative
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            let traits = derive_traits(&input.emotional_profile, narrative.is_some());

            let assessment = PersonalityAssessment {
                id: Uuid::new_v4(),
                user_id,
                emotional_profile: input.emotional_profile,
                narrative,
                sensitivity_threshold: Some(traits.sensitivity_threshold),
                toxicity_resistance: Some(traits.toxicity_resistance),
                dream_tolerance: Some(traits.dream_tolerance),
                recorded_at: now,
            };
            let checksum_source = format!(
                "{}{:?}{:?}{}",
                user_id,
                assessment.emotional_profile,
                assessment.narrative,
                now.to_rfc3339()
            );
            let dna_token = DnaToken {
                id: Uuid::new_v4(),
                user_id,
                created_at: now,
                payload_checksum: Uuid::new_v5(&Uuid::NAMESPACE_OID, checksum_source.as_bytes()).to_string(),
                remaining_energy: dna_token_energy(&traits),
            };
            snapshot.assessments.push(assessment.clone());
            snapshot.dna_tokens.push(dna_token.clone());

            self.tick_schedule(snapshot, now, outbox)?;

            tracing::info!(
                user = %user_id,
                energy = dna_token.remaining_energy,
                "Personality assessment recorded"
            );
            self.aggregator.persist(snapshot, now);
            Ok(AssessmentReport { assessment, dna_token })
        })
        .await
    }

    // ========================================================================
    // Memory ledger
    // ========================================================================

    pub async fn record_memory_log(&self, user_id: Uuid, input: MemoryLogInput) -> EngineResult<Ingested> {
        input.validate()?;
        self.transact(|snapshot, now, outbox| {
            self.tick_schedule(snapshot, now, outbox)?;
            let ingested = self.ledger.ingest(snapshot, user_id, &input, now)?;
            self.ledger.apply_intake(
                &mut snapshot.organism,
                ingested.log.valence,
                ingested.log.strength,
                ingested.log.toxicity,
            );
            self.aggregator.persist(snapshot, now);
            Ok(ingested)
        })
        .await
    }

    pub async fn spend_memory_points(&self, user_id: Uuid, points: f64) -> EngineResult<f64> {
        self.transact(|snapshot, now, _| {
            Self::require_user(snapshot, user_id)?;
            let spent = ledger::spend_points(&mut snapshot.memory_tokens, user_id, points, now)?;
            tracing::info!(user = %user_id, requested = points, spent, "Memory points spent");
            Ok(spent)
        })
        .await
    }

    pub async fn update_memory_token_status(&self, token_id: Uuid, spent: bool) -> EngineResult<MemoryToken> {
        self.transact(|snapshot, now, _| ledger::set_token_status(&mut snapshot.memory_tokens, token_id, spent, now))
            .await
    }

    pub async fn ledger_summary(&self, user_id: Option<Uuid>) -> EngineResult<LedgerSummary> {
        let snapshot = self.load().await?;
        Ok(ledger::summarize(&snapshot.memory_logs, &snapshot.memory_tokens, user_id))
    }

    pub async fn list_memory_logs(&self, user_id: Option<Uuid>) -> EngineResult<Vec<MemoryLogEntry>> {
        let snapshot = self.load().await?;
        Ok(snapshot
            .memory_logs
            .into_iter()
            .filter(|l| user_id.map_or(true, |id| l.user_id == id))
            .collect())
    }

    pub async fn list_memory_tokens(&self, user_id: Option<Uuid>) -> EngineResult<Vec<MemoryToken>> {
        let snapshot = self.load().await?;
        Ok(snapshot
            .memory_tokens
            .into_iter()
            .filter(|t| user_id.map_or(true, |id| t.user_id == id))
            .collect())
    }

    // ========================================================================
    // History
    // ========================================================================

    pub async fn list_dreams(&self) -> EngineResult<Vec<DreamRecord>> {
        Ok(self.load().await?.dreams)
    }

    /// The most recent `limit` cycles (at most 50), oldest first.
    pub async fn list_sleep_cycles(&self, limit: usize) -> EngineResult<Vec<SleepCycleRecord>> {
        let mut cycles = self.load().await?.sleep_cycles;
        let limit = limit.clamp(1, SLEEP_LISTING_MAX);
        let excess = cycles.len().saturating_sub(limit);
        cycles.drain(..excess);
        Ok(cycles)
    }

    pub async fn list_users(&self) -> EngineResult<Vec<User>> {
        Ok(self.load().await?.users)
    }

    pub async fn list_dna_tokens(&self, user_id: Option<Uuid>) -> EngineResult<Vec<DnaToken>> {
        let snapshot = self.load().await?;
        Ok(snapshot
            .dna_tokens
            .into_iter()
            .filter(|t| user_id.map_or(true, |id| t.user_id == id))
            .collect())
    }
}
