//! State Aggregator - re-derives the organism's vitals from its inputs
//!
//! Nothing is overwritten outright. Each vital moves part of the way toward a
//! target computed from the raw input streams:
//!
//! ```text
//! new = current * (1 - factor) + target * factor
//! ```
//!
//! Repeated reads therefore converge smoothly instead of jumping, and a
//! single outlier input only nudges the organism.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use marova_core::state::{
    DREAM_DEBT_MAX, DREAM_ENERGY_MAX, HUNGER_MAX, METABOLISM_MAX, TOXICITY_MAX,
};
use marova_core::{
    clamp, round3, BlendFactors, DnaProfile, DnaToken, MarovaConfig, MemoryLogEntry,
    MoodThresholds, OrganismState, PersonalityAssessment, SleepCycleRecord, SleepPhase,
    Snapshot,
};

use crate::mood::resolve_mood;
use crate::telemetry::TelemetryRecorder;

/// Most recent memory logs considered.
pub const MEMORY_WINDOW: usize = 30;
/// Most recent sleep cycles considered.
pub const SLEEP_WINDOW: usize = 10;
/// Hours over which a memory's weight decays to its floor.
pub const RECENCY_HORIZON_HOURS: f64 = 72.0;
pub const RECENCY_FLOOR: f64 = 0.2;

/// Move `current` toward `target`. Factors outside (0, 1) keep or snap.
pub fn blend(current: f64, target: f64, factor: f64) -> f64 {
    if factor <= 0.0 {
        current
    } else if factor >= 1.0 {
        target
    } else {
        current * (1.0 - factor) + target * factor
    }
}

/// Linear decay from 1.0 to the floor over the recency horizon.
pub fn recency_weight(age_hours: f64) -> f64 {
    clamp(1.0 - age_hours / RECENCY_HORIZON_HOURS, RECENCY_FLOOR, 1.0)
}

fn average(values: impl IntoIterator<Item = f64>, fallback: f64) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        fallback
    } else {
        sum / n as f64
    }
}

fn hours_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    OrganismState::hours_between(then, now)
}

// ============================================================================
// Input metrics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DnaMetrics {
    pub avg_respiration: f64,
    pub avg_energy_consumption: f64,
    pub avg_health_score: f64,
    pub profile_count: usize,
    /// Share of profiles that disclose a medical history
    pub condition_ratio: f64,
}

impl Default for DnaMetrics {
    fn default() -> Self {
        Self {
            avg_respiration: 12.0,
            avg_energy_consumption: 1.0,
            avg_health_score: 60.0,
            profile_count: 0,
            condition_ratio: 0.0,
        }
    }
}

impl DnaMetrics {
    /// Averages over the most recently updated profile of each user.
    pub fn from_profiles(profiles: &[DnaProfile]) -> Self {
        let mut latest: HashMap<Uuid, &DnaProfile> = HashMap::new();
        for profile in profiles {
            match latest.get(&profile.user_id) {
                Some(existing) if existing.updated_at > profile.updated_at => {}
                _ => {
                    latest.insert(profile.user_id, profile);
                }
            }
        }
        if latest.is_empty() {
            return Self::default();
        }

        let count = latest.len();
        let conditions = latest.values().filter(|p| p.has_condition()).count();
        Self {
            avg_respiration: average(latest.values().map(|p| p.respiration_rate), 12.0),
            avg_energy_consumption: average(latest.values().map(|p| p.energy_consumption), 1.0),
            avg_health_score: average(latest.values().map(|p| p.health_score as f64), 60.0),
            profile_count: count,
            condition_ratio: conditions as f64 / count as f64,
        }
    }

    pub fn health_penalty(&self) -> f64 {
        (1.0 - self.avg_health_score / 100.0).max(0.0)
    }

    pub fn respiration_ratio(&self) -> f64 {
        self.avg_respiration / 12.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonalityMetrics {
    /// Mean signed emotion score
    pub emotion_score: f64,
    /// Mean absolute emotion score
    pub emotion_intensity: f64,
    pub avg_sensitivity: f64,
    pub avg_toxicity_resistance: f64,
    pub avg_dream_tolerance: f64,
}

impl PersonalityMetrics {
    /// Averages over the last assessment of each user. Traits no assessment
    /// carries fall back to the organism's current value.
    pub fn from_assessments(assessments: &[PersonalityAssessment], baseline: &OrganismState) -> Self {
        let mut latest: HashMap<Uuid, &PersonalityAssessment> = HashMap::new();
        for assessment in assessments {
            latest.insert(assessment.user_id, assessment);
        }

        let mut scores = Vec::new();
        let mut intensities = Vec::new();
        for record in latest.values() {
            if !record.emotional_profile.is_empty() {
                let values: Vec<f64> = record.emotional_profile.values().copied().collect();
                scores.push(average(values.iter().copied(), 0.0));
                intensities.push(average(values.iter().map(|v| v.abs()), 0.0));
            }
        }

        Self {
            emotion_score: average(scores, 0.0),
            emotion_intensity: average(intensities, 0.0),
            avg_sensitivity: average(
                latest.values().filter_map(|a| a.sensitivity_threshold),
                baseline.sensitivity_threshold,
            ),
            avg_toxicity_resistance: average(
                latest.values().filter_map(|a| a.toxicity_resistance),
                baseline.toxicity_resistance,
            ),
            avg_dream_tolerance: average(
                latest.values().filter_map(|a| a.dream_tolerance),
                baseline.dream_tolerance,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryMetrics {
    pub avg_valence: f64,
    pub avg_strength: f64,
    pub avg_toxicity: f64,
    /// Toxicity weighted toward the last few days
    pub recent_toxicity: f64,
}

impl MemoryMetrics {
    pub fn from_logs(logs: &[MemoryLogEntry], now: DateTime<Utc>) -> Self {
        if logs.is_empty() {
            return Self::default();
        }
        let mut recent: Vec<&MemoryLogEntry> = logs.iter().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(MEMORY_WINDOW);

        let avg_toxicity = average(recent.iter().map(|e| e.toxicity), 0.0);
        let (weighted, total_weight) = recent.iter().fold((0.0, 0.0), |(acc, w), e| {
            let weight = recency_weight(hours_since(e.timestamp, now));
            (acc + e.toxicity * weight, w + weight)
        });

        Self {
            avg_valence: average(recent.iter().map(|e| e.valence), 0.0),
            avg_strength: average(recent.iter().map(|e| e.strength), 0.0),
            avg_toxicity,
            recent_toxicity: if total_weight > 0.0 {
                weighted / total_weight
            } else {
                avg_toxicity
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepMetrics {
    pub avg_quality: f64,
    pub avg_duration: f64,
    pub hours_since_last_cycle: Option<f64>,
    /// From `last_sleep`, falling back to the last cycle
    pub hours_since_last_sleep: Option<f64>,
}

impl SleepMetrics {
    pub fn from_cycles(
        cycles: &[SleepCycleRecord],
        last_sleep: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut ordered: Vec<&SleepCycleRecord> = cycles.iter().collect();
        ordered.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let hours_since_last_cycle = ordered.first().map(|c| hours_since(c.occurred_at, now));
        let window = &ordered[..ordered.len().min(SLEEP_WINDOW)];

        Self {
            avg_quality: average(window.iter().map(|c| c.quality), 0.6),
            avg_duration: average(window.iter().map(|c| c.duration_hours), 6.0),
            hours_since_last_cycle,
            hours_since_last_sleep: last_sleep
                .map(|t| hours_since(t, now))
                .or(hours_since_last_cycle),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DnaEnergy {
    pub total_energy: f64,
    /// Average over tokens that still hold energy
    pub avg_energy: f64,
    pub active_tokens: usize,
}

impl DnaEnergy {
    pub fn from_tokens(tokens: &[DnaToken]) -> Self {
        let reserves: Vec<f64> = tokens.iter().map(|t| t.remaining_energy.max(0.0)).collect();
        let total_energy: f64 = reserves.iter().sum();
        let active_tokens = reserves.iter().filter(|r| **r > 0.0).count();
        Self {
            total_energy,
            avg_energy: if active_tokens > 0 {
                total_energy / active_tokens as f64
            } else {
                0.0
            },
            active_tokens,
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Where each vital is heading, before blending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub hunger: f64,
    pub metabolism: f64,
    pub toxicity: f64,
    pub dream_energy: f64,
    pub dream_debt: f64,
}

pub struct TargetInputs<'a> {
    pub state: &'a OrganismState,
    /// Already blended toward the assessment averages
    pub toxicity_resistance: f64,
    pub dream_tolerance: f64,
    pub dna: &'a DnaMetrics,
    pub personality: &'a PersonalityMetrics,
    pub memory: &'a MemoryMetrics,
    pub sleep: &'a SleepMetrics,
    pub dna_energy: &'a DnaEnergy,
    pub hours_since_feed: f64,
}

impl Targets {
    pub fn compute(inputs: &TargetInputs<'_>) -> Self {
        let TargetInputs { state, dna, personality, memory, sleep, dna_energy, .. } = inputs;
        let health_penalty = dna.health_penalty();
        let energy_demand = dna.avg_energy_consumption;

        let hunger = inputs.hours_since_feed
            * (1.1 + energy_demand * 0.9 + dna.respiration_ratio() * 0.4)
            + health_penalty * 45.0
            + memory.avg_strength * 8.0
            - sleep.avg_quality * 12.0;

        let metabolism = dna.avg_respiration * 5.5
            + energy_demand * 18.0
            + (1.0 - health_penalty) * 14.0
            + memory.avg_strength * 20.0;

        let toxicity = memory.avg_toxicity * 80.0 * (1.1 - inputs.toxicity_resistance)
            + health_penalty * 18.0
            + dna.condition_ratio * 12.0;

        let dream_energy = 2.5
            + inputs.dream_tolerance * 4.0
            + dna_energy.total_energy * 0.05
            + personality.emotion_score.max(0.0) * 1.5
            + sleep.avg_quality * 3.0
            - memory.avg_toxicity * 2.0
            - state.dream_debt * 0.6;

        let dream_debt = (1.0 - sleep.avg_quality).max(0.0) * 4.0
            + (-personality.emotion_score).max(0.0) * 2.0
            + memory.recent_toxicity * 2.5
            - dna_energy.avg_energy * 0.2;

        Self {
            hunger: clamp(hunger, 0.0, HUNGER_MAX),
            metabolism: clamp(metabolism, 10.0, METABOLISM_MAX),
            toxicity: clamp(toxicity, 0.0, TOXICITY_MAX),
            dream_energy: clamp(dream_energy, 0.0, DREAM_ENERGY_MAX),
            dream_debt: clamp(dream_debt, 0.0, DREAM_DEBT_MAX),
        }
    }
}

/// Sleep phase implied by the session and the sleep history.
pub fn infer_sleep_phase(
    state: &OrganismState,
    sleep: &SleepMetrics,
    now: DateTime<Utc>,
) -> SleepPhase {
    if state.session_active_at(now) {
        return SleepPhase::Sleeping;
    }
    let recently_asleep = sleep
        .hours_since_last_sleep
        .map(|h| h < 0.3)
        .unwrap_or(true);
    if state.sleep_phase == SleepPhase::Sleeping && recently_asleep {
        return SleepPhase::Sleeping;
    }
    match sleep.hours_since_last_cycle {
        Some(h) if h < 1.5 => SleepPhase::Waking,
        Some(h) if h > 18.0 => SleepPhase::Deprived,
        Some(_) if sleep.avg_quality < 0.45 => SleepPhase::Restless,
        Some(_) => SleepPhase::Awake,
        None if sleep.avg_quality < 0.45 => SleepPhase::Restless,
        None => state.sleep_phase,
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Result of one aggregation pass.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub state: OrganismState,
    pub targets: Targets,
    pub sleep: SleepMetrics,
}

#[derive(Debug, Clone)]
pub struct StateAggregator {
    factors: BlendFactors,
    thresholds: MoodThresholds,
    telemetry: TelemetryRecorder,
}

impl StateAggregator {
    pub fn new(config: &MarovaConfig) -> Self {
        Self {
            factors: config.blend.clone(),
            thresholds: config.mood.clone(),
            telemetry: TelemetryRecorder::new(&config.telemetry),
        }
    }

    pub fn thresholds(&self) -> &MoodThresholds {
        &self.thresholds
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    /// Sleep metrics for `state` against the snapshot's cycle history.
    pub fn sleep_metrics(&self, snapshot: &Snapshot, state: &OrganismState, now: DateTime<Utc>) -> SleepMetrics {
        SleepMetrics::from_cycles(&snapshot.sleep_cycles, state.last_sleep, now)
    }

    /// One blend pass of `base` toward the targets implied by `snapshot`.
    /// Pure: neither argument is modified.
    pub fn rebuild(&self, snapshot: &Snapshot, base: &OrganismState, now: DateTime<Utc>) -> Aggregation {
        let mut base = base.clone();
        base.normalize();

        let dna = DnaMetrics::from_profiles(&snapshot.dna_profiles);
        let personality = PersonalityMetrics::from_assessments(&snapshot.assessments, &base);
        let memory = MemoryMetrics::from_logs(&snapshot.memory_logs, now);
        let sleep = SleepMetrics::from_cycles(&snapshot.sleep_cycles, base.last_sleep, now);
        let dna_energy = DnaEnergy::from_tokens(&snapshot.dna_tokens);
        let hours_since_feed = base.last_feed.map(|t| hours_since(t, now)).unwrap_or(24.0);

        let f = &self.factors;
        let sensitivity = clamp(blend(base.sensitivity_threshold, personality.avg_sensitivity, f.sensitivity), 0.0, 1.0);
        let toxicity_resistance = clamp(
            blend(base.toxicity_resistance, personality.avg_toxicity_resistance, f.toxicity_resistance),
            0.0,
            1.0,
        );
        let dream_tolerance = clamp(blend(base.dream_tolerance, personality.avg_dream_tolerance, f.dream_tolerance), 0.0, 1.0);

        let targets = Targets::compute(&TargetInputs {
            state: &base,
            toxicity_resistance,
            dream_tolerance,
            dna: &dna,
            personality: &personality,
            memory: &memory,
            sleep: &sleep,
            dna_energy: &dna_energy,
            hours_since_feed,
        });

        let mut out = base.clone();
        out.hunger = round3(clamp(blend(base.hunger, targets.hunger, f.hunger), 0.0, HUNGER_MAX));
        out.metabolism = round3(clamp(blend(base.metabolism, targets.metabolism, f.metabolism), 0.0, METABOLISM_MAX));
        out.dream_energy = round3(clamp(
            blend(base.dream_energy, targets.dream_energy, f.dream_energy),
            0.0,
            DREAM_ENERGY_MAX,
        ));
        out.dream_debt = round3(clamp(blend(base.dream_debt, targets.dream_debt, f.dream_debt), 0.0, DREAM_DEBT_MAX));
        out.toxicity_level = round3(clamp(
            blend(base.toxicity_level, targets.toxicity, f.toxicity),
            0.0,
            TOXICITY_MAX,
        ));
        out.sleep_phase = infer_sleep_phase(&base, &sleep, now);
        out.sensitivity_threshold = round3(sensitivity);
        out.toxicity_resistance = round3(toxicity_resistance);
        out.dream_tolerance = round3(dream_tolerance);
        out.mood = resolve_mood(&out, sleep.hours_since_last_sleep, &self.thresholds);

        tracing::debug!(
            hunger = out.hunger,
            metabolism = out.metabolism,
            toxicity = out.toxicity_level,
            dream_energy = out.dream_energy,
            dream_debt = out.dream_debt,
            phase = %out.sleep_phase,
            mood = %out.mood,
            "Aggregated organism state"
        );

        Aggregation { state: out, targets, sleep }
    }

    /// The persist path: rebuild the snapshot's organism in place and record
    /// a telemetry sample.
    pub fn persist(&self, snapshot: &mut Snapshot, now: DateTime<Utc>) -> OrganismState {
        let aggregation = self.rebuild(snapshot, &snapshot.organism, now);
        snapshot.organism = aggregation.state.clone();
        self.telemetry.record(
            &mut snapshot.telemetry,
            &aggregation.state,
            aggregation.sleep.avg_duration,
            now,
        );
        aggregation.state
    }
}
