//! Records the organism is built from and leaves behind
//!
//! Inputs (`*Input`, `*Request`, `FeedProfile`) carry their own `validate()`;
//! stored records are trusted once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::state::SleepPhase;

/// Longest memory text accepted, in characters.
pub const MEMORY_TEXT_MAX_CHARS: usize = 2000;

fn check_range(name: &str, value: f64, min: f64, max: f64) -> EngineResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::validation(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::validation(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

// ============================================================================
// Users and biology
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBucket {
    Good,
    Normal,
    Unhealthy,
    ExtremelyUnhealthy,
}

impl HealthBucket {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => HealthBucket::ExtremelyUnhealthy,
            20..=59 => HealthBucket::Unhealthy,
            60..=79 => HealthBucket::Normal,
            _ => HealthBucket::Good,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthBucket::Good => "good",
            HealthBucket::Normal => "normal",
            HealthBucket::Unhealthy => "unhealthy",
            HealthBucket::ExtremelyUnhealthy => "extremely_unhealthy",
        }
    }
}

/// Lifestyle questionnaire a health score is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSurvey {
    pub sleep_hours: f64,
    pub exercise_minutes_per_week: u32,
    /// 1 (poor) to 5 (excellent)
    pub diet_quality: u8,
    /// 1 (calm) to 5 (overwhelmed)
    pub stress_level: u8,
    #[serde(default)]
    pub chronic_condition: bool,
    #[serde(default)]
    pub alcohol_units_per_week: u32,
    #[serde(default)]
    pub smoker: bool,
    #[serde(default)]
    pub meditation_minutes_per_week: u32,
    #[serde(default = "default_hydration")]
    pub hydration_liters_per_day: f64,
}

fn default_hydration() -> f64 {
    2.0
}

impl HealthSurvey {
    pub fn validate(&self) -> EngineResult<()> {
        check_range("sleep_hours", self.sleep_hours, 0.0, 12.0)?;
        check_range("exercise_minutes_per_week", self.exercise_minutes_per_week as f64, 0.0, 840.0)?;
        check_range("diet_quality", self.diet_quality as f64, 1.0, 5.0)?;
        check_range("stress_level", self.stress_level as f64, 1.0, 5.0)?;
        check_range("alcohol_units_per_week", self.alcohol_units_per_week as f64, 0.0, 40.0)?;
        check_range("meditation_minutes_per_week", self.meditation_minutes_per_week as f64, 0.0, 840.0)?;
        check_range("hydration_liters_per_day", self.hydration_liters_per_day, 0.0, 6.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaProfileInput {
    pub respiration_rate: f64,
    pub energy_consumption: f64,
    #[serde(default)]
    pub medical_history: Option<String>,
    pub survey: HealthSurvey,
}

impl DnaProfileInput {
    pub fn validate(&self) -> EngineResult<()> {
        check_positive("respiration_rate", self.respiration_rate)?;
        check_positive("energy_consumption", self.energy_consumption)?;
        self.survey.validate()
    }
}

/// Latest biological profile for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub respiration_rate: f64,
    pub energy_consumption: f64,
    #[serde(default)]
    pub medical_history: Option<String>,
    pub health_score: u8,
    pub health_bucket: HealthBucket,
    #[serde(default)]
    pub health_summary: String,
    #[serde(default)]
    pub health_risks: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DnaProfile {
    pub fn has_condition(&self) -> bool {
        self.medical_history
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInput {
    /// Emotion name → signed score in [-1, 1]
    pub emotional_profile: BTreeMap<String, f64>,
    #[serde(default)]
    pub narrative: Option<String>,
}

impl AssessmentInput {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, score) in &self.emotional_profile {
            check_range(&format!("emotional_profile.{name}"), *score, -1.0, 1.0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityAssessment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub emotional_profile: BTreeMap<String, f64>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub sensitivity_threshold: Option<f64>,
    #[serde(default)]
    pub toxicity_resistance: Option<f64>,
    #[serde(default)]
    pub dream_tolerance: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Secondary energy reserve minted per assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload_checksum: String,
    pub remaining_energy: f64,
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLogInput {
    /// Defaults to "now" when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub valence: f64,
    pub strength: f64,
    pub toxicity: f64,
    pub embedding: Vec<f64>,
    pub text: String,
}

impl MemoryLogInput {
    pub fn validate(&self) -> EngineResult<()> {
        if self.text.trim().is_empty() {
            return Err(EngineError::validation("memory text cannot be empty"));
        }
        if self.text.trim().chars().count() > MEMORY_TEXT_MAX_CHARS {
            return Err(EngineError::validation(format!(
                "memory text exceeds {MEMORY_TEXT_MAX_CHARS} characters"
            )));
        }
        check_range("valence", self.valence, -1.0, 1.0)?;
        check_range("strength", self.strength, 0.0, 1.0)?;
        check_range("toxicity", self.toxicity, 0.0, 1.0)?;
        if self.embedding.len() < 2 {
            return Err(EngineError::validation("embedding needs at least 2 values"));
        }
        if self.embedding.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::validation("embedding values must be finite"));
        }
        Ok(())
    }
}

/// Immutable, append-only memory submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub valence: f64,
    pub strength: f64,
    pub toxicity: f64,
    pub embedding: Vec<f64>,
    pub text: String,
    pub tokens_awarded: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryNeighbor {
    pub node_id: Uuid,
    pub weight: f64,
}

/// Graph vertex derived 1:1 from a log entry. Only `toxicity` ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: Uuid,
    pub log_id: Uuid,
    pub valence: f64,
    pub strength: f64,
    pub toxicity: f64,
    pub energy_reserve: f64,
    #[serde(default)]
    pub neighbors: Vec<MemoryNeighbor>,
}

/// Spendable point grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub log_id: Uuid,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub spent: bool,
    #[serde(default)]
    pub spent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_points: f64,
    pub available_points: f64,
    pub spent_points: f64,
    pub logs_recorded: usize,
    pub tokens_issued: usize,
}

// ============================================================================
// Feeding and sleep
// ============================================================================

/// Sensory meal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedProfile {
    pub sensory_intensity: f64,
    pub emotional_tone: f64,
    pub ambient_motion: f64,
    pub data_volume: f64,
}

impl FeedProfile {
    pub fn validate(&self) -> EngineResult<()> {
        check_range("sensory_intensity", self.sensory_intensity, 0.0, 1.0)?;
        check_range("emotional_tone", self.emotional_tone, -1.0, 1.0)?;
        check_range("ambient_motion", self.ambient_motion, 0.0, 1.0)?;
        check_positive("data_volume", self.data_volume)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepCycleRequest {
    pub duration_hours: f64,
    pub quality: f64,
    #[serde(default)]
    pub abrupt_wake: bool,
}

impl Default for SleepCycleRequest {
    fn default() -> Self {
        Self {
            duration_hours: 6.0,
            quality: 0.6,
            abrupt_wake: false,
        }
    }
}

impl SleepCycleRequest {
    pub fn validate(&self) -> EngineResult<()> {
        check_positive("duration_hours", self.duration_hours)?;
        check_range("quality", self.quality, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepCycleRecord {
    pub id: Uuid,
    pub duration_hours: f64,
    pub quality: f64,
    pub abrupt_wake: bool,
    pub occurred_at: DateTime<Utc>,
}

// ============================================================================
// Dreams
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamCategory {
    Happy,
    Neutral,
    Nightmare,
    /// Recorded for failed attempts.
    Dormant,
}

impl DreamCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamCategory::Happy => "happy",
            DreamCategory::Neutral => "neutral",
            DreamCategory::Nightmare => "nightmare",
            DreamCategory::Dormant => "dormant",
        }
    }
}

impl fmt::Display for DreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DreamCategory {
    type Err = EngineError;

    /// Only the three dreamable categories parse; `dormant` is an outcome, not a wish.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "happy" => Ok(DreamCategory::Happy),
            "neutral" => Ok(DreamCategory::Neutral),
            "nightmare" => Ok(DreamCategory::Nightmare),
            other => Err(EngineError::validation(format!(
                "unknown dream category '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamOutcome {
    Success,
    Failure,
}

impl DreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamOutcome::Success => "success",
            DreamOutcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamRequest {
    #[serde(default)]
    pub max_energy: Option<f64>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub preferred_category: Option<DreamCategory>,
}

impl DreamRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if let Some(max) = self.max_energy {
            check_positive("max_energy", max)?;
        }
        if self.preferred_category == Some(DreamCategory::Dormant) {
            return Err(EngineError::validation("dormant cannot be requested"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamGlyph {
    pub glyph_id: String,
    pub intensity: f64,
    pub motion: String,
    pub color: String,
    pub seed_nodes: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub seed_node_ids: Vec<Uuid>,
    pub glyphs: Vec<DreamGlyph>,
    pub intensity: f64,
    pub effects: Vec<String>,
    pub energy_used: f64,
    pub state_energy_used: f64,
    pub dna_energy_used: f64,
    pub category: DreamCategory,
    pub outcome: DreamOutcome,
    pub memory_tokens_consumed: usize,
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub timestamp: DateTime<Utc>,
    pub hunger: f64,
    pub metabolism: f64,
    pub dream_energy: f64,
    pub toxicity_level: f64,
    /// Average duration of recent sleep cycles
    pub sleep_hours: f64,
    pub sleep_phase: SleepPhase,
    pub dream_debt: f64,
}
