//! Organism vitals
//!
//! The organism is a singleton whose bounded vitals are re-derived on every
//! read or mutation. All bounded fields are clamped at every observation
//! point; `normalize()` is the single place that enforces this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::AutoSleepRules;

pub const HUNGER_MAX: f64 = 140.0;
pub const METABOLISM_MAX: f64 = 140.0;
pub const TOXICITY_MAX: f64 = 100.0;
pub const DREAM_ENERGY_MAX: f64 = 12.0;
pub const DREAM_DEBT_MAX: f64 = 10.0;
pub const DNA_ENERGY_MAX: f64 = 10.0;
/// Shortest sleep the scheduler will ever account for, in hours.
pub const MIN_SLEEP_DURATION_HOURS: f64 = 0.5;

/// Clamp helper that also tolerates reversed bounds being impossible.
#[inline]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Round to three decimals, the resolution vitals are stored at.
#[inline]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Non-finite vitals fall back to their resting value, e.g. a corrupted
/// hunger reading reloads as 100.
#[inline]
fn sanitize(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected in state, resetting to fallback {}", fallback);
        fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepPhase {
    #[default]
    Awake,
    Sleeping,
    Waking,
    Dreaming,
    Restless,
    Deprived,
}

impl SleepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepPhase::Awake => "awake",
            SleepPhase::Sleeping => "sleeping",
            SleepPhase::Waking => "waking",
            SleepPhase::Dreaming => "dreaming",
            SleepPhase::Restless => "restless",
            SleepPhase::Deprived => "deprived",
        }
    }
}

impl fmt::Display for SleepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived emotional classification of the organism.
///
/// `Calm`, `Agitated` and `Distressed` are accepted when reading older
/// snapshots but the resolver never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Excited,
    Relaxed,
    Sad,
    Angry,
    Depressed,
    Calm,
    Agitated,
    Distressed,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Excited => "excited",
            Mood::Relaxed => "relaxed",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Depressed => "depressed",
            Mood::Calm => "calm",
            Mood::Agitated => "agitated",
            Mood::Distressed => "distressed",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete organism state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganismState {
    /// Hunger (0 - 140): grows with time since the last feed
    pub hunger: f64,
    /// Metabolism (0 - 140)
    pub metabolism: f64,
    /// Toxicity (0 - 100): accumulated from toxic memories
    pub toxicity_level: f64,
    /// Dream energy (0 - 12): spendable reserve for dreaming
    pub dream_energy: f64,
    /// Dream debt (0 - 10): deficit from poor or missing sleep
    pub dream_debt: f64,
    pub sleep_phase: SleepPhase,
    pub mood: Mood,

    /// Personality-derived traits (0.0 - 1.0)
    pub sensitivity_threshold: f64,
    pub toxicity_resistance: f64,
    pub dream_tolerance: f64,

    pub last_feed: Option<DateTime<Utc>>,
    pub last_sleep: Option<DateTime<Utc>>,

    /// Circadian schedule, interpreted in the organism's local zone
    pub auto_sleep_enabled: bool,
    pub sleep_schedule_hour: u32,
    /// Always `(sleep_schedule_hour + sleep_duration_hours) mod 24`
    pub wake_schedule_hour: u32,
    pub sleep_duration_hours: f64,

    /// Active auto-sleep session; both set or both `None`
    pub sleep_session_started_at: Option<DateTime<Utc>>,
    pub sleep_session_ends_at: Option<DateTime<Utc>>,
}

impl Default for OrganismState {
    fn default() -> Self {
        Self {
            hunger: 100.0,
            metabolism: 0.0,
            toxicity_level: 0.0,
            dream_energy: 5.0,
            dream_debt: 0.0,
            sleep_phase: SleepPhase::Awake,
            mood: Mood::Neutral,
            sensitivity_threshold: 0.5,
            toxicity_resistance: 0.5,
            dream_tolerance: 0.5,
            last_feed: None,
            last_sleep: None,
            auto_sleep_enabled: true,
            sleep_schedule_hour: 23,
            wake_schedule_hour: 6,
            sleep_duration_hours: 7.0,
            sleep_session_started_at: None,
            sleep_session_ends_at: None,
        }
    }
}

impl OrganismState {
    /// Fresh state seeded from the auto-sleep defaults.
    pub fn with_schedule(rules: &AutoSleepRules) -> Self {
        let mut state = Self {
            auto_sleep_enabled: rules.enabled_by_default,
            sleep_schedule_hour: rules.sleep_hour,
            sleep_duration_hours: rules.duration_hours,
            ..Self::default()
        };
        state.normalize();
        state
    }

    /// Sanitize and clamp all fields to valid ranges.
    pub fn normalize(&mut self) {
        self.hunger = clamp(sanitize(self.hunger, 100.0), 0.0, HUNGER_MAX);
        self.metabolism = clamp(sanitize(self.metabolism, 0.0), 0.0, METABOLISM_MAX);
        self.toxicity_level = clamp(sanitize(self.toxicity_level, 0.0), 0.0, TOXICITY_MAX);
        self.dream_energy = clamp(sanitize(self.dream_energy, 5.0), 0.0, DREAM_ENERGY_MAX);
        self.dream_debt = clamp(sanitize(self.dream_debt, 0.0), 0.0, DREAM_DEBT_MAX);
        self.sensitivity_threshold = clamp(sanitize(self.sensitivity_threshold, 0.5), 0.0, 1.0);
        self.toxicity_resistance = clamp(sanitize(self.toxicity_resistance, 0.5), 0.0, 1.0);
        self.dream_tolerance = clamp(sanitize(self.dream_tolerance, 0.5), 0.0, 1.0);
        self.normalize_schedule();
        if self.sleep_session_started_at.is_none() || self.sleep_session_ends_at.is_none() {
            self.clear_session();
        }
    }

    /// Clamp the schedule and re-derive the wake hour.
    pub fn normalize_schedule(&mut self) {
        self.sleep_schedule_hour = self.sleep_schedule_hour.min(23);
        self.sleep_duration_hours =
            sanitize(self.sleep_duration_hours, 7.0).max(MIN_SLEEP_DURATION_HOURS);
        self.wake_schedule_hour = derive_wake_hour(self.sleep_schedule_hour, self.sleep_duration_hours);
    }

    pub fn has_session(&self) -> bool {
        self.sleep_session_started_at.is_some() && self.sleep_session_ends_at.is_some()
    }

    /// Whether `now` lies inside the recorded session.
    pub fn session_active_at(&self, now: DateTime<Utc>) -> bool {
        match (self.sleep_session_started_at, self.sleep_session_ends_at) {
            (Some(start), Some(end)) => start <= now && now < end,
            _ => false,
        }
    }

    pub fn open_session(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.sleep_session_started_at = Some(start);
        self.sleep_session_ends_at = Some(end);
    }

    pub fn clear_session(&mut self) {
        self.sleep_session_started_at = None;
        self.sleep_session_ends_at = None;
    }

    /// Hours elapsed since `since`, never negative.
    pub fn hours_between(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        ((now - since).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
    }
}

/// Wake hour for a sleep hour and duration, wrapping past midnight.
pub fn derive_wake_hour(sleep_hour: u32, duration_hours: f64) -> u32 {
    let wake = (sleep_hour as f64 + duration_hours).rem_euclid(24.0);
    (wake.floor() as u32).min(23)
}
