use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarovaConfig {
    pub organism: OrganismDefaults,
    pub blend: BlendFactors,
    pub mood: MoodThresholds,
    pub dream: DreamRules,
    pub memory: MemoryRules,
    pub auto_sleep: AutoSleepRules,
    pub telemetry: TelemetryConfig,
}

impl MarovaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: MarovaConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MAROVA_DB_PATH") {
            self.organism.db_path = v;
        }
        if let Ok(v) = std::env::var("MAROVA_UTC_OFFSET_MINUTES") {
            if let Ok(n) = v.parse() {
                self.organism.utc_offset_minutes = n;
            }
        }
        if let Ok(v) = std::env::var("MAROVA_AUTO_SLEEP") {
            if let Ok(flag) = v.parse() {
                self.auto_sleep.enabled_by_default = flag;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrganismDefaults {
    pub db_path: String,
    /// Offset of the organism's local zone from UTC. The circadian window is
    /// computed in this zone. Default: +05:30.
    pub utc_offset_minutes: i32,
}

impl Default for OrganismDefaults {
    fn default() -> Self {
        Self {
            db_path: "marova.db".to_string(),
            utc_offset_minutes: 330,
        }
    }
}

impl OrganismDefaults {
    /// The organism's local zone. Out-of-range offsets fall back to UTC.
    pub fn local_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Per-field factors for the blend-toward-target rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlendFactors {
    pub hunger: f64,
    pub metabolism: f64,
    pub dream_energy: f64,
    pub dream_debt: f64,
    pub toxicity: f64,
    pub sensitivity: f64,
    pub toxicity_resistance: f64,
    pub dream_tolerance: f64,
}

impl Default for BlendFactors {
    fn default() -> Self {
        Self {
            hunger: 0.35,
            metabolism: 0.30,
            dream_energy: 0.25,
            dream_debt: 0.30,
            toxicity: 0.40,
            sensitivity: 0.6,
            toxicity_resistance: 0.5,
            dream_tolerance: 0.5,
        }
    }
}

/// A low/high threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MoodThresholds {
    pub energy: Band,
    pub toxicity: Band,
    pub hunger: Band,
    pub sleep_debt: Band,
    /// Hours without sleep after which sleep counts as overdue.
    pub overdue_sleep_hours: f64,
}

impl Default for MoodThresholds {
    fn default() -> Self {
        Self {
            energy: Band::new(4.0, 9.0),
            toxicity: Band::new(25.0, 60.0),
            hunger: Band::new(40.0, 95.0),
            sleep_debt: Band::new(2.0, 6.0),
            overdue_sleep_hours: 18.0,
        }
    }
}

/// Signed deltas a successful dream applies to the organism.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DreamImpact {
    pub energy_delta: f64,
    pub toxicity_delta: f64,
    pub hunger_delta: f64,
    pub metabolism_delta: f64,
    pub debt_delta: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DreamRules {
    pub base_probability: f64,
    pub toxicity_bands: Band,
    /// A nightmare that leaves toxicity above `toxicity_bands.high + wake_margin`
    /// jolts the organism awake.
    pub wake_margin: f64,
    /// Dream debt added when a dream attempt fails.
    pub failure_debt: f64,
    pub nightmare: DreamImpact,
    pub happy: DreamImpact,
    pub neutral: DreamImpact,
}

impl Default for DreamRules {
    fn default() -> Self {
        Self {
            base_probability: 0.6,
            toxicity_bands: Band::new(25.0, 60.0),
            wake_margin: 10.0,
            failure_debt: 0.3,
            nightmare: DreamImpact {
                energy_delta: -2.13,
                toxicity_delta: 4.0,
                hunger_delta: 12.0,
                metabolism_delta: 0.0,
                debt_delta: 0.6,
            },
            happy: DreamImpact {
                energy_delta: 2.3,
                toxicity_delta: -3.5,
                hunger_delta: 0.0,
                metabolism_delta: -8.0,
                debt_delta: -0.8,
            },
            neutral: DreamImpact {
                energy_delta: 0.8,
                toxicity_delta: 0.0,
                hunger_delta: 0.0,
                metabolism_delta: -3.0,
                debt_delta: -0.2,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryToxicityRules {
    pub base_push: f64,
    pub positive_relief: f64,
    pub negative_penalty: f64,
    pub resistance_weight: f64,
}

impl Default for MemoryToxicityRules {
    fn default() -> Self {
        Self {
            base_push: 1.0,
            positive_relief: 1.6,
            negative_penalty: 1.3,
            resistance_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryEnergyRules {
    pub positive_valence: f64,
    pub strength: f64,
}

impl Default for MemoryEnergyRules {
    fn default() -> Self {
        Self {
            positive_valence: 0.4,
            strength: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryRules {
    /// Flat point reward minted per accepted memory log.
    pub reward_points: f64,
    /// Minimum gap between two submissions from the same user.
    pub cooldown_minutes: i64,
    pub neighbor_limit: usize,
    pub toxicity: MemoryToxicityRules,
    pub energy_gain: MemoryEnergyRules,
}

impl Default for MemoryRules {
    fn default() -> Self {
        Self {
            reward_points: 100.0,
            cooldown_minutes: 60,
            neighbor_limit: 4,
            toxicity: MemoryToxicityRules::default(),
            energy_gain: MemoryEnergyRules::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoSleepRules {
    pub enabled_by_default: bool,
    pub sleep_hour: u32,
    pub duration_hours: f64,
    /// Quality credited to a session that is finalized after the fact.
    pub default_quality: f64,
}

impl Default for AutoSleepRules {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            sleep_hour: 23,
            duration_hours: 7.0,
            default_quality: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub capacity: usize,
    pub min_interval_secs: i64,
    /// Per-metric change below which two snapshots count as identical.
    pub epsilon: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            capacity: 300,
            min_interval_secs: 120,
            epsilon: 0.05,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
