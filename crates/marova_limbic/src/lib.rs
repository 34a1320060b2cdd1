//! # Marova Limbic System
//!
//! Vital-sign regulation for the organism. Everything here is a pure function
//! of a snapshot and a timestamp:
//!
//! - **Aggregation**: vitals drift toward targets derived from biology,
//!   personality, memory and sleep history
//! - **Mood**: a threshold cascade over the aggregated vitals
//! - **Telemetry**: deduplicated samples of every persisted aggregation
//!
//! I/O and locking live in `marova_memory`.

pub mod aggregator;
mod health;
mod mood;
mod personality;
mod telemetry;

pub use aggregator::{
    blend, infer_sleep_phase, recency_weight, Aggregation, DnaEnergy, DnaMetrics, MemoryMetrics,
    PersonalityMetrics, SleepMetrics, StateAggregator, Targets,
};
pub use health::{evaluate_health_survey, HealthEvaluation};
pub use mood::{resolve_mood, MoodSignals};
pub use personality::{derive_traits, dna_token_energy, DerivedTraits};
pub use telemetry::TelemetryRecorder;
