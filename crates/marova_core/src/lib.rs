pub mod clock;
pub mod config;
pub mod error;
pub mod random;
pub mod records;
pub mod snapshot;
pub mod state;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    AutoSleepRules, Band, BlendFactors, DreamImpact, DreamRules, MarovaConfig, MemoryRules,
    MoodThresholds, OrganismDefaults, TelemetryConfig,
};
pub use error::{EngineError, EngineResult};
pub use random::{RandomSource, SequenceRandom, ThreadRandom};
pub use records::{
    AssessmentInput, DnaProfile, DnaProfileInput, DnaToken, DreamCategory, DreamGlyph,
    DreamOutcome, DreamRecord, DreamRequest, FeedProfile, HealthBucket, HealthSurvey,
    LedgerSummary, MemoryLogEntry, MemoryLogInput, MemoryNeighbor, MemoryNode, MemoryToken,
    PersonalityAssessment, SleepCycleRecord, SleepCycleRequest, TelemetryEntry, User,
};
pub use snapshot::{Snapshot, SLEEP_HISTORY_LIMIT};
pub use state::{clamp, round3, Mood, OrganismState, SleepPhase};

use async_trait::async_trait;

/// Whole-document persistence for the organism.
///
/// `read` returns `None` before the first `write`. Writes replace the entire
/// document; there are no partial updates.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read(&self) -> anyhow::Result<Option<Snapshot>>;
    async fn write(&self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

/// Best-effort outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str) -> anyhow::Result<()>;
}
