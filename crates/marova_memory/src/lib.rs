pub mod coordinator;
pub mod dream;
pub mod ledger;
pub mod notifier;
pub mod sleep;
pub mod sqlite;
pub mod store;

pub use coordinator::{apply_feed, AssessmentReport, OrganismCoordinator, SleepReport, TelemetryReport};
pub use dream::{draw_energy, glyphs_for, select_seeds, DreamGenerator, EnergyDraw, SeedProfile};
pub use ledger::{Ingested, MemoryLedger, SPEND_TOLERANCE};
pub use notifier::{LogNotifier, NotificationDispatcher};
pub use sleep::{apply_sleep_cycle, CycleOutcome, SchedulerEvent, SchedulerPass, SchedulerStatus, SleepScheduler};
pub use sqlite::SqliteStore;
pub use store::InMemoryStore;
