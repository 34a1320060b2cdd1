use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MarovaConfig;
use crate::records::{
    DnaProfile, DnaToken, DreamRecord, MemoryLogEntry, MemoryNode, MemoryToken,
    PersonalityAssessment, SleepCycleRecord, TelemetryEntry, User,
};
use crate::state::OrganismState;

/// Sleep history kept in the document.
pub const SLEEP_HISTORY_LIMIT: usize = 50;

/// The whole keyed document a store reads and writes as a unit.
///
/// Collections are kept in insertion order. Every field defaults so that
/// documents written by older builds still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub organism: OrganismState,
    pub users: Vec<User>,
    pub dna_profiles: Vec<DnaProfile>,
    pub assessments: Vec<PersonalityAssessment>,
    pub dna_tokens: Vec<DnaToken>,
    pub memory_logs: Vec<MemoryLogEntry>,
    pub memory_nodes: Vec<MemoryNode>,
    pub memory_tokens: Vec<MemoryToken>,
    pub sleep_cycles: Vec<SleepCycleRecord>,
    pub dreams: Vec<DreamRecord>,
    pub telemetry: Vec<TelemetryEntry>,
}

impl Snapshot {
    /// First-boot document seeded from configuration.
    pub fn initial(config: &MarovaConfig) -> Self {
        Self {
            organism: OrganismState::with_schedule(&config.auto_sleep),
            ..Self::default()
        }
    }

    pub fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn has_user(&self, id: Uuid) -> bool {
        self.user(id).is_some()
    }

    /// Drop the oldest sleep cycles beyond the retention limit.
    pub fn trim_sleep_history(&mut self) {
        if self.sleep_cycles.len() > SLEEP_HISTORY_LIMIT {
            let excess = self.sleep_cycles.len() - SLEEP_HISTORY_LIMIT;
            self.sleep_cycles.drain(..excess);
        }
    }
}
