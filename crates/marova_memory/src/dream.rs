//! Dream Generator
//!
//! A dream seeds from the strongest recent memory nodes, rolls for success,
//! pays its energy cost from the organism's reserve before touching DNA
//! tokens, and always consumes memory tokens. Nothing here persists: the
//! caller commits the snapshot only when `generate` returns `Ok`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use marova_core::state::{DREAM_DEBT_MAX, DREAM_ENERGY_MAX, HUNGER_MAX, METABOLISM_MAX, TOXICITY_MAX};
use marova_core::{
    clamp, round3, DreamCategory, DreamGlyph, DreamImpact, DreamOutcome, DreamRecord, DreamRequest, DreamRules,
    EngineError, EngineResult, MemoryLogEntry, MemoryNode, OrganismState, RandomSource, SleepPhase, Snapshot,
};
use marova_limbic::recency_weight;

use crate::ledger::consume_tokens;

pub const GLYPH_COLORS: [&str; 5] = ["amethyst", "celestial_blue", "ember", "lilac", "jade"];
pub const GLYPH_MOTIONS: [&str; 5] = ["swaying", "spiraling", "pulsing", "ripple", "drift"];
pub const DREAM_EFFECTS: [&str; 4] = ["moss_weeping", "halo_shed", "tidal_whisper", "aurora_bloom"];

/// Averages over the chosen seed nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeedProfile {
    pub valence: f64,
    pub strength: f64,
    pub toxicity: f64,
}

impl SeedProfile {
    fn of(seeds: &[&MemoryNode]) -> Self {
        if seeds.is_empty() {
            return Self::default();
        }
        let n = seeds.len() as f64;
        Self {
            valence: seeds.iter().map(|s| s.valence).sum::<f64>() / n,
            strength: seeds.iter().map(|s| s.strength).sum::<f64>() / n,
            toxicity: seeds.iter().map(|s| s.toxicity).sum::<f64>() / n,
        }
    }
}

/// Score every node whose log is known and keep the top two or three.
pub fn select_seeds<'a>(nodes: &'a [MemoryNode], logs: &[MemoryLogEntry], now: DateTime<Utc>) -> Vec<&'a MemoryNode> {
    let timestamps: HashMap<Uuid, DateTime<Utc>> = logs.iter().map(|l| (l.id, l.timestamp)).collect();
    let mut scored: Vec<(f64, &MemoryNode)> = nodes
        .iter()
        .filter_map(|node| {
            let ts = timestamps.get(&node.log_id)?;
            let recency = recency_weight(OrganismState::hours_between(*ts, now));
            let score = node.strength * 1.5 + node.valence.max(0.0) - node.toxicity * 0.8 + recency;
            Some((score, node))
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    let keep = scored.len().clamp(2, 3);
    scored.into_iter().take(keep).map(|(_, node)| node).collect()
}

/// One glyph per seed, palettes cycling by position.
pub fn glyphs_for(seeds: &[&MemoryNode]) -> Vec<DreamGlyph> {
    seeds
        .iter()
        .enumerate()
        .map(|(idx, node)| DreamGlyph {
            glyph_id: format!("g{}", idx + 1),
            intensity: clamp(0.35 + node.strength * 0.5 - node.toxicity * 0.2, 0.1, 1.0),
            motion: GLYPH_MOTIONS[idx % GLYPH_MOTIONS.len()].to_string(),
            color: GLYPH_COLORS[idx % GLYPH_COLORS.len()].to_string(),
            seed_nodes: vec![node.id],
        })
        .collect()
}

/// Energy drawn for a dream, split by source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyDraw {
    pub from_state: f64,
    pub from_dna: f64,
    /// Cost that neither source could cover
    pub shortfall: f64,
}

impl EnergyDraw {
    pub fn total(&self) -> f64 {
        self.from_state + self.from_dna
    }
}

/// Draw `cost` from the organism's reserve, then from DNA tokens in order.
pub fn draw_energy(snapshot: &mut Snapshot, cost: f64) -> EnergyDraw {
    let state = &mut snapshot.organism;
    let from_state = state.dream_energy.min(cost).max(0.0);
    state.dream_energy = clamp(state.dream_energy - from_state, 0.0, DREAM_ENERGY_MAX);
    let mut remaining = cost - from_state;

    let mut from_dna = 0.0;
    for token in snapshot.dna_tokens.iter_mut() {
        if remaining <= 0.0 {
            break;
        }
        let available = token.remaining_energy.max(0.0);
        if available <= 0.0 {
            continue;
        }
        let take = available.min(remaining);
        token.remaining_energy = ((available - take).max(0.0) * 1e6).round() / 1e6;
        from_dna += take;
        remaining -= take;
    }

    EnergyDraw {
        from_state,
        from_dna,
        shortfall: remaining.max(0.0),
    }
}

#[derive(Debug, Clone)]
pub struct DreamGenerator {
    rules: DreamRules,
}

impl DreamGenerator {
    pub fn new(rules: DreamRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &DreamRules {
        &self.rules
    }

    /// Category from average seed toxicity (0..1) scaled onto the 0..100 bands.
    pub fn category_for(&self, seed_toxicity: f64) -> DreamCategory {
        let level = seed_toxicity * 100.0;
        let bands = self.rules.toxicity_bands;
        if level >= bands.high {
            DreamCategory::Nightmare
        } else if level <= bands.low {
            DreamCategory::Happy
        } else {
            DreamCategory::Neutral
        }
    }

    pub fn success_probability(&self, seeds: &SeedProfile, force: bool) -> f64 {
        if force {
            return 1.0;
        }
        clamp(
            self.rules.base_probability + seeds.valence * 0.05 - seeds.toxicity * 0.05,
            0.05,
            0.95,
        )
    }

    fn impact(&self, category: DreamCategory) -> Option<&DreamImpact> {
        match category {
            DreamCategory::Nightmare => Some(&self.rules.nightmare),
            DreamCategory::Happy => Some(&self.rules.happy),
            DreamCategory::Neutral => Some(&self.rules.neutral),
            DreamCategory::Dormant => None,
        }
    }

    /// Apply a successful dream's deltas. Returns whether a nightmare jolted
    /// the organism awake.
    pub fn apply_impact(&self, state: &mut OrganismState, category: DreamCategory) -> bool {
        let Some(impact) = self.impact(category) else {
            return false;
        };
        state.dream_energy = clamp(state.dream_energy + impact.energy_delta, 0.0, DREAM_ENERGY_MAX);
        state.toxicity_level = clamp(state.toxicity_level + impact.toxicity_delta, 0.0, TOXICITY_MAX);
        state.hunger = round3(clamp(state.hunger + impact.hunger_delta, 0.0, HUNGER_MAX));
        state.metabolism = clamp(state.metabolism + impact.metabolism_delta, 0.0, METABOLISM_MAX);
        state.dream_debt = clamp(state.dream_debt + impact.debt_delta, 0.0, DREAM_DEBT_MAX);

        let jolted = category == DreamCategory::Nightmare
            && state.toxicity_level > self.rules.toxicity_bands.high + self.rules.wake_margin;
        if jolted {
            state.sleep_phase = SleepPhase::Waking;
        }
        jolted
    }

    fn effects(category: DreamCategory, outcome: DreamOutcome, rng: &dyn RandomSource) -> Vec<String> {
        let pick = || DREAM_EFFECTS[rng.pick(DREAM_EFFECTS.len())].to_string();
        match (outcome, category) {
            (DreamOutcome::Failure, _) => vec!["signal_drift".to_string()],
            (_, DreamCategory::Nightmare) => vec![pick(), "skin_shed".to_string()],
            (_, DreamCategory::Happy) => vec!["aurora_bloom".to_string(), pick()],
            _ => vec![pick(), "tidal_whisper".to_string()],
        }
    }

    /// Attempt a dream against `snapshot`.
    ///
    /// On `Err` the snapshot may be partially modified and must be discarded.
    /// On `Ok` the record has been appended; the caller still owes the
    /// persist pass.
    pub fn generate(
        &self,
        snapshot: &mut Snapshot,
        request: &DreamRequest,
        rng: &dyn RandomSource,
        now: DateTime<Utc>,
    ) -> EngineResult<DreamRecord> {
        request.validate()?;

        let available_tokens = snapshot.memory_tokens.iter().filter(|t| !t.spent).count();
        if available_tokens == 0 {
            return Err(EngineError::conflict("no available memory tokens"));
        }
        if snapshot.memory_logs.is_empty() || snapshot.memory_nodes.is_empty() {
            return Err(EngineError::validation("no memory data available"));
        }
        let state = &snapshot.organism;
        let asleep = state.sleep_phase == SleepPhase::Sleeping && state.sleep_session_started_at.is_some();
        if !asleep && !request.force {
            return Err(EngineError::conflict("dreams can only be generated during sleep"));
        }

        let dna_reserve: f64 = snapshot.dna_tokens.iter().map(|t| t.remaining_energy.max(0.0)).sum();
        let mut combined = state.dream_energy + dna_reserve;
        if let Some(cap) = request.max_energy {
            combined = combined.min(cap);
        }
        if combined <= 0.0 && !request.force {
            return Err(EngineError::conflict("dream energy depleted"));
        }

        let seeds = select_seeds(&snapshot.memory_nodes, &snapshot.memory_logs, now);
        if seeds.is_empty() {
            return Err(EngineError::validation("unable to resolve seed nodes"));
        }
        let profile = SeedProfile::of(&seeds);
        let seed_ids: Vec<Uuid> = seeds.iter().map(|s| s.id).collect();

        let base_cost = clamp(0.6 + profile.strength + profile.toxicity * 0.5, 0.3, 4.0);
        if combined < base_cost && !request.force {
            return Err(EngineError::conflict("insufficient dream energy for request"));
        }

        let probability = self.success_probability(&profile, request.force);
        let success = request.force || rng.next_f64() <= probability;
        let outcome = if success { DreamOutcome::Success } else { DreamOutcome::Failure };
        let category = match (success, request.preferred_category) {
            (false, _) => DreamCategory::Dormant,
            (true, Some(preferred)) => preferred,
            (true, None) => self.category_for(profile.toxicity),
        };

        let glyphs = if success { glyphs_for(&seeds) } else { Vec::new() };
        let intensity = if success {
            clamp(
                0.4 + profile.strength * 0.5 + profile.valence.max(0.0) * 0.2 - profile.toxicity * 0.2,
                0.1,
                1.0,
            )
        } else {
            0.2
        };
        let effects = Self::effects(category, outcome, rng);

        let mut cost = base_cost;
        if success && category == DreamCategory::Nightmare {
            cost *= 1.5;
        }
        if let Some(cap) = request.max_energy {
            cost = cost.min(cap);
        }

        let draw = draw_energy(snapshot, cost);
        if draw.shortfall > 0.0 {
            if !request.force {
                return Err(EngineError::conflict("insufficient combined energy reserves"));
            }
            cost -= draw.shortfall;
        }
        let energy_used = cost.max(0.0);

        let state = &mut snapshot.organism;
        state.sleep_phase = if success { SleepPhase::Dreaming } else { SleepPhase::Restless };
        let mut jolted = false;
        if success {
            jolted = self.apply_impact(state, category);
        } else {
            state.dream_debt = clamp(state.dream_debt + self.rules.failure_debt, 0.0, DREAM_DEBT_MAX);
        }

        let wanted = ((profile.strength * 2.0).ceil() as usize).max(1);
        let consumed = consume_tokens(&mut snapshot.memory_tokens, wanted.min(available_tokens), now)?;

        let record = DreamRecord {
            id: Uuid::new_v4(),
            timestamp: now,
            seed_node_ids: seed_ids,
            glyphs,
            intensity,
            effects,
            energy_used: round3(energy_used),
            state_energy_used: round3(draw.from_state),
            dna_energy_used: round3(draw.from_dna),
            category,
            outcome,
            memory_tokens_consumed: consumed,
        };
        snapshot.dreams.push(record.clone());

        tracing::info!(
            category = %record.category,
            outcome = record.outcome.as_str(),
            energy_used = record.energy_used,
            tokens = consumed,
            jolted,
            "Dream generated"
        );
        Ok(record)
    }
}
