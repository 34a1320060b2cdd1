//! Memory Graph & Token Ledger
//!
//! Every accepted memory produces three records at once: the immutable log
//! entry, a graph node linked to the user's recent nodes, and a point token.
//! Tokens are spent oldest-first; a partially redeemed token is split so the
//! spent portion and the leftover always add up to the original amount.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use marova_core::state::{DREAM_ENERGY_MAX, TOXICITY_MAX};
use marova_core::{
    clamp, round3, EngineError, EngineResult, LedgerSummary, MemoryLogEntry, MemoryLogInput,
    MemoryNeighbor, MemoryNode, MemoryRules, MemoryToken, OrganismState, Snapshot,
};

/// Slack allowed when deciding whether a token covers the remaining need.
pub const SPEND_TOLERANCE: f64 = 1e-6;

/// Energy a node can lend to a dream.
pub fn energy_reserve(strength: f64, toxicity: f64) -> f64 {
    (strength * (1.0 - toxicity * 0.6)).max(0.05)
}

/// Similarity between two nodes by valence and strength.
pub fn similarity(a: &MemoryNode, b: &MemoryNode) -> f64 {
    let distance = (a.valence - b.valence).abs() + (a.strength - b.strength).abs();
    clamp(1.0 - distance, 0.0, 1.0)
}

/// Link `new_node` to the most recent `limit` nodes in `user_nodes` (oldest
/// first). Nodes with zero similarity are left out.
pub fn build_neighbors(user_nodes: &[&MemoryNode], new_node: &MemoryNode, limit: usize) -> Vec<MemoryNeighbor> {
    let start = user_nodes.len().saturating_sub(limit);
    user_nodes[start..]
        .iter()
        .filter_map(|node| {
            let weight = similarity(node, new_node);
            (weight > 0.0).then_some(MemoryNeighbor { node_id: node.id, weight })
        })
        .take(limit)
        .collect()
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct Ingested {
    pub log: MemoryLogEntry,
    pub token: MemoryToken,
    pub node: MemoryNode,
}

#[derive(Debug, Clone)]
pub struct MemoryLedger {
    rules: MemoryRules,
}

impl MemoryLedger {
    pub fn new(rules: MemoryRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &MemoryRules {
        &self.rules
    }

    /// Validate and append a memory for `user_id`.
    ///
    /// The stored timestamp is `max(input.timestamp, now)`; the same anchor is
    /// checked against the user's latest log for the cooldown.
    pub fn ingest(
        &self,
        snapshot: &mut Snapshot,
        user_id: Uuid,
        input: &MemoryLogInput,
        now: DateTime<Utc>,
    ) -> EngineResult<Ingested> {
        input.validate()?;
        if !snapshot.has_user(user_id) {
            return Err(EngineError::not_found(format!("user {user_id}")));
        }

        let anchor = input.timestamp.map(|t| t.max(now)).unwrap_or(now);
        let cooldown = Duration::minutes(self.rules.cooldown_minutes);
        let latest = snapshot
            .memory_logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.timestamp)
            .max();
        if let Some(latest) = latest {
            if anchor - latest < cooldown {
                return Err(EngineError::RateLimited {
                    next_allowed: latest + cooldown,
                });
            }
        }

        let reward = self.rules.reward_points;
        let log = MemoryLogEntry {
            id: Uuid::new_v4(),
            user_id,
            timestamp: anchor,
            valence: input.valence,
            strength: input.strength,
            toxicity: input.toxicity,
            embedding: input.embedding.clone(),
            text: input.text.trim().to_string(),
            tokens_awarded: reward,
        };
        let token = MemoryToken {
            id: Uuid::new_v4(),
            user_id,
            log_id: log.id,
            amount: reward,
            created_at: now,
            spent: false,
            spent_at: None,
        };

        let mut node = MemoryNode {
            id: Uuid::new_v4(),
            log_id: log.id,
            valence: input.valence,
            strength: input.strength,
            toxicity: input.toxicity,
            energy_reserve: energy_reserve(input.strength, input.toxicity),
            neighbors: Vec::new(),
        };
        let user_log_ids: Vec<Uuid> = snapshot
            .memory_logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.id)
            .collect();
        let user_nodes: Vec<&MemoryNode> = snapshot
            .memory_nodes
            .iter()
            .filter(|n| user_log_ids.contains(&n.log_id))
            .collect();
        node.neighbors = build_neighbors(&user_nodes, &node, self.rules.neighbor_limit);

        snapshot.memory_logs.push(log.clone());
        snapshot.memory_tokens.push(token.clone());
        snapshot.memory_nodes.push(node.clone());

        tracing::info!(
            user = %user_id,
            log = %log.id,
            neighbors = node.neighbors.len(),
            "Memory ingested"
        );
        Ok(Ingested { log, token, node })
    }

    /// Nudge the organism's toxicity and dream energy by a fresh memory.
    pub fn apply_intake(&self, state: &mut OrganismState, valence: f64, strength: f64, toxicity: f64) {
        let tox = &self.rules.toxicity;
        let affect = valence * strength;
        let relief = affect.max(0.0) * tox.positive_relief;
        let penalty = (-affect).max(0.0) * tox.negative_penalty;
        let intake_scale = (1.0 - state.toxicity_resistance * tox.resistance_weight).max(0.0);
        let delta = (toxicity * tox.base_push + penalty) * intake_scale - relief;
        state.toxicity_level = clamp(state.toxicity_level + delta, 0.0, TOXICITY_MAX);

        let gain = valence.max(0.0) * self.rules.energy_gain.positive_valence
            + strength * self.rules.energy_gain.strength;
        state.dream_energy = clamp(state.dream_energy + gain, 0.0, DREAM_ENERGY_MAX);
    }
}

/// Spend up to `points` of a user's unspent tokens, oldest first. Returns the
/// amount actually spent, which is less than `points` only when the user runs
/// out.
pub fn spend_points(
    tokens: &mut Vec<MemoryToken>,
    user_id: Uuid,
    points: f64,
    now: DateTime<Utc>,
) -> EngineResult<f64> {
    if !points.is_finite() || points < 0.0 {
        return Err(EngineError::validation(format!("cannot spend {points} points")));
    }
    if points == 0.0 {
        return Ok(0.0);
    }

    let mut eligible: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.user_id == user_id && !t.spent)
        .map(|(i, _)| i)
        .collect();
    eligible.sort_by_key(|&i| tokens[i].created_at);

    let mut spent = 0.0;
    let mut leftover_token = None;
    for idx in eligible {
        if spent >= points {
            break;
        }
        let remaining = points - spent;
        let token = &mut tokens[idx];
        token.spent = true;
        token.spent_at = Some(now);

        if token.amount <= remaining + SPEND_TOLERANCE {
            spent += token.amount;
            continue;
        }

        let leftover = token.amount - remaining;
        token.amount = remaining;
        spent += remaining;
        leftover_token = Some(MemoryToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            log_id: token.log_id,
            amount: leftover,
            created_at: token.created_at,
            spent: false,
            spent_at: None,
        });
        break;
    }
    if let Some(leftover) = leftover_token {
        tracing::debug!(token = %leftover.id, amount = leftover.amount, "Token split");
        tokens.push(leftover);
    }
    Ok(spent)
}

/// Mark `count` unspent tokens spent, oldest first across all users.
/// Fails without touching anything if fewer than `count` are available.
pub fn consume_tokens(tokens: &mut [MemoryToken], count: usize, now: DateTime<Utc>) -> EngineResult<usize> {
    let mut available: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.spent)
        .map(|(i, _)| i)
        .collect();
    if available.len() < count {
        return Err(EngineError::conflict("insufficient memory tokens"));
    }
    available.sort_by_key(|&i| tokens[i].created_at);
    for &idx in available.iter().take(count) {
        tokens[idx].spent = true;
        tokens[idx].spent_at = Some(now);
    }
    Ok(count)
}

/// Point totals, optionally restricted to one user.
pub fn summarize(logs: &[MemoryLogEntry], tokens: &[MemoryToken], user_id: Option<Uuid>) -> LedgerSummary {
    let owned = |u: Uuid| user_id.map(|id| id == u).unwrap_or(true);
    let logs: Vec<&MemoryLogEntry> = logs.iter().filter(|l| owned(l.user_id)).collect();
    let tokens: Vec<&MemoryToken> = tokens.iter().filter(|t| owned(t.user_id)).collect();

    LedgerSummary {
        total_points: round3(logs.iter().map(|l| l.tokens_awarded.max(0.0)).sum()),
        available_points: round3(tokens.iter().filter(|t| !t.spent).map(|t| t.amount.max(0.0)).sum()),
        spent_points: round3(tokens.iter().filter(|t| t.spent).map(|t| t.amount.max(0.0)).sum()),
        logs_recorded: logs.len(),
        tokens_issued: tokens.len(),
    }
}

/// Flip a token's spent flag. Unchanged tokens keep their `spent_at`.
pub fn set_token_status(
    tokens: &mut [MemoryToken],
    token_id: Uuid,
    spent: bool,
    now: DateTime<Utc>,
) -> EngineResult<MemoryToken> {
    let token = tokens
        .iter_mut()
        .find(|t| t.id == token_id)
        .ok_or_else(|| EngineError::not_found(format!("memory token {token_id}")))?;
    if token.spent != spent {
        token.spent = spent;
        token.spent_at = spent.then_some(now);
    }
    Ok(token.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use marova_core::User;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    fn snapshot_with_user() -> (Snapshot, Uuid) {
        let user = User {
            id: Uuid::new_v4(),
            name: "ada".into(),
            created_at: now(),
        };
        let id = user.id;
        let snapshot = Snapshot {
            users: vec![user],
            ..Snapshot::default()
        };
        (snapshot, id)
    }

    fn input(valence: f64, strength: f64, toxicity: f64) -> MemoryLogInput {
        MemoryLogInput {
            timestamp: None,
            valence,
            strength,
            toxicity,
            embedding: vec![0.3, 0.7],
            text: " rain on the window ".into(),
        }
    }

    fn token(user_id: Uuid, amount: f64, minutes: i64) -> MemoryToken {
        MemoryToken {
            id: Uuid::new_v4(),
            user_id,
            log_id: Uuid::new_v4(),
            amount,
            created_at: now() + Duration::minutes(minutes),
            spent: false,
            spent_at: None,
        }
    }

    #[test]
    fn test_ingest_creates_linked_records() {
        let ledger = MemoryLedger::new(MemoryRules::default());
        let (mut snap, user) = snapshot_with_user();

        let out = ledger.ingest(&mut snap, user, &input(0.5, 0.8, 0.5), now()).unwrap();
        assert_eq!(out.log.text, "rain on the window");
        assert_eq!(out.log.tokens_awarded, 100.0);
        assert_eq!(out.token.amount, 100.0);
        assert_eq!(out.token.log_id, out.log.id);
        assert_eq!(out.node.log_id, out.log.id);
        assert!((out.node.energy_reserve - 0.8 * 0.7).abs() < 1e-9);
        assert!(out.node.neighbors.is_empty());
        assert_eq!(snap.memory_logs.len(), 1);
        assert_eq!(snap.memory_nodes.len(), 1);
        assert_eq!(snap.memory_tokens.len(), 1);
    }

    #[test]
    fn test_ingest_unknown_user() {
        let ledger = MemoryLedger::new(MemoryRules::default());
        let (mut snap, _) = snapshot_with_user();
        let err = ledger.ingest(&mut snap, Uuid::new_v4(), &input(0.0, 0.5, 0.0), now());
        assert!(matches!(err, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_ingest_cooldown() {
        let ledger = MemoryLedger::new(MemoryRules::default());
        let (mut snap, user) = snapshot_with_user();
        ledger.ingest(&mut snap, user, &input(0.0, 0.5, 0.0), now()).unwrap();

        let err = ledger
            .ingest(&mut snap, user, &input(0.0, 0.5, 0.0), now() + Duration::minutes(30))
            .unwrap_err();
        match err {
            EngineError::RateLimited { next_allowed } => {
                assert_eq!(next_allowed, now() + Duration::hours(1));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        assert_eq!(snap.memory_logs.len(), 1);

        assert!(ledger
            .ingest(&mut snap, user, &input(0.0, 0.5, 0.0), now() + Duration::hours(1))
            .is_ok());
    }

    #[test]
    fn test_future_timestamp_anchors_cooldown() {
        let ledger = MemoryLedger::new(MemoryRules::default());
        let (mut snap, user) = snapshot_with_user();
        let mut future = input(0.0, 0.5, 0.0);
        future.timestamp = Some(now() + Duration::hours(3));
        let out = ledger.ingest(&mut snap, user, &future, now()).unwrap();
        assert_eq!(out.log.timestamp, now() + Duration::hours(3));

        // Past timestamps are lifted to now
        let mut past = input(0.0, 0.5, 0.0);
        past.timestamp = Some(now() - Duration::hours(10));
        let err = ledger.ingest(&mut snap, user, &past, now() + Duration::hours(5));
        assert!(err.is_ok());
    }

    #[test]
    fn test_neighbors_recent_and_similar() {
        let make = |valence: f64, strength: f64| MemoryNode {
            id: Uuid::new_v4(),
            log_id: Uuid::new_v4(),
            valence,
            strength,
            toxicity: 0.0,
            energy_reserve: 0.5,
            neighbors: vec![],
        };
        let nodes: Vec<MemoryNode> = vec![
            make(0.0, 0.5), // too old
            make(0.1, 0.5),
            make(-1.0, 0.0), // dissimilar
            make(0.2, 0.6),
            make(0.0, 0.5),
        ];
        let refs: Vec<&MemoryNode> = nodes.iter().collect();
        let new_node = make(0.0, 0.5);
        let neighbors = build_neighbors(&refs, &new_node, 4);

        assert_eq!(neighbors.len(), 3);
        assert_eq!(neighbors[0].node_id, nodes[1].id);
        assert!((neighbors[0].weight - 0.9).abs() < 1e-9);
        assert!((neighbors[1].weight - 0.7).abs() < 1e-9);
        assert_eq!(neighbors[2].weight, 1.0);
    }

    #[test]
    fn test_intake_effect() {
        let ledger = MemoryLedger::new(MemoryRules::default());
        let mut state = OrganismState::default();
        state.toxicity_level = 10.0;

        // Negative memory: base 0.5 + penalty 0.5*0.8*1.3, scaled by 0.75
        ledger.apply_intake(&mut state, -0.5, 0.8, 0.5);
        let expected = 10.0 + (0.5 + 0.4 * 1.3) * 0.75;
        assert!((state.toxicity_level - expected).abs() < 1e-9);
        assert!((state.dream_energy - (5.0 + 0.8 * 0.3)).abs() < 1e-9);

        // Positive memory brings relief
        let before = state.toxicity_level;
        ledger.apply_intake(&mut state, 1.0, 1.0, 0.0);
        assert!((state.toxicity_level - (before - 1.6)).abs() < 1e-9);
    }

    #[test]
    fn test_spend_splits_and_preserves_value() {
        let user = Uuid::new_v4();
        let mut tokens = vec![token(user, 100.0, 10), token(user, 100.0, 0), token(Uuid::new_v4(), 100.0, -5)];
        let original_first = tokens[1].clone();

        let spent = spend_points(&mut tokens, user, 150.0, now()).unwrap();
        assert_eq!(spent, 150.0);

        // Oldest (index 1) fully spent, newer one split 50/50
        assert!(tokens[1].spent);
        assert_eq!(tokens[1].amount, original_first.amount);
        assert!(tokens[0].spent);
        assert_eq!(tokens[0].amount, 50.0);
        let leftover = tokens.last().unwrap();
        assert!(!leftover.spent);
        assert_eq!(leftover.amount, 50.0);
        assert_eq!(leftover.log_id, tokens[0].log_id);
        assert_eq!(leftover.created_at, tokens[0].created_at);
        // Other users untouched
        assert!(!tokens[2].spent);
    }

    #[test]
    fn test_spend_tolerance_and_exhaustion() {
        let user = Uuid::new_v4();
        let mut tokens = vec![token(user, 100.0, 0)];
        let spent = spend_points(&mut tokens, user, 100.0 - 5e-7, now()).unwrap();
        assert_eq!(spent, 100.0);
        assert_eq!(tokens.len(), 1);

        let mut tokens = vec![token(user, 40.0, 0)];
        assert_eq!(spend_points(&mut tokens, user, 100.0, now()).unwrap(), 40.0);
        assert_eq!(spend_points(&mut tokens, user, 0.0, now()).unwrap(), 0.0);
        assert!(spend_points(&mut tokens, user, -1.0, now()).is_err());
    }

    #[test]
    fn test_consume_oldest_first() {
        let user = Uuid::new_v4();
        let mut tokens = vec![token(user, 100.0, 20), token(user, 100.0, 0), token(user, 100.0, 10)];
        assert_eq!(consume_tokens(&mut tokens, 2, now()).unwrap(), 2);
        assert!(tokens[1].spent && tokens[2].spent);
        assert!(!tokens[0].spent);

        assert!(consume_tokens(&mut tokens, 2, now()).is_err());
        assert!(!tokens[0].spent);
    }

    #[test]
    fn test_summary_and_status() {
        let (mut snap, user) = snapshot_with_user();
        let ledger = MemoryLedger::new(MemoryRules::default());
        let out = ledger.ingest(&mut snap, user, &input(0.2, 0.4, 0.1), now()).unwrap();
        spend_points(&mut snap.memory_tokens, user, 30.0, now()).unwrap();

        let summary = summarize(&snap.memory_logs, &snap.memory_tokens, Some(user));
        assert_eq!(summary.total_points, 100.0);
        assert_eq!(summary.available_points, 70.0);
        assert_eq!(summary.spent_points, 30.0);
        assert_eq!(summary.tokens_issued, 2);

        let flipped = set_token_status(&mut snap.memory_tokens, out.token.id, false, now()).unwrap();
        assert!(!flipped.spent);
        assert!(flipped.spent_at.is_none());
        assert!(set_token_status(&mut snap.memory_tokens, Uuid::new_v4(), true, now()).is_err());

        let empty = summarize(&snap.memory_logs, &snap.memory_tokens, Some(Uuid::new_v4()));
        assert_eq!(empty.logs_recorded, 0);
    }
}
