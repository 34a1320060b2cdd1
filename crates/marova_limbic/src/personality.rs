//! Trait derivation from a personality assessment.

use marova_core::state::DNA_ENERGY_MAX;
use marova_core::{clamp, round3};
use std::collections::BTreeMap;

/// Extra weight granted when the assessment includes a narrative.
const NARRATIVE_BONUS: f64 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedTraits {
    pub sensitivity_threshold: f64,
    pub toxicity_resistance: f64,
    pub dream_tolerance: f64,
    /// Mean absolute emotion score
    pub intensity: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Derive the three traits from an emotional profile. Results are rounded to
/// three decimals and lie in `[0, 1]`.
pub fn derive_traits(profile: &BTreeMap<String, f64>, has_narrative: bool) -> DerivedTraits {
    let values: Vec<f64> = profile.values().copied().collect();
    let intensity = mean(&values.iter().map(|v| v.abs()).collect::<Vec<_>>());
    let positive = mean(&values.iter().copied().filter(|v| *v > 0.0).collect::<Vec<_>>());
    let negative = mean(&values.iter().filter(|v| **v < 0.0).map(|v| -v).collect::<Vec<_>>());
    let bonus = if has_narrative { NARRATIVE_BONUS } else { 0.0 };

    let sensitivity = 0.38 + intensity * 0.45 - negative * 0.18 + bonus * 0.4;
    let resistance = 0.46 + positive * 0.14 - negative * 0.24 + bonus * 0.6;
    let tolerance = 0.42 + positive * 0.32 + intensity * 0.22 + bonus * 0.7;

    DerivedTraits {
        sensitivity_threshold: round3(clamp(sensitivity, 0.0, 1.0)),
        toxicity_resistance: round3(clamp(resistance, 0.0, 1.0)),
        dream_tolerance: round3(clamp(tolerance, 0.0, 1.0)),
        intensity,
    }
}

/// Energy a fresh DNA token starts with.
pub fn dna_token_energy(traits: &DerivedTraits) -> f64 {
    let energy = 4.0
        + traits.intensity * 3.0
        + traits.dream_tolerance * 3.0
        + traits.toxicity_resistance * 1.5;
    round3(clamp(energy, 3.0, DNA_ENERGY_MAX))
}
