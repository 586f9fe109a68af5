//! Multi-timeframe consensus.

use crate::types::{ConsensusResult, SignalCore, SignalMode, SignalType, Timeframe};
use tracing::debug;

/// Edge removed when too few timeframes agree.
pub const DISAGREEMENT_EDGE_PENALTY: f64 = 0.05;

/// Combine per-timeframe cores into one vote.
///
/// `cores` holds one entry per timeframe of `mode.timeframes(primary)`.
/// Cores built on insufficient data are skipped and the mode weights are
/// renormalised over the rest.
pub fn combine(mode: SignalMode, primary: Timeframe, cores: &[SignalCore]) -> ConsensusResult {
    let timeframes = mode.timeframes(primary);
    let base_weights = mode.weights();

    let voting: Vec<(&SignalCore, f64)> = timeframes
        .iter()
        .zip(base_weights)
        .filter_map(|(tf, &weight)| {
            cores
                .iter()
                .find(|core| core.timeframe == *tf && core.features.sufficient)
                .map(|core| (core, weight))
        })
        .collect();

    if voting.is_empty() {
        debug!("No timeframe with enough data for {} on {}", mode, primary);
        return ConsensusResult::empty();
    }

    let total_weight: f64 = voting.iter().map(|(_, w)| w).sum();
    let weights: Vec<f64> = voting.iter().map(|(_, w)| w / total_weight).collect();

    let long_p = voting
        .iter()
        .zip(&weights)
        .map(|((core, _), w)| core.long_p * w)
        .sum::<f64>()
        .clamp(0.0, 1.0);
    let short_p = 1.0 - long_p;
    let signal_type = SignalType::from_probabilities(long_p, short_p);

    let votes: Vec<SignalType> = voting.iter().map(|(core, _)| core.signal_type).collect();
    let agree = votes.iter().filter(|v| **v == signal_type).count();
    let required_agree = mode.required_agree(voting.len());

    let mut edge = (long_p - short_p).abs();
    if agree < required_agree {
        edge = (edge - DISAGREEMENT_EDGE_PENALTY).max(0.0);
    }

    let sim_avg = voting
        .iter()
        .zip(&weights)
        .map(|((core, _), w)| core.sim_avg * w)
        .sum::<f64>();
    let sim_count = voting.iter().map(|(core, _)| core.sim_count).min().unwrap_or(0);
    let sim_var = voting
        .iter()
        .map(|(core, _)| core.sim_var)
        .fold(0.0, f64::max);

    ConsensusResult {
        signal_type,
        long_p,
        short_p,
        win_prob: long_p.max(short_p),
        edge,
        agree,
        required_agree,
        votes,
        timeframes: voting.iter().map(|(core, _)| core.timeframe).collect(),
        sim_avg,
        sim_count,
        sim_var,
        weights,
        degraded: voting.len() == 1,
    }
}

/// Core whose features describe the decision: the primary when it has
/// enough data, otherwise the first voting timeframe.
pub fn anchor_core(primary: Timeframe, cores: &[SignalCore]) -> Option<&SignalCore> {
    cores
        .iter()
        .find(|core| core.timeframe == primary && core.features.sufficient)
        .or_else(|| cores.iter().find(|core| core.features.sufficient))
}
