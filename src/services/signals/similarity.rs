//! Historical pattern similarity search.
//!
//! The most recent return window is compared against earlier windows of the
//! same series with zero-normalized cross-correlation. The forward returns of
//! the closest matches vote on direction, weighted by recency.

use super::indicators::safe_div;
use crate::config::SimilarityConfig;
use crate::types::SimilarityResult;
use tracing::debug;

/// One retained historical window.
#[derive(Debug, Clone, Copy)]
struct Match {
    sim: f64,
    ret: f64,
    weight: f64,
}

/// Parameters of a single-window search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub window_len: usize,
    pub horizon: usize,
    pub step: usize,
    pub top_k: usize,
    pub half_life: f64,
    pub min_corr: f64,
}

/// Candidate window starts, most recent first.
///
/// Every start `s` satisfies `s + window_len + horizon <= n - window_len`
/// and `s < n - window_len - horizon - 2`: the forward point of a historical
/// window always lies strictly before the current window begins.
pub fn eligible_starts(n: usize, window_len: usize, horizon: usize, step: usize) -> Vec<usize> {
    let step = step.max(1);
    let inclusive = n.checked_sub(2 * window_len + horizon);
    let exclusive = n
        .checked_sub(window_len + horizon + 2)
        .and_then(|limit| limit.checked_sub(1));

    let Some(last) = inclusive.zip(exclusive).map(|(a, b)| a.min(b)) else {
        return Vec::new();
    };

    (0..=last).rev().step_by(step).collect()
}

/// Simple returns `(c[i] - c[i-1]) / c[i-1]`.
pub fn returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| safe_div(w[1] - w[0], w[0]))
        .collect()
}

/// Zero-normalized cross-correlation in [-1, 1]; `None` when either side has
/// no variance or the result is not finite.
pub fn zncc(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut dot, mut ss_a, mut ss_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (da, db) = (x - mean_a, y - mean_b);
        dot += da * db;
        ss_a += da * da;
        ss_b += db * db;
    }

    let denom = (ss_a * ss_b).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }

    let value = dot / denom;
    value.is_finite().then(|| value.clamp(-1.0, 1.0))
}

/// Search with a single window length.
pub fn search(closes: &[f64], params: &SearchParams) -> SimilarityResult {
    let n = closes.len();
    let wl = params.window_len;
    if wl < 3 || n < wl {
        return SimilarityResult::neutral();
    }

    let current = returns(&closes[n - wl..]);
    let half_life = if params.half_life > 0.0 {
        params.half_life
    } else {
        f64::INFINITY
    };

    let mut matches: Vec<Match> = Vec::new();
    let mut discarded = 0usize;

    for (age, start) in eligible_starts(n, wl, params.horizon, params.step)
        .into_iter()
        .enumerate()
    {
        let Some(sim) = zncc(&current, &returns(&closes[start..start + wl])) else {
            discarded += 1;
            continue;
        };
        if sim < params.min_corr {
            continue;
        }

        let anchor = closes[start + wl - 1];
        let future = closes[start + wl - 1 + params.horizon];
        let ret = safe_div(future - anchor, anchor);

        matches.push(Match {
            sim,
            ret,
            weight: 2f64.powf(-(age as f64) / half_life),
        });
    }

    if discarded > 0 {
        debug!("Discarded {} degenerate windows (len {})", discarded, wl);
    }

    matches.sort_by(|a, b| b.sim.total_cmp(&a.sim));
    matches.truncate(params.top_k);

    if matches.is_empty() {
        return SimilarityResult::neutral();
    }

    let total_weight: f64 = matches.iter().map(|m| m.weight).sum();
    let up_weight: f64 = matches
        .iter()
        .filter(|m| m.ret >= 0.0)
        .map(|m| m.weight)
        .sum();
    let weighted_sim: f64 = matches.iter().map(|m| m.weight * m.sim).sum::<f64>() / total_weight;

    // Laplace smoothing keeps small samples away from 0 and 1.
    let long_prob = (up_weight + 1.0) / (total_weight + 2.0);

    SimilarityResult {
        long_prob,
        short_prob: 1.0 - long_prob,
        avg_sim: ((weighted_sim + 1.0) * 50.0).clamp(0.0, 100.0),
        count: matches.len(),
        variance: 0.0,
    }
}

/// Window lengths of the ensemble: 0.8x, 1.0x and 1.2x the base.
pub fn ensemble_windows(base: usize) -> [usize; 3] {
    let scaled = |factor: f64| ((base as f64 * factor).round() as usize).max(4);
    [scaled(0.8), base.max(4), scaled(1.2)]
}

/// Ensemble search across three window lengths.
///
/// Each window votes with its own sample count; the canonical window gets an
/// extra `base_weight` factor. `variance` is the spread of `long_prob` across
/// windows that found anything.
pub fn similarity(closes: &[f64], horizon: usize, config: &SimilarityConfig) -> SimilarityResult {
    let windows = ensemble_windows(config.base_window);

    let results: Vec<(SimilarityResult, f64)> = windows
        .iter()
        .enumerate()
        .map(|(i, &window_len)| {
            let result = search(
                closes,
                &SearchParams {
                    window_len,
                    horizon,
                    step: config.step,
                    top_k: config.top_k,
                    half_life: config.half_life,
                    min_corr: config.min_corr,
                },
            );
            let bias = if i == 1 { config.base_weight } else { 1.0 };
            (result, result.count as f64 * bias)
        })
        .collect();

    let total_weight: f64 = results.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return SimilarityResult::neutral();
    }

    let long_prob = results
        .iter()
        .map(|(r, w)| r.long_prob * w)
        .sum::<f64>()
        / total_weight;
    let avg_sim = results.iter().map(|(r, w)| r.avg_sim * w).sum::<f64>() / total_weight;
    let count = results.iter().map(|(r, w)| r.count as f64 * w).sum::<f64>() / total_weight;

    let voting: Vec<f64> = results
        .iter()
        .filter(|(r, _)| r.count > 0)
        .map(|(r, _)| r.long_prob)
        .collect();
    let variance = if voting.len() >= 2 {
        let mean = voting.iter().sum::<f64>() / voting.len() as f64;
        voting.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / voting.len() as f64
    } else {
        0.0
    };

    SimilarityResult {
        long_prob: long_prob.clamp(0.0, 1.0),
        short_prob: 1.0 - long_prob.clamp(0.0, 1.0),
        avg_sim: avg_sim.clamp(0.0, 100.0),
        count: count.round() as usize,
        variance,
    }
}
