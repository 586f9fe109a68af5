/**
 * Engine Property Tests
 *
 * Seeded random and degenerate inputs checked against invariants that
 * must hold for every decision:
 * - Historical windows never peek past the current window
 * - Probabilities stay in range at every calibration step
 * - Inference never panics on malformed or tiny inputs
 */

use augur::config::EngineConfig;
use augur::services::signals::similarity::eligible_starts;
use augur::types::{Candle, MarketContext, SignalDecision, SignalMode, Timeframe};
use augur::{SignalEngine, SignalRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

fn random_walk(rng: &mut StdRng, count: usize, start: f64) -> Vec<Candle> {
    let mut close = start;
    (0..count)
        .map(|i| {
            let open = close;
            close = (close * (1.0 + rng.gen_range(-0.02..0.02))).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            Candle::new(i as i64 * 900_000, open, high, low, close, rng.gen_range(0.0..5_000.0))
        })
        .collect()
}

fn flat(count: usize, volume: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| Candle::new(i as i64 * 900_000, 50.0, 50.0, 50.0, 50.0, volume))
        .collect()
}

fn run(engine: &SignalEngine, mode: SignalMode, candles: BTreeMap<Timeframe, Vec<Candle>>) -> SignalDecision {
    engine.build_signal(&SignalRequest {
        symbol: "SOLUSDT".to_string(),
        timeframe: Timeframe::M15,
        mode,
        candles,
        market: MarketContext::new(51.0, 50.0),
    })
}

fn assert_invariants(decision: &SignalDecision) {
    let explain = &decision.explain;

    assert!((explain.long_p + explain.short_p - 1.0).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&explain.long_p));

    for step in &explain.trail {
        assert!(
            (0.5..=0.99).contains(&step.win_prob),
            "{} win_prob {}",
            step.stage,
            step.win_prob
        );
        assert!(step.edge >= 0.0 && step.edge.is_finite(), "{} edge {}", step.stage, step.edge);
    }

    if decision.is_hold() {
        assert!(decision.tp.is_none() && decision.sl.is_none());
        assert!(decision.signature.is_none() && decision.meta_key.is_none());
        assert!(!explain.hold_reasons.is_empty());
    } else {
        assert!(explain.hold_reasons.is_empty());
        let (tp, sl) = (decision.tp.unwrap(), decision.sl.unwrap());
        assert!(tp.is_finite() && sl.is_finite());
        assert!((tp - decision.entry) * (sl - decision.entry) < 0.0);
    }

    assert!(serde_json::to_string(decision).is_ok());
}

// ============================================================================
// No Lookahead
// ============================================================================

#[test]
fn test_eligible_starts_never_overlap_current_window() {
    let mut rng = StdRng::seed_from_u64(2024);

    for _ in 0..2_000 {
        let n = rng.gen_range(0..400);
        let window_len = rng.gen_range(1..60);
        let horizon = rng.gen_range(1..30);
        let step = rng.gen_range(1..5);

        let starts = eligible_starts(n, window_len, horizon, step);
        for pair in starts.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        for s in starts {
            assert!(s + 2 * window_len + horizon <= n);
            assert!(s + window_len + horizon + 2 < n);
        }
    }
}

// ============================================================================
// Calibration Bounds
// ============================================================================

#[test]
fn test_random_walks_respect_bounds() {
    let engine = SignalEngine::new(EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..12 {
        let count = rng.gen_range(30..700);
        let start = rng.gen_range(0.5..500.0);
        let primary = random_walk(&mut rng, count, start);
        let higher = random_walk(&mut rng, count / 2, primary[0].close);
        let candles = BTreeMap::from([(Timeframe::M15, primary), (Timeframe::M30, higher)]);

        let decision = run(&engine, SignalMode::TwoTf, candles);
        assert_invariants(&decision);
    }
}

#[test]
fn test_six_timeframe_random_walks_respect_bounds() {
    let engine = SignalEngine::new(EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(99);

    let candles: BTreeMap<Timeframe, Vec<Candle>> = Timeframe::ALL
        .iter()
        .map(|tf| (*tf, random_walk(&mut rng, 400, 20.0)))
        .collect();

    let decision = run(&engine, SignalMode::SixTf, candles);
    assert_invariants(&decision);
    assert_eq!(decision.explain.votes.len(), 6);
}

// ============================================================================
// Degenerate Inputs
// ============================================================================

#[test]
fn test_flat_series_holds() {
    let engine = SignalEngine::new(EngineConfig::default());

    let decision = run(&engine, SignalMode::TwoTf, BTreeMap::from([(Timeframe::M15, flat(300, 100.0))]));
    assert_invariants(&decision);
    assert!(decision.is_hold());
}

#[test]
fn test_zero_volume_series_is_finite() {
    let engine = SignalEngine::new(EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(5);
    let candles: Vec<Candle> = random_walk(&mut rng, 300, 10.0)
        .into_iter()
        .map(|mut c| {
            c.volume = 0.0;
            c
        })
        .collect();

    let decision = run(&engine, SignalMode::TwoTf, BTreeMap::from([(Timeframe::M15, candles)]));
    assert_invariants(&decision);
    assert!(decision.explain.atr_pct.is_finite());
}

#[test]
fn test_single_candle_holds() {
    let engine = SignalEngine::new(EngineConfig::default());

    let decision = run(&engine, SignalMode::TwoTf, BTreeMap::from([(Timeframe::M15, flat(1, 10.0))]));
    assert_invariants(&decision);
    assert!(decision.is_hold());
    assert_eq!(decision.entry, 50.0);
}

#[test]
fn test_malformed_candles_are_dropped() {
    let engine = SignalEngine::new(EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(3);
    let mut candles = random_walk(&mut rng, 200, 30.0);
    candles[50].close = f64::NAN;
    candles[80].close = -1.0;
    candles[120].high = f64::INFINITY;

    let decision = run(&engine, SignalMode::TwoTf, BTreeMap::from([(Timeframe::M15, candles)]));
    assert_invariants(&decision);
    assert!(decision.entry.is_finite());
}
