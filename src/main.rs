use anyhow::Context;
use augur::config::AppConfig;
use augur::types::{validate_candles, Candle, MarketContext, SignalDecision, SignalMode, Timeframe};
use augur::{MemorySnapshot, SignalEngine, SignalRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One symbol to scan.
#[derive(Debug, Deserialize)]
struct ScanSymbol {
    symbol: String,
    timeframe: Timeframe,
    candles: BTreeMap<Timeframe, Vec<Candle>>,
}

/// Scan file layout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanInput {
    #[serde(default)]
    market: MarketContext,
    #[serde(default)]
    mode: SignalMode,
    #[serde(default)]
    memory: Option<MemorySnapshot>,
    symbols: Vec<ScanSymbol>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| config.input_path.clone())
        .context("usage: augur <scan.json> (or set SCAN_INPUT)")?;

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading scan file {}", path))?;
    let input: ScanInput =
        serde_json::from_str(&raw).with_context(|| format!("parsing scan file {}", path))?;

    let engine = Arc::new(SignalEngine::new(config.engine.clone()));
    if let Some(snapshot) = input.memory {
        engine
            .memory()
            .import(snapshot)
            .context("importing memory snapshot")?;
    }

    info!(
        "Scanning {} symbols in {} mode ({} concurrent)",
        input.symbols.len(),
        input.mode.as_str(),
        config.concurrency
    );

    let permits = Arc::new(Semaphore::new(config.concurrency));
    let mut handles = Vec::with_capacity(input.symbols.len());

    for entry in input.symbols {
        for (tf, candles) in &entry.candles {
            if let Err(e) = validate_candles(candles) {
                warn!("{} {}: {} (sanitising before inference)", entry.symbol, tf, e);
            }
        }

        let request = SignalRequest {
            symbol: entry.symbol,
            timeframe: entry.timeframe,
            mode: input.mode,
            candles: entry.candles,
            market: input.market,
        };

        let engine = engine.clone();
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .context("scan semaphore closed")?;

        handles.push(tokio::task::spawn_blocking(move || {
            let decision = engine.build_signal(&request);
            drop(permit);
            decision
        }));
    }

    let mut decisions: Vec<SignalDecision> = Vec::with_capacity(handles.len());
    for handle in handles {
        decisions.push(handle.await.context("inference task failed")?);
    }

    let actionable = decisions.iter().filter(|d| !d.is_hold()).count();
    info!(
        "Scan complete: {} actionable, {} hold",
        actionable,
        decisions.len() - actionable
    );

    println!("{}", serde_json::to_string_pretty(&decisions)?);
    Ok(())
}
