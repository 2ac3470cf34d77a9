// =============================================================================
// Fusion Bot: Main Entry Point
// =============================================================================
//
// One engine, one instrument. Configuration problems stop the process before
// any order can be placed; everything after start-up is logged and retried.
// Ctrl-C cancels the shutdown token, which the engine checks between cycles
// and while backing off.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod engine;
mod error;
mod exchange;
mod execution;
mod indicators;
mod journal;
mod market_data;
mod optimizer;
mod params;
mod position_engine;
mod reconcile;
mod reoptimize;
mod runtime_config;
mod signals;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::{EngineParts, TradingEngine};
use crate::error::EngineError;
use crate::exchange::ExchangeClient;
use crate::execution::{ExchangeOrderAdapter, ExecutionSimulator, OrderAdapter};
use crate::journal::{JsonlTradeSink, MemoryTradeSink, TradeSink};
use crate::market_data::{CandleBuffer, CandleKey, CandleSource, ExchangeCandleSource};
use crate::optimizer::GridSearchOptimizer;
use crate::reoptimize::ReoptimizationTrigger;
use crate::runtime_config::{EngineConfig, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Fusion Bot starting up");

    let config_path =
        std::env::var("FUSION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = EngineConfig::load_or_default(&config_path)?;
    // First run: leave an editable file behind. Env overrides are applied
    // after this and never written back.
    if !std::path::Path::new(&config_path).exists() {
        if let Err(e) = config.save(&config_path) {
            warn!(path = %config_path, error = %e, "failed to write default engine config");
        }
    }
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    let settings = config.engine_settings()?;

    info!(
        product_code = %config.product_code,
        duration = %settings.duration,
        mode = %settings.mode,
        fusion_policy = ?config.fusion_policy,
        past_period = config.past_period,
        "configuration validated"
    );

    // ── 2. Exchange client ───────────────────────────────────────────────
    let api_key = std::env::var("FUSION_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("FUSION_API_SECRET").unwrap_or_default();
    let client = Arc::new(
        ExchangeClient::new(api_key, api_secret, &config.public_url, &config.private_url)
            .context("failed to build exchange client")?,
    );

    if !settings.mode.is_backtest() && !client.has_credentials() {
        return Err(EngineError::invalid(
            "credentials",
            "live trading needs FUSION_API_KEY and FUSION_API_SECRET",
        )
        .into());
    }

    // ── 3. Collaborators ─────────────────────────────────────────────────
    let adapter: Arc<dyn OrderAdapter> = if settings.mode.is_backtest() {
        Arc::new(ExecutionSimulator::new(config.backtest_cash))
    } else {
        Arc::new(ExchangeOrderAdapter::new(
            client.clone(),
            config.product_code.clone(),
            config.size_step,
        ))
    };

    let exchange_source = ExchangeCandleSource::new(client.clone(), config.market_symbol.clone());
    let (source, sink): (Arc<dyn CandleSource>, Arc<dyn TradeSink>) = if settings.mode.is_backtest() {
        // Backtests replay one fetched history; records never leave memory.
        let buffer = CandleBuffer::new(settings.past_period);
        let key = CandleKey::new(settings.instrument.clone(), settings.duration);
        buffer
            .preload(&exchange_source, &key, settings.past_period)
            .await
            .context("failed to load backtest history")?;
        (Arc::new(buffer), Arc::new(MemoryTradeSink::new()))
    } else {
        let sink = JsonlTradeSink::new(&config.trade_log_path);
        info!(path = %sink.path().display(), "trade log");
        (Arc::new(exchange_source), Arc::new(sink))
    };

    let parts = EngineParts {
        source,
        adapter,
        sink,
        fuser: config.fusion_policy.build(config.min_corroboration),
        trigger: ReoptimizationTrigger::new(Arc::new(GridSearchOptimizer::new()), config.reoptimize),
    };

    // ── 4. Shutdown signal ───────────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c, cancelling"),
            }
            cancel.cancel();
        });
    }

    // ── 5. Run ───────────────────────────────────────────────────────────
    let mut engine = TradingEngine::new(settings, parts, cancel);
    info!(trading_start = %engine.trading_start(), "engine ready");

    match engine.run().await {
        Ok(()) | Err(EngineError::Cancelled) => {
            info!(
                position = %engine.position().side,
                trades = engine.journal().records().len(),
                params_enabled = engine.params().map_or(0, |p| p.enabled_count()),
                "Fusion Bot stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "engine failed to start");
            Err(e.into())
        }
    }
}
