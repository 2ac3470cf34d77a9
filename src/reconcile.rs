// =============================================================================
// Start-up Reconciliation: recover position and journal after a restart
// =============================================================================
//
// Live mode only. The exchange is the source of truth for open lots; the
// trade sink is the source of truth for what the engine last did.
//
// SAFETY POLICY: this module only reads. It never places or cancels orders.
// =============================================================================

use chrono::Utc;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::execution::{FillResult, OrderAdapter};
use crate::journal::{TradeRecord, TradeSink};
use crate::position_engine::Position;
use crate::types::Side;

/// What the engine starts from.
#[derive(Debug, Clone)]
pub struct ReconciledState {
    pub position: Position,
    pub journal_seed: Vec<TradeRecord>,
}

pub async fn reconcile_live(
    adapter: &dyn OrderAdapter,
    sink: &dyn TradeSink,
    instrument: &str,
    stop_limit_percent: f64,
) -> Result<ReconciledState, EngineError> {
    let mut journal_seed = match sink.recent(1) {
        Ok(records) => records,
        Err(e) => {
            warn!(action = "reconcile", error = %e, "trade log unreadable, starting with empty journal");
            Vec::new()
        }
    };

    let snapshot = adapter
        .get_open_position()
        .await
        .map_err(|e| EngineError::rejected("reconcile", format!("{e:#}")))?;

    let position = match snapshot.vwap() {
        Some(vwap) => {
            let fill = FillResult {
                price: vwap,
                size: snapshot.total_size(),
            };
            let mut position = Position::flat();
            position.open(fill, stop_limit_percent);

            // Lots opened outside the engine still have to be sellable.
            if journal_seed.last().map(|r| r.side) != Some(Side::Buy) {
                warn!(
                    action = "reconcile",
                    vwap,
                    size = fill.size,
                    "open lots without a recorded buy, seeding journal"
                );
                journal_seed = vec![TradeRecord::new(
                    instrument,
                    Utc::now(),
                    fill.price,
                    fill.size,
                    Side::Buy,
                    false,
                )];
            }
            position
        }
        None => {
            // A buy whose sell never reached the log, or lots closed outside
            // the engine. Left in place it would block every future buy.
            if let Some(last) = journal_seed.last().filter(|r| r.side == Side::Buy) {
                warn!(
                    action = "reconcile",
                    id = %last.id,
                    time = %last.time,
                    "trade log ends with a buy but nothing is open, dropping it"
                );
                journal_seed.clear();
            }
            Position::flat()
        }
    };

    info!(
        action = "reconcile",
        position = %position.side,
        entry = position.entry_price,
        stop = position.stop_price,
        last_trade = ?journal_seed.last().map(|r| (r.side, r.time)),
        "start-up reconciliation complete"
    );

    Ok(ReconciledState {
        position,
        journal_seed,
    })
}
