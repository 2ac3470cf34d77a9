// =============================================================================
// Position: Flat / Long state with a protective stop
// =============================================================================
//
// Life-cycle:
//   Flat  --buy fill-->  Long(entry, size, stop = entry * multiplier)
//   Long  --sell / stop-->  Flat (stop reset to 0)
//
// Invariant: stop == 0 exactly when Flat, stop > 0 exactly when Long.
// A buy while Long and a sell while Flat are no-ops decided by the engine;
// this type only records transitions that actually happened.
//
// Owned by the engine; no interior mutability.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::execution::FillResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Flat,
    Long,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "Flat"),
            Self::Long => write!(f, "Long"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: f64,
    pub size: f64,
    pub stop_price: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            entry_price: 0.0,
            size: 0.0,
            stop_price: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    /// Flat -> Long on a buy fill. The stop sits at `entry * stop_multiplier`.
    pub fn open(&mut self, fill: FillResult, stop_multiplier: f64) {
        self.side = PositionSide::Long;
        self.entry_price = fill.price;
        self.size = fill.size;
        self.stop_price = fill.price * stop_multiplier;
        info!(
            action = "position_open",
            entry = self.entry_price,
            size = self.size,
            stop = self.stop_price,
            "Flat -> Long"
        );
    }

    /// Long -> Flat.
    pub fn close(&mut self) {
        let previous = std::mem::replace(self, Self::flat());
        info!(
            action = "position_close",
            entry = previous.entry_price,
            size = previous.size,
            "Long -> Flat"
        );
    }

    /// `true` when a Long position's stop has been reached by `close`.
    /// Pure; asking twice with the same close gives the same answer.
    pub fn stop_triggered(&self, close: f64) -> bool {
        self.stop_price > 0.0 && close <= self.stop_price
    }

    /// The stop/side invariant.
    pub fn is_consistent(&self) -> bool {
        match self.side {
            PositionSide::Flat => self.stop_price == 0.0 && self.size == 0.0,
            PositionSide::Long => self.stop_price > 0.0 && self.size >= 0.0,
        }
    }
}
