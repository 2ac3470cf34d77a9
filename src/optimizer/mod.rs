// =============================================================================
// Parameter Optimizer
// =============================================================================
//
// An optimizer turns the recent candle window into the parameter set the
// engine trades with until the next close. `None` means no family showed an
// edge and the engine must wait and ask again.

pub mod grid_search;

use crate::market_data::CandleSeries;
use crate::params::ParameterSet;

pub use grid_search::GridSearchOptimizer;

pub trait Optimizer: Send + Sync {
    fn optimize(&self, series: &CandleSeries) -> Option<ParameterSet>;
}
