// =============================================================================
// Exchange REST integration
// =============================================================================

pub mod client;

pub use client::{ExchangeClient, Execution, OpenLot};
