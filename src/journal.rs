// =============================================================================
// Trade Journal: write-once trade records and their sinks
// =============================================================================
//
// The journal keeps every record the engine emitted (plus, in live mode, the
// latest persisted one from before a restart) and answers the duplicate
// checks that stop a rescanned bar from trading twice:
//
//   buy:  journal empty, or last record is a SELL strictly before the bar
//   sell: last record is a BUY strictly before the bar
//
// Sinks are the durable side. Backtest records are never handed to a sink.
// =============================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub instrument: String,
    pub time: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: Side,
    /// `false` for backtest records, which never reach a sink.
    pub persisted: bool,
}

impl TradeRecord {
    pub fn new(
        instrument: impl Into<String>,
        time: DateTime<Utc>,
        price: f64,
        size: f64,
        side: Side,
        persisted: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.into(),
            time,
            price,
            size,
            side,
            persisted,
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

pub trait TradeSink: Send + Sync {
    fn append(&self, record: &TradeRecord) -> Result<()>;

    /// Up to `count` most recent records, oldest first.
    fn recent(&self, count: usize) -> Result<Vec<TradeRecord>>;
}

/// Append-only JSON-lines file, one record per line.
#[derive(Debug)]
pub struct JsonlTradeSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTradeSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TradeSink for JsonlTradeSink {
    fn append(&self, record: &TradeRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("failed to serialise trade record")?;

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open trade log {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to trade log {}", self.path.display()))?;

        debug!(action = "persist_trade", id = %record.id, side = %record.side, "trade record appended");
        Ok(())
    }

    fn recent(&self, count: usize) -> Result<Vec<TradeRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read trade log {}", self.path.display()))?;

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TradeRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping malformed trade log line"
                ),
            }
        }

        let skip = records.len().saturating_sub(count);
        Ok(records.split_off(skip))
    }
}

/// Shared in-memory sink; clones see the same records. Backtests run on it.
#[derive(Debug, Clone, Default)]
pub struct MemoryTradeSink {
    records: Arc<Mutex<Vec<TradeRecord>>>,
}

impl MemoryTradeSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn records(&self) -> Vec<TradeRecord> {
        self.records.lock().clone()
    }
}

impl TradeSink for MemoryTradeSink {
    fn append(&self, record: &TradeRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn recent(&self, count: usize) -> Result<Vec<TradeRecord>> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(count);
        Ok(records[skip..].to_vec())
    }
}

// =============================================================================
// Journal
// =============================================================================

#[derive(Debug, Default)]
pub struct TradeJournal {
    records: Vec<TradeRecord>,
}

impl TradeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from records emitted before this engine instance existed.
    pub fn seed(&mut self, records: Vec<TradeRecord>) {
        self.records = records;
    }

    pub fn push(&mut self, record: TradeRecord) {
        self.records.push(record);
    }

    pub fn last(&self) -> Option<&TradeRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn can_buy(&self, time: DateTime<Utc>) -> bool {
        match self.last() {
            None => true,
            Some(last) => last.side == Side::Sell && last.time < time,
        }
    }

    pub fn can_sell(&self, time: DateTime<Utc>) -> bool {
        match self.last() {
            None => false,
            Some(last) => last.side == Side::Buy && last.time < time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bar_time, INSTRUMENT};

    fn record(index: usize, side: Side) -> TradeRecord {
        TradeRecord::new(INSTRUMENT, bar_time(index), 100.0 + index as f64, 1.0, side, true)
    }

    #[test]
    fn empty_journal_allows_only_buy() {
        let journal = TradeJournal::new();
        assert!(journal.can_buy(bar_time(0)));
        assert!(!journal.can_sell(bar_time(0)));
    }

    #[test]
    fn replayed_bar_is_rejected() {
        let mut journal = TradeJournal::new();
        journal.push(record(5, Side::Buy));
        assert!(!journal.can_buy(bar_time(6)));
        assert!(!journal.can_sell(bar_time(5)));
        assert!(!journal.can_sell(bar_time(4)));
        assert!(journal.can_sell(bar_time(6)));

        journal.push(record(8, Side::Sell));
        assert!(!journal.can_buy(bar_time(8)));
        assert!(journal.can_buy(bar_time(9)));
    }

    #[test]
    fn jsonl_sink_appends_and_reads_tail() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTradeSink::new(dir.path().join("trades.jsonl"));
        assert!(sink.recent(5).unwrap().is_empty());

        let first = record(1, Side::Buy);
        let second = record(2, Side::Sell);
        let third = record(3, Side::Buy);
        for r in [&first, &second, &third] {
            sink.append(r).unwrap();
        }

        let tail = sink.recent(2).unwrap();
        assert_eq!(tail, vec![second, third.clone()]);
        assert_eq!(sink.recent(10).unwrap().len(), 3);
        assert_eq!(sink.recent(1).unwrap(), vec![third]);
    }

    #[test]
    fn jsonl_sink_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let good = record(1, Side::Buy);
        let content = format!("not json\n{}\n\n", serde_json::to_string(&good).unwrap());
        std::fs::write(&path, content).unwrap();

        let sink = JsonlTradeSink::new(&path);
        assert_eq!(sink.recent(5).unwrap(), vec![good]);
    }

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemoryTradeSink::new();
        let clone = sink.clone();
        clone.append(&record(1, Side::Buy)).unwrap();
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.recent(0).unwrap().len(), 0);
    }
}
