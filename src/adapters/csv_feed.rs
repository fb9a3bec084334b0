//! CSV `DataFeed` adapter (spec §4.T), following the reference crate's
//! `data.rs::load_csv` row-parsing shape, rewritten against `Money`-typed
//! bars and the `{data_dir}/{symbol}.csv` per-symbol file convention.

use crate::domain::{Bar, Symbol};
use crate::errors::{TurtleError, TurtleResult};
use crate::interfaces::{AccountSummary, DataFeed, RawPosition};
use crate::money::Money;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;

pub struct CsvDataFeed {
    data_dir: PathBuf,
}

impl CsvDataFeed {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        CsvDataFeed { data_dir: data_dir.into() }
    }

    fn path_for(&self, symbol: &Symbol) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol.as_str()))
    }

    /// Reads every bar in the file, oldest first; callers trim to the
    /// window they need.
    fn load_all(&self, symbol: &Symbol) -> TurtleResult<Vec<Bar>> {
        let path = self.path_for(symbol);
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| TurtleError::DataSourceUnavailable { symbol: symbol.clone(), reason: format!("{path:?}: {e}") })?;

        let mut bars = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result
                .map_err(|e| TurtleError::DataSourceUnavailable { symbol: symbol.clone(), reason: format!("row {row_idx}: {e}") })?;
            let bar = parse_row(symbol, &record)
                .map_err(|reason| TurtleError::DataSourceUnavailable { symbol: symbol.clone(), reason })?;
            bars.push(bar);
        }
        Ok(bars)
    }
}

fn parse_row(symbol: &Symbol, record: &csv::StringRecord) -> Result<Bar, String> {
    let date: NaiveDate = record.get(0).ok_or("missing date column")?.parse().map_err(|e| format!("bad date: {e}"))?;
    let field = |i: usize, name: &str| -> Result<Money, String> {
        record
            .get(i)
            .ok_or_else(|| format!("missing {name} column"))?
            .parse::<rust_decimal::Decimal>()
            .map(Money::from_decimal)
            .map_err(|e| format!("bad {name}: {e}"))
    };
    let open = field(1, "open")?;
    let high = field(2, "high")?;
    let low = field(3, "low")?;
    let close = field(4, "close")?;
    let volume = field(5, "volume")?;

    Ok(Bar::new(symbol.clone(), date, open, high, low, close, volume))
}

#[async_trait]
impl DataFeed for CsvDataFeed {
    async fn get_bars(&self, symbol: &Symbol, days: usize) -> TurtleResult<Vec<Bar>> {
        let mut bars = self.load_all(symbol)?;
        if bars.len() > days {
            bars = bars.split_off(bars.len() - days);
        }
        Ok(bars)
    }

    async fn get_current_price(&self, symbol: &Symbol) -> TurtleResult<Money> {
        let bars = self.load_all(symbol)?;
        bars.last()
            .map(|b| b.close)
            .ok_or_else(|| TurtleError::InsufficientHistory { symbol: symbol.clone(), needed: 1, available: 0 })
    }

    async fn get_positions(&self) -> TurtleResult<Vec<RawPosition>> {
        Ok(Vec::new())
    }

    async fn get_account_summary(&self) -> TurtleResult<AccountSummary> {
        Ok(AccountSummary { net_liquidation: Money::ZERO, cash: Money::ZERO })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &std::path::Path, symbol: &str, rows: &[(&str, f64, f64, f64, f64, u64)]) {
        let mut file = std::fs::File::create(dir.join(format!("{symbol}.csv"))).unwrap();
        writeln!(file, "date,open,high,low,close,volume").unwrap();
        for (date, o, h, l, c, v) in rows {
            writeln!(file, "{date},{o},{h},{l},{c},{v}").unwrap();
        }
    }

    #[tokio::test]
    async fn reads_bars_and_trims_to_window() {
        let dir = tempdir();
        write_fixture(
            &dir,
            "ZW",
            &[
                ("2024-01-01", 800.0, 805.0, 795.0, 802.0, 1000),
                ("2024-01-02", 802.0, 810.0, 800.0, 808.0, 1100),
                ("2024-01-03", 808.0, 815.0, 805.0, 812.0, 1200),
            ],
        );
        let feed = CsvDataFeed::new(dir.path());
        let bars = feed.get_bars(&Symbol::new("ZW"), 2).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars.last().unwrap().close, Money::from_f64(812.0));
    }

    #[tokio::test]
    async fn current_price_is_the_most_recent_close() {
        let dir = tempdir();
        write_fixture(&dir, "ZW", &[("2024-01-01", 800.0, 805.0, 795.0, 802.0, 1000)]);
        let feed = CsvDataFeed::new(dir.path());
        let price = feed.get_current_price(&Symbol::new("ZW")).await.unwrap();
        assert_eq!(price, Money::from_f64(802.0));
    }

    #[tokio::test]
    async fn missing_file_is_data_source_unavailable() {
        let dir = tempdir();
        let feed = CsvDataFeed::new(dir.path());
        let err = feed.get_bars(&Symbol::new("ZW"), 10).await.unwrap_err();
        assert!(matches!(err, TurtleError::DataSourceUnavailable { .. }));
    }

    struct TempDir(PathBuf);
    impl TempDir {
        fn path(&self) -> &std::path::Path {
            &self.0
        }
    }
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
    impl std::ops::Deref for TempDir {
        type Target = std::path::Path;
        fn deref(&self) -> &std::path::Path {
            &self.0
        }
    }

    fn tempdir() -> TempDir {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("turtle_csv_feed_test_{}_{unique}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }
}
