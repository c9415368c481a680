//! CSV file feeds.
//!
//! Prices live one file per ticker (`<dir>/<TICKER>.csv`, columns
//! `date,close[,volume]`); signals one file per signal
//! (`<dir>/<signal>.csv`, columns `date,ticker,value`).

use crate::domain::error::SigtraderError;
use crate::domain::market_data::PriceBar;
use crate::domain::signal::SignalRecord;
use crate::ports::price_port::PriceFeed;
use crate::ports::signal_port::SignalFeed;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

fn data_error(reason: String) -> SigtraderError {
    SigtraderError::DataSource { reason }
}

fn read_records(path: &Path) -> Result<Vec<csv::StringRecord>, SigtraderError> {
    let content = fs::read_to_string(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    rdr.records()
        .map(|r| r.map_err(|e| data_error(format!("CSV parse error in {}: {}", path.display(), e))))
        .collect()
}

fn parse_date(record: &csv::StringRecord, col: usize) -> Result<NaiveDate, SigtraderError> {
    let raw = record
        .get(col)
        .ok_or_else(|| data_error("missing date column".into()))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| data_error(format!("invalid date '{raw}': {e}")))
}

fn parse_f64(record: &csv::StringRecord, col: usize, name: &str) -> Result<f64, SigtraderError> {
    record
        .get(col)
        .ok_or_else(|| data_error(format!("missing {name} column")))?
        .parse()
        .map_err(|e| data_error(format!("invalid {name} value: {e}")))
}

/// Stems of `*.csv` files in `dir`, sorted.
fn list_stems(dir: &Path) -> Result<Vec<String>, SigtraderError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| data_error(format!("failed to read directory {}: {}", dir.display(), e)))?;

    let mut stems = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| data_error(format!("directory entry error: {e}")))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}

pub struct CsvPriceFeed {
    base_path: PathBuf,
}

impl CsvPriceFeed {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    fn read_all(&self, ticker: &str) -> Result<Vec<PriceBar>, SigtraderError> {
        let mut bars = Vec::new();
        for record in read_records(&self.csv_path(ticker))? {
            let date = parse_date(&record, 0)?;
            let close = parse_f64(&record, 1, "close")?;
            let volume = match record.get(2) {
                Some(v) if !v.is_empty() => Some(parse_f64(&record, 2, "volume")?),
                _ => None,
            };
            bars.push(PriceBar {
                ticker: ticker.to_string(),
                date,
                close,
                volume,
            });
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl PriceFeed for CsvPriceFeed {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SigtraderError> {
        let mut bars = self.read_all(ticker)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        Ok(bars)
    }

    fn list_tickers(&self) -> Result<Vec<String>, SigtraderError> {
        list_stems(&self.base_path)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SigtraderError> {
        if !self.csv_path(ticker).exists() {
            return Ok(None);
        }
        let bars = self.read_all(ticker)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}

pub struct CsvSignalFeed {
    base_path: PathBuf,
}

impl CsvSignalFeed {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }
}

impl SignalFeed for CsvSignalFeed {
    fn fetch_signals(
        &self,
        signal: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SignalRecord>, SigtraderError> {
        let path = self.base_path.join(format!("{signal}.csv"));
        let mut records = Vec::new();

        for record in read_records(&path)? {
            let date = parse_date(&record, 0)?;
            if date < start_date || date > end_date {
                continue;
            }
            let ticker = record
                .get(1)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| data_error("missing ticker column".into()))?
                .to_uppercase();
            let value = parse_f64(&record, 2, "value")?;
            records.push(SignalRecord {
                date,
                ticker,
                value,
            });
        }

        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    fn list_signals(&self) -> Result<Vec<String>, SigtraderError> {
        list_stems(&self.base_path)
    }
}
