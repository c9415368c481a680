//! SQLite price and signal store.
//!
//! Tables: `prices(ticker, date, close, volume)` and
//! `signal_history(signal, ticker, date, value)`. Dates are stored as
//! ISO `YYYY-MM-DD` text so lexical comparison matches date order.

use crate::domain::error::SigtraderError;
use crate::domain::market_data::PriceBar;
use crate::domain::signal::SignalRecord;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceFeed;
use crate::ports::signal_port::SignalFeed;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const DATE_FMT: &str = "%Y-%m-%d";

fn pool_err(e: r2d2::Error) -> SigtraderError {
    SigtraderError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SigtraderError {
    SigtraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_sql_date(raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SigtraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SigtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SigtraderError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), SigtraderError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prices (
                    ticker TEXT NOT NULL,
                    date TEXT NOT NULL,
                    close REAL NOT NULL,
                    volume REAL,
                    PRIMARY KEY (ticker, date)
                );
                CREATE TABLE IF NOT EXISTS signal_history (
                    signal TEXT NOT NULL,
                    ticker TEXT NOT NULL,
                    date TEXT NOT NULL,
                    value REAL NOT NULL,
                    PRIMARY KEY (signal, ticker, date)
                );
                CREATE INDEX IF NOT EXISTS idx_signal_history_date
                    ON signal_history(signal, date);",
            )
            .map_err(query_err)
    }

    pub fn insert_prices(&self, bars: &[PriceBar]) -> Result<(), SigtraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO prices (ticker, date, close, volume)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    bar.ticker,
                    bar.date.format(DATE_FMT).to_string(),
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    pub fn insert_signals(&self, signal: &str, records: &[SignalRecord]) -> Result<(), SigtraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for record in records {
            tx.execute(
                "INSERT OR REPLACE INTO signal_history (signal, ticker, date, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    signal,
                    record.ticker,
                    record.date.format(DATE_FMT).to_string(),
                    record.value
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }
}

impl PriceFeed for SqliteStore {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, close, volume FROM prices
                 WHERE ticker = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    ticker,
                    start_date.format(DATE_FMT).to_string(),
                    end_date.format(DATE_FMT).to_string()
                ],
                |row| {
                    Ok(PriceBar {
                        ticker: ticker.to_string(),
                        date: parse_sql_date(row.get(0)?)?,
                        close: row.get(1)?,
                        volume: row.get(2)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn list_tickers(&self) -> Result<Vec<String>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ticker FROM prices ORDER BY ticker")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<String>>>().map_err(query_err)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SigtraderError> {
        let result: (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE ticker = ?1",
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                let min = parse_sql_date(min).map_err(query_err)?;
                let max = parse_sql_date(max).map_err(query_err)?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl SignalFeed for SqliteStore {
    fn fetch_signals(
        &self,
        signal: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SignalRecord>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, ticker, value FROM signal_history
                 WHERE signal = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC, ticker ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    signal,
                    start_date.format(DATE_FMT).to_string(),
                    end_date.format(DATE_FMT).to_string()
                ],
                |row| {
                    Ok(SignalRecord {
                        date: parse_sql_date(row.get(0)?)?,
                        ticker: row.get(1)?,
                        value: row.get(2)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn list_signals(&self) -> Result<Vec<String>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT signal FROM signal_history ORDER BY signal")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<String>>>().map_err(query_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_keys(&self, _section: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(ticker: &str, day: u32, close: f64) -> PriceBar {
        PriceBar {
            ticker: ticker.to_string(),
            date: d(day),
            close,
            volume: Some(1000.0),
        }
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
    }

    #[test]
    fn from_config_missing_path() {
        match SqliteStore::from_config(&EmptyConfig) {
            Err(SigtraderError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_initialization_is_idempotent() {
        let store = store();
        store.initialize_schema().unwrap();
    }

    #[test]
    fn fetch_prices_in_range() {
        let store = store();
        store
            .insert_prices(&[bar("BHP", 1, 100.5), bar("BHP", 2, 101.5), bar("BHP", 9, 99.0)])
            .unwrap();

        let fetched = store.fetch_prices("BHP", d(1), d(2)).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].ticker, "BHP");
        assert_eq!(fetched[1].close, 101.5);
        assert_eq!(fetched[1].volume, Some(1000.0));
    }

    #[test]
    fn insert_replaces_same_day() {
        let store = store();
        store.insert_prices(&[bar("BHP", 1, 100.0)]).unwrap();
        store.insert_prices(&[bar("BHP", 1, 105.0)]).unwrap();
        let fetched = store.fetch_prices("BHP", d(1), d(1)).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].close, 105.0);
    }

    #[test]
    fn list_tickers_distinct_sorted() {
        let store = store();
        store
            .insert_prices(&[bar("CBA", 1, 150.0), bar("BHP", 1, 100.0), bar("BHP", 2, 101.0)])
            .unwrap();
        assert_eq!(store.list_tickers().unwrap(), vec!["BHP", "CBA"]);
    }

    #[test]
    fn data_range_reports_coverage() {
        let store = store();
        store
            .insert_prices(&[bar("BHP", 1, 100.0), bar("BHP", 5, 102.5)])
            .unwrap();

        assert_eq!(store.get_data_range("BHP").unwrap(), Some((d(1), d(5), 2)));
        assert_eq!(store.get_data_range("CBA").unwrap(), None);
    }

    #[test]
    fn signals_round_trip_by_name_and_range() {
        let store = store();
        let records = vec![
            SignalRecord { date: d(2), ticker: "CBA".into(), value: -1.0 },
            SignalRecord { date: d(2), ticker: "BHP".into(), value: 2.5 },
            SignalRecord { date: d(8), ticker: "BHP".into(), value: 0.5 },
        ];
        store.insert_signals("sentiment", &records).unwrap();
        store.insert_signals("rotation", &records[..1]).unwrap();

        let fetched = store.fetch_signals("sentiment", d(1), d(5)).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].ticker, "BHP");
        assert_eq!(fetched[0].value, 2.5);

        assert_eq!(store.list_signals().unwrap(), vec!["rotation", "sentiment"]);
    }
}
