//! Price history port.

use crate::domain::error::SigtraderError;
use crate::domain::market_data::PriceBar;
use chrono::NaiveDate;

/// Closing-price history per ticker, served from a cached store.
///
/// Implementations must be shareable across threads: the loader fetches
/// every ticker of the universe in parallel before a run.
pub trait PriceFeed: Send + Sync {
    /// Bars for `ticker` with `start <= date <= end`, sorted by date.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SigtraderError>;

    fn list_tickers(&self) -> Result<Vec<String>, SigtraderError>;

    /// First date, last date and bar count stored for `ticker`.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SigtraderError>;
}
