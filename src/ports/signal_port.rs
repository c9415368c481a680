//! Signal history port.

use crate::domain::error::SigtraderError;
use crate::domain::signal::SignalRecord;
use chrono::NaiveDate;

/// Precomputed composite-indicator values, one per (date, ticker).
pub trait SignalFeed: Send + Sync {
    /// Records of `signal` with `start <= date <= end`, ordered by date.
    fn fetch_signals(
        &self,
        signal: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SignalRecord>, SigtraderError>;

    /// Names of signals with stored history.
    fn list_signals(&self) -> Result<Vec<String>, SigtraderError>;
}
