//! Open position tracking.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub ticker: String,
    pub entry_date: NaiveDate,
    /// Index of the entry date on the run's trading-day timeline.
    pub entry_day: usize,
    pub entry_price: f64,
    pub shares: i64,
    /// Cash committed at entry, commission included.
    pub entry_value: f64,
    pub signal_value_at_entry: f64,
    pub status: PositionStatus,
    /// Most recent price seen for this ticker; used for marking on gap days.
    pub last_price: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub return_pct: Option<f64>,
}

impl Position {
    pub fn open(
        ticker: &str,
        entry_date: NaiveDate,
        entry_day: usize,
        entry_price: f64,
        shares: i64,
        entry_value: f64,
        signal_value: f64,
    ) -> Self {
        Position {
            ticker: ticker.to_string(),
            entry_date,
            entry_day,
            entry_price,
            shares,
            entry_value,
            signal_value_at_entry: signal_value,
            status: PositionStatus::Open,
            last_price: entry_price,
            exit_date: None,
            exit_price: None,
            pnl: None,
            return_pct: None,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }

    pub fn marked_value(&self) -> f64 {
        self.market_value(self.last_price)
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.marked_value() - self.entry_value
    }

    /// Trading days held as of timeline index `day`.
    pub fn holding_days(&self, day: usize) -> usize {
        day.saturating_sub(self.entry_day)
    }

    pub fn is_due(&self, day: usize, holding_period: usize) -> bool {
        self.holding_days(day) >= holding_period
    }

    /// Close the position; `proceeds` is the net cash returned by the sale.
    pub fn close(&mut self, exit_date: NaiveDate, exit_price: f64, proceeds: f64) {
        self.status = PositionStatus::Closed;
        self.last_price = exit_price;
        self.exit_date = Some(exit_date);
        self.exit_price = Some(exit_price);
        self.pnl = Some(proceeds - self.entry_value);
        self.return_pct = Some(if self.entry_price > 0.0 {
            (exit_price / self.entry_price - 1.0) * 100.0
        } else {
            0.0
        });
    }
}
