//! Portfolio state and equity tracking.

use chrono::NaiveDate;
use serde::Serialize;

use super::position_book::PositionBook;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub num_positions: usize,
    pub cash: f64,
}

/// The only mutable aggregate of a run: cash plus the open-position book.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub initial_capital: f64,
    pub book: PositionBook,
    pub equity_curve: Vec<EquityPoint>,
}

impl PortfolioState {
    pub fn new(initial_capital: f64, max_positions: usize) -> Self {
        PortfolioState {
            cash: initial_capital,
            initial_capital,
            book: PositionBook::new(max_positions),
            equity_curve: Vec::new(),
        }
    }

    /// Cash plus every open position marked at its latest price.
    pub fn total_value(&self) -> f64 {
        self.cash + self.book.marked_value()
    }

    pub fn record_equity(&mut self, date: NaiveDate) {
        let point = EquityPoint {
            date,
            portfolio_value: self.total_value(),
            num_positions: self.book.open_count(),
            cash: self.cash,
        };
        self.equity_curve.push(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn new_portfolio() {
        let portfolio = PortfolioState::new(100_000.0, 3);
        assert!((portfolio.cash - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.book.free_slots(), 3);
        assert!(portfolio.equity_curve.is_empty());
    }

    #[test]
    fn total_value_no_positions() {
        let portfolio = PortfolioState::new(100_000.0, 1);
        assert!((portfolio.total_value() - 100_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_value_uses_marks() {
        let mut portfolio = PortfolioState::new(50_000.0, 2);
        portfolio.book.try_open(Position::open("NVDA", date(), 0, 100.0, 100, 10_000.0, 1.0));
        portfolio.cash = 40_000.0;
        portfolio.book.mark("NVDA", 150.0);
        assert!((portfolio.total_value() - 55_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn record_equity_snapshots_counts() {
        let mut portfolio = PortfolioState::new(10_000.0, 2);
        portfolio.book.try_open(Position::open("A", date(), 0, 10.0, 100, 1_000.0, 1.0));
        portfolio.cash = 9_000.0;
        portfolio.record_equity(date());

        let point = &portfolio.equity_curve[0];
        assert_eq!(point.date, date());
        assert_eq!(point.num_positions, 1);
        assert!((point.portfolio_value - 10_000.0).abs() < f64::EPSILON);
        assert!((point.cash - 9_000.0).abs() < f64::EPSILON);
    }
}
