//! Capacity-bounded set of open positions.
//!
//! The book is the sole owner of open [`Position`]s. It refuses entries
//! beyond `max_positions` and hands closed positions back to the caller,
//! which records them in the ledger.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::execution::Fill;
use super::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionBook {
    max_positions: usize,
    positions: BTreeMap<String, Position>,
}

impl PositionBook {
    pub fn new(max_positions: usize) -> Self {
        Self {
            max_positions,
            positions: BTreeMap::new(),
        }
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn free_slots(&self) -> usize {
        self.max_positions.saturating_sub(self.positions.len())
    }

    pub fn is_full(&self) -> bool {
        self.free_slots() == 0
    }

    pub fn holds(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    /// Add a position unless the book is full or already holds the ticker.
    pub fn try_open(&mut self, position: Position) -> bool {
        if self.is_full() || self.holds(&position.ticker) {
            return false;
        }
        self.positions.insert(position.ticker.clone(), position);
        true
    }

    /// Close every position held for at least `holding_period` trading days
    /// as of timeline index `day`. `fill` prices the exit; positions it
    /// returns `None` for (no price that date) stay open.
    pub fn close_due<F>(
        &mut self,
        date: NaiveDate,
        day: usize,
        holding_period: usize,
        mut fill: F,
    ) -> Vec<Position>
    where
        F: FnMut(&Position) -> Option<Fill>,
    {
        let due: Vec<(String, Fill)> = self
            .positions
            .values()
            .filter(|pos| pos.is_due(day, holding_period))
            .filter_map(|pos| fill(pos).map(|f| (pos.ticker.clone(), f)))
            .collect();

        let mut closed = Vec::with_capacity(due.len());
        for (ticker, f) in due {
            if let Some(mut pos) = self.positions.remove(&ticker) {
                pos.close(date, f.price, f.net_value);
                closed.push(pos);
            }
        }
        closed
    }

    /// Update the mark for a held ticker.
    pub fn mark(&mut self, ticker: &str, price: f64) {
        if let Some(pos) = self.positions.get_mut(ticker) {
            pos.last_price = price;
        }
    }

    pub fn marked_value(&self) -> f64 {
        self.positions.values().map(Position::marked_value).sum()
    }

    /// Sum of entry values still committed to open positions.
    pub fn invested(&self) -> f64 {
        self.positions.values().map(|p| p.entry_value).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn into_open_positions(self) -> Vec<Position> {
        self.positions.into_values().collect()
    }
}
