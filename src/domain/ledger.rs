//! Append-only trade ledger.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeType::Buy => f.write_str("BUY"),
            TradeType::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub ticker: String,
    pub date: NaiveDate,
    pub price: f64,
    pub shares: i64,
    pub value: f64,
    /// Commission paid on this fill; zero when costs are off.
    pub commission: f64,
    pub signal_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding_days: Option<usize>,
}

impl Trade {
    pub fn is_sell(&self) -> bool {
        self.trade_type == TradeType::Sell
    }
}

#[derive(Debug, Clone)]
pub struct TradeLedger {
    trades: Vec<Trade>,
    next_id: u64,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self {
            trades: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a trade, assigning the next id. Returns the id.
    pub fn record(&mut self, mut trade: Trade) -> u64 {
        let id = self.next_id;
        trade.id = id;
        self.next_id += 1;
        self.trades.push(trade);
        id
    }

    pub fn record_buy(&mut self, position: &Position) -> u64 {
        let value = position.shares as f64 * position.entry_price;
        self.record(Trade {
            id: 0,
            trade_type: TradeType::Buy,
            ticker: position.ticker.clone(),
            date: position.entry_date,
            price: position.entry_price,
            shares: position.shares,
            value,
            commission: position.entry_value - value,
            signal_value: position.signal_value_at_entry,
            pnl: None,
            return_pct: None,
            holding_days: None,
        })
    }

    /// Record the SELL leg of a closed round trip.
    pub fn record_sell(&mut self, position: &Position, holding_days: usize) -> u64 {
        let exit_price = position.exit_price.unwrap_or(position.last_price);
        let value = position.shares as f64 * exit_price;
        let proceeds = position.entry_value + position.pnl.unwrap_or(0.0);
        self.record(Trade {
            id: 0,
            trade_type: TradeType::Sell,
            ticker: position.ticker.clone(),
            date: position.exit_date.unwrap_or(position.entry_date),
            price: exit_price,
            shares: position.shares,
            value,
            commission: value - proceeds,
            signal_value: position.signal_value_at_entry,
            pnl: position.pnl,
            return_pct: position.return_pct,
            holding_days: Some(holding_days),
        })
    }

    pub fn all(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn sells(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_sell())
    }

    pub fn realized_pnl(&self) -> f64 {
        self.sells().filter_map(|t| t.pnl).sum()
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}
