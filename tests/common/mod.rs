#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use sigtrader::domain::allocation::PositionSizing;
use sigtrader::domain::error::SigtraderError;
use sigtrader::domain::ledger::TradeType;
pub use sigtrader::domain::market_data::PriceBar;
use sigtrader::domain::signal::{SignalCatalog, SignalRecord};
use sigtrader::domain::simulation::{
    BacktestRequest, BacktestResponse, Backtester, SimulationConfig,
};
use sigtrader::domain::universe::ReferenceData;
use sigtrader::ports::price_port::PriceFeed;
use sigtrader::ports::signal_port::SignalFeed;
use std::collections::HashMap;

pub struct MockPriceFeed {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    /// Consecutive daily closes starting at day 1.
    pub fn with_closes(self, ticker: &str, closes: &[f64]) -> Self {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_bar(ticker, i + 1, c))
            .collect();
        self.with_bars(ticker, bars)
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceFeed for MockPriceFeed {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SigtraderError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(SigtraderError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self) -> Result<Vec<String>, SigtraderError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SigtraderError> {
        match self.data.get(ticker) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub struct MockSignalFeed {
    pub records: HashMap<String, Vec<SignalRecord>>,
}

impl MockSignalFeed {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn with_value(mut self, signal: &str, ticker: &str, day: usize, value: f64) -> Self {
        self.records
            .entry(signal.to_string())
            .or_default()
            .push(SignalRecord {
                date: day_date(day),
                ticker: ticker.to_string(),
                value,
            });
        self
    }
}

impl SignalFeed for MockSignalFeed {
    fn fetch_signals(
        &self,
        signal: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SignalRecord>, SigtraderError> {
        Ok(self
            .records
            .get(signal)
            .map(|recs| {
                recs.iter()
                    .filter(|r| r.date >= start_date && r.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_signals(&self) -> Result<Vec<String>, SigtraderError> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Trading day `n` (1-based) of the test calendar.
pub fn day_date(n: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n as i64 - 1)
}

pub fn make_bar(ticker: &str, day: usize, close: f64) -> PriceBar {
    PriceBar {
        ticker: ticker.to_string(),
        date: day_date(day),
        close,
        volume: None,
    }
}

pub fn make_request(signal: &str, threshold: f64, days: usize) -> BacktestRequest {
    BacktestRequest {
        signal_name: signal.to_string(),
        threshold,
        start_date: day_date(1),
        end_date: day_date(days),
        initial_capital: 100_000.0,
        max_positions: 1,
        holding_period: 5,
        position_sizing: PositionSizing::Equal,
    }
}

pub fn universe(tickers: &[&str]) -> ReferenceData {
    ReferenceData::new(tickers.iter().map(|t| t.to_string()).collect())
}

pub fn run_with(
    signals: &MockSignalFeed,
    prices: &MockPriceFeed,
    reference: &ReferenceData,
    request: &BacktestRequest,
    config: SimulationConfig,
) -> Result<BacktestResponse, SigtraderError> {
    let catalog = SignalCatalog::builtin();
    let backtester = Backtester {
        catalog: &catalog,
        signal_feed: signals,
        price_feed: prices,
        reference,
        config,
    };
    backtester.run(request)
}

pub fn run(
    signals: &MockSignalFeed,
    prices: &MockPriceFeed,
    reference: &ReferenceData,
    request: &BacktestRequest,
) -> Result<BacktestResponse, SigtraderError> {
    run_with(signals, prices, reference, request, SimulationConfig::default())
}

/// Replays the ledger and checks `cash + open entry values` against
/// `initial + realized pnl` at every equity point. A BUY's entry value is
/// its gross value plus commission.
pub fn assert_conservation(initial: f64, response: &BacktestResponse) {
    let mut open: HashMap<&str, f64> = HashMap::new();
    let mut realized = 0.0;
    let mut trades = response.trades.iter().peekable();

    for point in &response.equity_curve {
        while let Some(trade) = trades.next_if(|t| t.date <= point.date) {
            match trade.trade_type {
                TradeType::Buy => {
                    open.insert(trade.ticker.as_str(), trade.value + trade.commission);
                }
                TradeType::Sell => {
                    open.remove(trade.ticker.as_str());
                    realized += trade.pnl.unwrap_or(0.0);
                }
            }
        }
        let invested: f64 = open.values().sum();
        let lhs = point.cash + invested;
        let rhs = initial + realized;
        assert!(
            (lhs - rhs).abs() < 1e-6 * initial.max(1.0),
            "conservation broken on {}: {lhs} vs {rhs}",
            point.date
        );
    }
}

/// Trading-day distance between each SELL and its BUY, using the equity
/// curve as the timeline.
pub fn holding_spans(response: &BacktestResponse) -> Vec<usize> {
    let index: HashMap<NaiveDate, usize> = response
        .equity_curve
        .iter()
        .enumerate()
        .map(|(i, p)| (p.date, i))
        .collect();
    let mut entries: HashMap<&str, usize> = HashMap::new();
    let mut spans = Vec::new();
    for trade in &response.trades {
        let day = index[&trade.date];
        match trade.trade_type {
            TradeType::Buy => {
                entries.insert(trade.ticker.as_str(), day);
            }
            TradeType::Sell => {
                if let Some(entry) = entries.remove(trade.ticker.as_str()) {
                    spans.push(day - entry);
                }
            }
        }
    }
    spans
}
