//! Per-ticker price series and the assembled per-date lookups a run needs.
//!
//! Everything here is built before the simulation starts; the loop itself
//! only performs map lookups.

use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::error::SigtraderError;
use super::signal::SignalRecord;
use super::universe::ReferenceData;
use super::volatility::rolling_volatility;
use crate::ports::price_port::PriceFeed;
use crate::ports::signal_port::SignalFeed;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TickerSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
    pub date_index: HashMap<NaiveDate, usize>,
    pub volatility: Vec<Option<f64>>,
}

impl TickerSeries {
    /// Sorts bars, drops non-positive or duplicate-date bars, and
    /// precomputes trailing volatility.
    pub fn new(ticker: String, mut bars: Vec<PriceBar>, lookback: usize) -> Self {
        bars.retain(|b| b.close.is_finite() && b.close > 0.0);
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);

        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volatility = rolling_volatility(&closes, lookback);

        Self {
            ticker,
            bars,
            date_index,
            volatility,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn price(&self, date: NaiveDate) -> Option<f64> {
        self.date_index.get(&date).map(|&i| self.bars[i].close)
    }

    pub fn volatility(&self, date: NaiveDate) -> Option<f64> {
        self.date_index
            .get(&date)
            .and_then(|&i| self.volatility[i])
    }

    /// First close on or after `date`.
    pub fn first_price_from(&self, date: NaiveDate) -> Option<f64> {
        self.bars.iter().find(|b| b.date >= date).map(|b| b.close)
    }
}

/// Sorted union of all bar dates within `[start, end]`.
pub fn build_unified_timeline(
    series: &[TickerSeries],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .filter(|d| *d >= start && *d <= end)
        .collect();
    unique_dates.into_iter().collect()
}

#[derive(Debug, Clone)]
pub struct MarketData {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub timeline: Vec<NaiveDate>,
    series: BTreeMap<String, TickerSeries>,
    signals_by_date: HashMap<NaiveDate, Vec<(String, f64)>>,
    /// Universe members with no usable price history.
    pub missing_tickers: Vec<String>,
}

impl MarketData {
    /// Assemble lookups from already-fetched series and signal records.
    ///
    /// Fails with `NoCommonRange` when no priced date in range carries a
    /// signal record.
    pub fn assemble(
        series: Vec<TickerSeries>,
        signals: Vec<SignalRecord>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, SigtraderError> {
        let timeline = build_unified_timeline(&series, start, end);
        let known: HashSet<&str> = series.iter().map(|s| s.ticker.as_str()).collect();

        let mut signals_by_date: HashMap<NaiveDate, Vec<(String, f64)>> = HashMap::new();
        let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
        let mut duplicates = 0usize;

        for record in signals {
            if record.date < start || record.date > end || !known.contains(record.ticker.as_str()) {
                continue;
            }
            if !seen.insert((record.date, record.ticker.clone())) {
                duplicates += 1;
                continue;
            }
            signals_by_date
                .entry(record.date)
                .or_default()
                .push((record.ticker, record.value));
        }
        if duplicates > 0 {
            warn!("ignored {duplicates} duplicate (date, ticker) signal records");
        }
        for values in signals_by_date.values_mut() {
            values.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let covered = timeline
            .iter()
            .filter(|d| signals_by_date.contains_key(d))
            .count();
        if covered == 0 {
            return Err(SigtraderError::NoCommonRange { start, end });
        }
        debug!(
            "{} trading dates, {} with signal coverage",
            timeline.len(),
            covered
        );

        Ok(Self {
            start,
            end,
            timeline,
            series: series.into_iter().map(|s| (s.ticker.clone(), s)).collect(),
            signals_by_date,
            missing_tickers: Vec::new(),
        })
    }

    pub fn trading_days(&self) -> usize {
        self.timeline.len()
    }

    pub fn ticker_count(&self) -> usize {
        self.series.len()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn price(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(ticker).and_then(|s| s.price(date))
    }

    pub fn volatility(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(ticker).and_then(|s| s.volatility(date))
    }

    /// Signal values dated exactly `date`, ordered by ticker.
    pub fn signals_on(&self, date: NaiveDate) -> &[(String, f64)] {
        self.signals_by_date
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Calendar days of history fetched ahead of `start` so trailing volatility
/// is warm on the first trading date.
pub fn warmup_days(lookback: usize) -> i64 {
    lookback as i64 * 2 + 7
}

/// Fetch the signal series and every ticker's price history, then assemble
/// the run's lookups. Price fetches run in parallel; a ticker whose fetch
/// fails or returns nothing is dropped with a warning.
pub fn load_market_data(
    signal_feed: &dyn SignalFeed,
    price_feed: &dyn PriceFeed,
    reference: &ReferenceData,
    signal_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    lookback: usize,
) -> Result<MarketData, SigtraderError> {
    let signals = signal_feed.fetch_signals(signal_name, start, end)?;
    info!(
        "fetched {} '{}' signal records for {} to {}",
        signals.len(),
        signal_name,
        start,
        end
    );

    let fetch_start = start - Duration::days(warmup_days(lookback));
    let fetched: Vec<(String, Result<Vec<PriceBar>, SigtraderError>)> = reference
        .tickers
        .par_iter()
        .map(|ticker| {
            (
                ticker.clone(),
                price_feed.fetch_prices(ticker, fetch_start, end),
            )
        })
        .collect();

    let mut series = Vec::with_capacity(fetched.len());
    let mut missing = Vec::new();

    for (ticker, result) in fetched {
        let bars = match result {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                warn!("skipping {ticker}: no price data");
                missing.push(ticker);
                continue;
            }
            Err(e) => {
                warn!("skipping {ticker}: {e}");
                missing.push(ticker);
                continue;
            }
        };

        let s = TickerSeries::new(ticker.clone(), bars, lookback);
        match s.first_price_from(start) {
            Some(price) if reference.admits(&ticker, price) => series.push(s),
            Some(_) => debug!("{ticker} excluded by size-category filter"),
            None => {
                warn!("skipping {ticker}: no price data in range");
                missing.push(ticker);
            }
        }
    }

    let mut data = MarketData::assemble(series, signals, start, end)?;
    info!(
        "assembled {} tickers over {} trading dates ({} without data)",
        data.ticker_count(),
        data.trading_days(),
        missing.len()
    );
    data.missing_tickers = missing;
    Ok(data)
}
