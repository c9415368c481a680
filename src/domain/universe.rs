//! Reference data for the instrument universe.
//!
//! Ticker list, outstanding share counts and market-cap size thresholds are
//! loaded once and shared by the simulator and every feed adapter.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LARGE_CAP_MIN: f64 = 10_000_000_000.0;
pub const DEFAULT_MID_CAP_MIN: f64 = 2_000_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Large,
    Mid,
    Small,
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SizeCategory::Large => "large",
            SizeCategory::Mid => "mid",
            SizeCategory::Small => "small",
        };
        f.write_str(s)
    }
}

impl FromStr for SizeCategory {
    type Err = UniverseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "large" => Ok(SizeCategory::Large),
            "mid" => Ok(SizeCategory::Mid),
            "small" => Ok(SizeCategory::Small),
            other => Err(UniverseError::UnknownCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("unknown size category: {0}")]
    UnknownCategory(String),
}

#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub tickers: Vec<String>,
    pub shares_outstanding: HashMap<String, f64>,
    pub large_cap_min: f64,
    pub mid_cap_min: f64,
    /// Empty means every category is kept.
    pub categories: Vec<SizeCategory>,
}

impl ReferenceData {
    pub fn new(tickers: Vec<String>) -> Self {
        Self {
            tickers,
            shares_outstanding: HashMap::new(),
            large_cap_min: DEFAULT_LARGE_CAP_MIN,
            mid_cap_min: DEFAULT_MID_CAP_MIN,
            categories: Vec::new(),
        }
    }

    pub fn with_shares(mut self, ticker: &str, shares: f64) -> Self {
        self.shares_outstanding
            .insert(ticker.to_uppercase(), shares);
        self
    }

    pub fn count(&self) -> usize {
        self.tickers.len()
    }

    pub fn market_cap(&self, ticker: &str, price: f64) -> Option<f64> {
        self.shares_outstanding
            .get(ticker)
            .map(|&shares| shares * price)
    }

    pub fn category(&self, ticker: &str, price: f64) -> Option<SizeCategory> {
        let cap = self.market_cap(ticker, price)?;
        Some(if cap >= self.large_cap_min {
            SizeCategory::Large
        } else if cap >= self.mid_cap_min {
            SizeCategory::Mid
        } else {
            SizeCategory::Small
        })
    }

    /// Whether a ticker passes the configured category filter at `price`.
    /// Tickers without a share count only pass an unfiltered universe.
    pub fn admits(&self, ticker: &str, price: f64) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        match self.category(ticker, price) {
            Some(cat) => self.categories.contains(&cat),
            None => false,
        }
    }
}

pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

pub fn parse_categories(input: &str) -> Result<Vec<SizeCategory>, UniverseError> {
    input
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}
