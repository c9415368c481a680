//! Position sizing.
//!
//! Each date's firing candidates are sized against the cash available when
//! the entry pass starts. Equal weight splits the remaining cash evenly
//! across remaining slots at every decision. The weighted variants share a
//! pool of `cash * k / free_slots` (k = candidates selected for the date)
//! in proportion to signal strength or inverse trailing volatility, so a
//! date never commits more than equal weight would.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSizing {
    Equal,
    SignalWeighted,
    Volatility,
}

impl PositionSizing {
    pub const ALL: [PositionSizing; 3] = [
        PositionSizing::Equal,
        PositionSizing::SignalWeighted,
        PositionSizing::Volatility,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PositionSizing::Equal => "equal",
            PositionSizing::SignalWeighted => "signal_weighted",
            PositionSizing::Volatility => "volatility",
        }
    }

    /// Build the sizing plan for one date's ranked candidates.
    pub fn plan(self, available_cash: f64, free_slots: usize, ranked: &[Candidate]) -> AllocationPlan {
        let selected = free_slots.min(ranked.len());
        let pool = if free_slots > 0 {
            available_cash.max(0.0) * selected as f64 / free_slots as f64
        } else {
            0.0
        };

        let raw: Vec<f64> = match self {
            PositionSizing::Equal => vec![1.0; selected],
            PositionSizing::SignalWeighted => ranked[..selected]
                .iter()
                .map(|c| c.strength.abs())
                .collect(),
            PositionSizing::Volatility => inverse_volatility(&ranked[..selected]),
        };

        AllocationPlan {
            sizing: self,
            pool,
            weights: normalize(raw),
        }
    }
}

impl fmt::Display for PositionSizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSizing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" | "equal_weight" => Ok(PositionSizing::Equal),
            "signal_weighted" | "signal" => Ok(PositionSizing::SignalWeighted),
            "volatility" | "risk_parity" => Ok(PositionSizing::Volatility),
            other => Err(format!(
                "unknown position sizing '{other}' (expected equal, signal_weighted or volatility)"
            )),
        }
    }
}

/// A firing, priced, not-yet-held ticker on the current date.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ticker: String,
    pub signal_value: f64,
    pub strength: f64,
    pub price: f64,
    pub volatility: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    sizing: PositionSizing,
    pool: f64,
    weights: Vec<f64>,
}

impl AllocationPlan {
    pub fn selected(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, rank: usize) -> Option<f64> {
        self.weights.get(rank).copied()
    }

    /// Dollar budget for the candidate at `rank` given the cash and slots
    /// left at decision time. Candidates past the selection (reached only
    /// after a skip) fall back to an equal share.
    pub fn budget(&self, rank: usize, cash_now: f64, remaining_slots: usize) -> f64 {
        if remaining_slots == 0 || cash_now <= 0.0 {
            return 0.0;
        }
        let equal_share = cash_now / remaining_slots as f64;
        match (self.sizing, self.weight(rank)) {
            (PositionSizing::Equal, _) | (_, None) => equal_share,
            (_, Some(w)) => (self.pool * w).min(cash_now),
        }
    }
}

fn inverse_volatility(candidates: &[Candidate]) -> Vec<f64> {
    let inv: Vec<Option<f64>> = candidates
        .iter()
        .map(|c| match c.volatility {
            Some(v) if v > 0.0 && v.is_finite() => Some(1.0 / v),
            _ => None,
        })
        .collect();

    let known: Vec<f64> = inv.iter().flatten().copied().collect();
    let fallback = if known.is_empty() {
        1.0
    } else {
        known.iter().sum::<f64>() / known.len() as f64
    };

    inv.into_iter().map(|w| w.unwrap_or(fallback)).collect()
}

fn normalize(raw: Vec<f64>) -> Vec<f64> {
    let total: f64 = raw.iter().filter(|w| w.is_finite()).sum();
    if total <= 0.0 {
        let n = raw.len();
        return vec![1.0 / n.max(1) as f64; n];
    }
    raw.into_iter()
        .map(|w| if w.is_finite() { w / total } else { 0.0 })
        .collect()
}
