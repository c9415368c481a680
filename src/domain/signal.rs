//! Signal records and per-signal firing metadata.
//!
//! Whether a high value of a signal is a buy trigger, a low value is, or
//! either extreme is, differs per signal. That direction is carried
//! explicitly by a [`SignalDescriptor`] rather than inferred by callers.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::SigtraderError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPolarity {
    /// Fires when value > threshold.
    Positive,
    /// Fires when value < -threshold.
    Negative,
    /// Fires when |value| > threshold.
    Absolute,
}

impl SignalPolarity {
    pub fn fires(self, value: f64, threshold: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            SignalPolarity::Positive => value > threshold,
            SignalPolarity::Negative => value < -threshold,
            SignalPolarity::Absolute => value.abs() > threshold,
        }
    }

    /// Ranking key; larger means a stronger firing.
    pub fn strength(self, value: f64) -> f64 {
        match self {
            SignalPolarity::Positive => value,
            SignalPolarity::Negative => -value,
            SignalPolarity::Absolute => value.abs(),
        }
    }
}

impl fmt::Display for SignalPolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalPolarity::Positive => "positive",
            SignalPolarity::Negative => "negative",
            SignalPolarity::Absolute => "absolute",
        };
        f.write_str(s)
    }
}

impl FromStr for SignalPolarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "above" => Ok(SignalPolarity::Positive),
            "negative" | "below" => Ok(SignalPolarity::Negative),
            "absolute" | "abs" => Ok(SignalPolarity::Absolute),
            other => Err(format!(
                "unknown polarity '{other}' (expected positive, negative or absolute)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDescriptor {
    pub name: String,
    pub polarity: SignalPolarity,
    pub description: String,
}

impl SignalDescriptor {
    pub fn new(name: &str, polarity: SignalPolarity, description: &str) -> Self {
        Self {
            name: name.to_string(),
            polarity,
            description: description.to_string(),
        }
    }

    pub fn fires(&self, value: f64, threshold: f64) -> bool {
        self.polarity.fires(value, threshold)
    }

    pub fn strength(&self, value: f64) -> f64 {
        self.polarity.strength(value)
    }
}

/// Known signals keyed by lower-case name.
#[derive(Debug, Clone, Default)]
pub struct SignalCatalog {
    descriptors: BTreeMap<String, SignalDescriptor>,
}

impl SignalCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The composite indicator family computed upstream.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(SignalDescriptor::new(
            "sentiment",
            SignalPolarity::Positive,
            "Composite sentiment z-score; higher is risk-on",
        ));
        catalog.register(SignalDescriptor::new(
            "dispersion",
            SignalPolarity::Absolute,
            "Cross-sectional return dispersion vs. its history",
        ));
        catalog.register(SignalDescriptor::new(
            "liquidity",
            SignalPolarity::Positive,
            "Liquidity breadth robust z-score",
        ));
        catalog.register(SignalDescriptor::new(
            "turnover",
            SignalPolarity::Positive,
            "Turnover breadth relative to shares outstanding",
        ));
        catalog.register(SignalDescriptor::new(
            "asymmetry",
            SignalPolarity::Absolute,
            "Up/down volume asymmetry",
        ));
        catalog.register(SignalDescriptor::new(
            "rotation",
            SignalPolarity::Absolute,
            "Size-category rotation strength",
        ));
        catalog.register(SignalDescriptor::new(
            "volatility_divergence",
            SignalPolarity::Negative,
            "Realized vs. implied volatility divergence; higher is risk-off",
        ));
        catalog
    }

    pub fn register(&mut self, descriptor: SignalDescriptor) {
        self.descriptors
            .insert(descriptor.name.to_lowercase(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&SignalDescriptor> {
        self.descriptors.get(&name.trim().to_lowercase())
    }

    pub fn resolve(&self, name: &str) -> Result<&SignalDescriptor, SigtraderError> {
        self.get(name).ok_or_else(|| SigtraderError::UnknownSignal {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
