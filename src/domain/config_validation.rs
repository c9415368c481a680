//! Configuration validation and construction of run inputs.
//!
//! Every key is checked before a run starts so a bad file never leaves a
//! half-built simulation behind.

use crate::domain::allocation::PositionSizing;
use crate::domain::error::SigtraderError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::signal::{SignalCatalog, SignalDescriptor, SignalPolarity};
use crate::domain::simulation::{BacktestRequest, SimulationConfig};
use crate::domain::universe::{
    DEFAULT_LARGE_CAP_MIN, DEFAULT_MID_CAP_MIN, ReferenceData, parse_categories, parse_tickers,
};
use crate::domain::volatility::DEFAULT_LOOKBACK;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::time::Duration;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    validate_signal(config)?;
    validate_threshold(config)?;
    validate_dates(config)?;
    validate_initial_capital(config)?;
    validate_slots(config)?;
    validate_sizing(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_risk_free_rate(config)?;
    validate_budgets(config)?;
    validate_data_source(config)?;
    validate_universe(config)?;
    validate_shares(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SigtraderError {
    SigtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> SigtraderError {
    SigtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn require_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SigtraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(section, key)),
    }
}

fn validate_signal(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let name = require_string(config, "backtest", "signal")?;
    let catalog = catalog_from_config(config)?;
    if catalog.get(&name).is_none() {
        return Err(invalid(
            "backtest",
            "signal",
            format!("unknown signal '{name}'"),
        ));
    }
    Ok(())
}

fn validate_threshold(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    require_string(config, "backtest", "threshold")?;
    let value = config.get_double("backtest", "threshold", f64::NAN);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid("backtest", "threshold", "threshold must be positive"));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let start_date = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, SigtraderError> {
    match value {
        None => Err(missing("backtest", field)),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_slots(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    if config.get_int("backtest", "max_positions", 0) < 1 {
        return Err(invalid(
            "backtest",
            "max_positions",
            "max_positions must be at least 1",
        ));
    }
    if config.get_int("backtest", "holding_period", 0) < 1 {
        return Err(invalid(
            "backtest",
            "holding_period",
            "holding_period must be at least 1 trading day",
        ));
    }
    Ok(())
}

fn validate_sizing(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    sizing_from_config(config).map(|_| ())
}

fn sizing_from_config(config: &dyn ConfigPort) -> Result<PositionSizing, SigtraderError> {
    match config.get_string("backtest", "position_sizing") {
        None => Ok(PositionSizing::Equal),
        Some(s) => s
            .parse()
            .map_err(|reason: String| invalid("backtest", "position_sizing", reason)),
    }
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    for key in ["commission_per_trade", "commission_pct"] {
        let value = config.get_double("backtest", key, 0.0);
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(
                "backtest",
                key,
                format!("{key} must be a finite non-negative number"),
            ));
        }
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let value = config.get_double("backtest", "slippage_pct", 0.0);
    if !(0.0..100.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "slippage_pct",
            "slippage_pct must be between 0 and 100",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_budgets(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    if config.get_int("backtest", "volatility_lookback", DEFAULT_LOOKBACK as i64) < 2 {
        return Err(invalid(
            "backtest",
            "volatility_lookback",
            "volatility_lookback must be at least 2",
        ));
    }
    if config.get_int("backtest", "max_trading_dates", 0) < 0 {
        return Err(invalid(
            "backtest",
            "max_trading_dates",
            "max_trading_dates must be non-negative (0 disables the limit)",
        ));
    }
    let budget_secs = config.get_double("backtest", "time_budget_secs", 0.0);
    if budget_secs < 0.0 || Duration::try_from_secs_f64(budget_secs).is_err() {
        return Err(invalid(
            "backtest",
            "time_budget_secs",
            "time_budget_secs must be a finite non-negative number of seconds (0 disables the limit)",
        ));
    }
    Ok(())
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim().to_lowercase().as_str() {
        "csv" => {
            require_string(config, "data", "prices_dir")?;
            require_string(config, "data", "signals_dir")?;
            Ok(())
        }
        "sqlite" => {
            require_string(config, "sqlite", "path")?;
            if config.get_int("sqlite", "pool_size", 4) < 1 {
                return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
            }
            Ok(())
        }
        other => Err(invalid(
            "data",
            "source",
            format!("unknown data source '{other}' (expected csv or sqlite)"),
        )),
    }
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    reference_data_from_config(config).map(|_| ())
}

fn validate_shares(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    for key in config.get_keys("shares") {
        let value = config.get_double("shares", &key, f64::NAN);
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid("shares", &key, "share count must be positive"));
        }
    }
    Ok(())
}

/// Built-in catalog extended by the `[signals]` section.
pub fn catalog_from_config(config: &dyn ConfigPort) -> Result<SignalCatalog, SigtraderError> {
    let mut catalog = SignalCatalog::builtin();
    for key in config.get_keys("signals") {
        let raw = config.get_string("signals", &key).unwrap_or_default();
        let polarity: SignalPolarity = raw
            .parse()
            .map_err(|reason: String| invalid("signals", &key, reason))?;
        catalog.register(SignalDescriptor::new(&key, polarity, ""));
    }
    Ok(catalog)
}

pub fn reference_data_from_config(config: &dyn ConfigPort) -> Result<ReferenceData, SigtraderError> {
    let raw = require_string(config, "universe", "tickers")?;
    let tickers =
        parse_tickers(&raw).map_err(|e| invalid("universe", "tickers", e.to_string()))?;

    let mut reference = ReferenceData::new(tickers);
    if let Some(raw) = config.get_string("universe", "categories") {
        reference.categories = parse_categories(&raw)
            .map_err(|e| invalid("universe", "categories", e.to_string()))?;
    }
    reference.large_cap_min = config.get_double("universe", "large_cap_min", DEFAULT_LARGE_CAP_MIN);
    reference.mid_cap_min = config.get_double("universe", "mid_cap_min", DEFAULT_MID_CAP_MIN);
    if reference.mid_cap_min <= 0.0 || reference.mid_cap_min > reference.large_cap_min {
        return Err(invalid(
            "universe",
            "mid_cap_min",
            "mid_cap_min must be positive and not above large_cap_min",
        ));
    }

    for key in config.get_keys("shares") {
        let shares = config.get_double("shares", &key, 0.0);
        if shares > 0.0 {
            reference = reference.with_shares(&key, shares);
        }
    }
    Ok(reference)
}

pub fn request_from_config(config: &dyn ConfigPort) -> Result<BacktestRequest, SigtraderError> {
    let start_date = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;

    Ok(BacktestRequest {
        signal_name: require_string(config, "backtest", "signal")?,
        threshold: config.get_double("backtest", "threshold", 0.0),
        start_date,
        end_date,
        initial_capital: config.get_double("backtest", "initial_capital", 0.0),
        max_positions: config.get_int("backtest", "max_positions", 0).max(0) as usize,
        holding_period: config.get_int("backtest", "holding_period", 0).max(0) as usize,
        position_sizing: sizing_from_config(config)?,
    })
}

pub fn simulation_config_from(config: &dyn ConfigPort) -> SimulationConfig {
    let max_dates = config.get_int("backtest", "max_trading_dates", 0);
    let budget_secs = config.get_double("backtest", "time_budget_secs", 0.0);

    SimulationConfig {
        execution: ExecutionConfig {
            commission_per_trade: config.get_double("backtest", "commission_per_trade", 0.0),
            commission_pct: config.get_double("backtest", "commission_pct", 0.0),
            slippage_pct: config.get_double("backtest", "slippage_pct", 0.0),
        },
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        volatility_lookback: config
            .get_int("backtest", "volatility_lookback", DEFAULT_LOOKBACK as i64)
            .max(2) as usize,
        max_trading_dates: (max_dates > 0).then_some(max_dates as usize),
        time_budget: Duration::try_from_secs_f64(budget_secs)
            .ok()
            .filter(|d| !d.is_zero()),
    }
}
