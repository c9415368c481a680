//! Performance statistics derived from a completed run.
//!
//! Every reported figure is finite: degenerate inputs (flat curves, no
//! trades, zero denominators) resolve to 0, and a profit factor with no
//! losing trades is reported as `None`.

use serde::Serialize;
use std::collections::BTreeMap;

use super::ledger::{Trade, TradeType};
use super::portfolio::EquityPoint;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub initial_capital: f64,
    pub final_value: f64,
    /// Percent.
    pub total_return: f64,
    /// Percent.
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Percent of the running peak.
    pub max_drawdown: f64,
    /// Longest run of trading days spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub trading_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent.
    pub win_rate: f64,
    /// `None` when there are no losing trades.
    pub profit_factor: Option<f64>,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub avg_trade_size: f64,
    pub avg_holding_days: f64,
    pub avg_return_pct: f64,
    pub best_trade: Option<Trade>,
    pub worst_trade: Option<Trade>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerResult {
    pub ticker: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub stats: Stats,
    pub trade_metrics: TradeMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceAnalyzer {
    /// Annual rate as a fraction, subtracted from daily returns for the
    /// Sharpe and Sortino ratios.
    pub risk_free_rate: f64,
}

impl PerformanceAnalyzer {
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub fn analyze(
        &self,
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[Trade],
    ) -> Analysis {
        Analysis {
            stats: self.compute_stats(initial_capital, equity_curve),
            trade_metrics: compute_trade_metrics(trades),
        }
    }

    fn compute_stats(&self, initial_capital: f64, equity_curve: &[EquityPoint]) -> Stats {
        let final_value = equity_curve
            .last()
            .map(|p| p.portfolio_value)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_value - initial_capital) / initial_capital * 100.0
        } else {
            0.0
        };

        let trading_days = equity_curve.len();
        let annualized_return = annualize(initial_capital, final_value, trading_days);

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let daily_rf = self.risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, daily_rf);

        Stats {
            initial_capital,
            final_value: finite_or_zero(final_value),
            total_return: finite_or_zero(total_return),
            annualized_return: finite_or_zero(annualized_return),
            sharpe_ratio: finite_or_zero(sharpe_ratio),
            sortino_ratio: finite_or_zero(sortino_ratio),
            max_drawdown: finite_or_zero(max_drawdown * 100.0),
            max_drawdown_duration,
            trading_days,
        }
    }
}

/// ((final / initial)^(252 / days) - 1) * 100
fn annualize(initial_capital: f64, final_value: f64, trading_days: usize) -> f64 {
    if trading_days == 0 || initial_capital <= 0.0 {
        return 0.0;
    }
    if final_value <= 0.0 {
        return -100.0;
    }
    let growth = final_value / initial_capital;
    (growth.powf(TRADING_DAYS_PER_YEAR / trading_days as f64) - 1.0) * 100.0
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Max drawdown as a fraction of the running peak, and its longest duration.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.portfolio_value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for point in equity_curve {
        let value = point.portfolio_value;
        if value >= peak {
            peak = value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - value) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].portfolio_value;
            let curr = w[1].portfolio_value;
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect()
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    let returns = daily_returns(equity_curve);
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    // a flat curve can leave rounding noise in the variance
    let sharpe = if stddev > 1e-12 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 1e-12 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

pub fn compute_trade_metrics(trades: &[Trade]) -> TradeMetrics {
    let sells: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.trade_type == TradeType::Sell)
        .collect();

    let mut winning_trades = 0usize;
    let mut losing_trades = 0usize;
    let mut gross_profit = 0.0_f64;
    let mut gross_loss = 0.0_f64;
    let mut best: Option<&Trade> = None;
    let mut worst: Option<&Trade> = None;

    for &trade in &sells {
        let pnl = trade.pnl.unwrap_or(0.0);
        if pnl > 0.0 {
            winning_trades += 1;
            gross_profit += pnl;
        } else if pnl < 0.0 {
            losing_trades += 1;
            gross_loss += pnl.abs();
        }

        if best.is_none_or(|b| pnl > b.pnl.unwrap_or(0.0)) {
            best = Some(trade);
        }
        if worst.is_none_or(|w| pnl < w.pnl.unwrap_or(0.0)) {
            worst = Some(trade);
        }
    }

    let total_trades = sells.len();
    let win_rate = ratio(winning_trades as f64, total_trades as f64) * 100.0;
    let profit_factor = if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else {
        None
    };

    let buy_values: Vec<f64> = trades
        .iter()
        .filter(|t| t.trade_type == TradeType::Buy)
        .map(|t| t.value)
        .collect();
    let avg_trade_size = mean(&buy_values);

    let holding: Vec<f64> = sells
        .iter()
        .filter_map(|t| t.holding_days.map(|d| d as f64))
        .collect();
    let returns: Vec<f64> = sells.iter().filter_map(|t| t.return_pct).collect();

    TradeMetrics {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        profit_factor: profit_factor.filter(|v| v.is_finite()),
        gross_profit,
        gross_loss,
        avg_trade_size,
        avg_holding_days: mean(&holding),
        avg_return_pct: mean(&returns),
        best_trade: best.cloned(),
        worst_trade: worst.cloned(),
    }
}

/// Round-trip summary per ticker, ordered by ticker.
pub fn compute_per_ticker(trades: &[Trade]) -> Vec<TickerResult> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for trade in trades.iter().filter(|t| t.trade_type == TradeType::Sell) {
        grouped
            .entry(trade.ticker.as_str())
            .or_default()
            .push(trade.pnl.unwrap_or(0.0));
    }

    grouped
        .into_iter()
        .map(|(ticker, pnls)| {
            let winning_trades = pnls.iter().filter(|&&p| p > 0.0).count();
            TickerResult {
                ticker: ticker.to_string(),
                total_trades: pnls.len(),
                winning_trades,
                win_rate: ratio(winning_trades as f64, pnls.len() as f64) * 100.0,
                total_pnl: pnls.iter().sum(),
            }
        })
        .collect()
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                portfolio_value: v,
                num_positions: 0,
                cash: v,
            })
            .collect()
    }

    fn make_trade(id: u64, ticker: &str, trade_type: TradeType, pnl: Option<f64>) -> Trade {
        Trade {
            id,
            trade_type,
            ticker: ticker.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            price: 100.0,
            shares: 10,
            value: 1000.0,
            commission: 0.0,
            signal_value: 2.0,
            pnl,
            return_pct: pnl.map(|p| p / 10.0),
            holding_days: pnl.map(|_| 5),
        }
    }

    fn round_trips(pnls: &[f64]) -> Vec<Trade> {
        let mut trades = Vec::new();
        for (i, &pnl) in pnls.iter().enumerate() {
            let ticker = format!("T{i}");
            trades.push(make_trade(2 * i as u64 + 1, &ticker, TradeType::Buy, None));
            trades.push(make_trade(2 * i as u64 + 2, &ticker, TradeType::Sell, Some(pnl)));
        }
        trades
    }

    #[test]
    fn empty_run_is_neutral() {
        let analysis = PerformanceAnalyzer::default().analyze(100_000.0, &[], &[]);
        assert_relative_eq!(analysis.stats.final_value, 100_000.0);
        assert_relative_eq!(analysis.stats.total_return, 0.0);
        assert_relative_eq!(analysis.stats.annualized_return, 0.0);
        assert_eq!(analysis.trade_metrics.total_trades, 0);
        assert!(analysis.trade_metrics.profit_factor.is_none());
        assert!(analysis.trade_metrics.best_trade.is_none());
    }

    #[test]
    fn total_return_in_percent() {
        let curve = make_equity_curve(&[100_000.0, 110_000.0]);
        let stats = PerformanceAnalyzer::default().analyze(100_000.0, &curve, &[]).stats;
        assert_relative_eq!(stats.total_return, 10.0, epsilon = 1e-9);
        assert_relative_eq!(stats.final_value, 110_000.0);
    }

    #[test]
    fn annualized_return_over_a_year_equals_total() {
        let mut values = vec![100_000.0; 251];
        values.push(110_000.0);
        let curve = make_equity_curve(&values);
        let stats = PerformanceAnalyzer::default().analyze(100_000.0, &curve, &[]).stats;
        assert_relative_eq!(stats.annualized_return, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn annualized_return_wiped_out() {
        assert_relative_eq!(annualize(100.0, 0.0, 10), -100.0);
        assert_relative_eq!(annualize(100.0, 50.0, 0), 0.0);
    }

    #[test]
    fn flat_curve_has_zero_sharpe_and_drawdown() {
        let curve = make_equity_curve(&[100_000.0; 30]);
        let stats = PerformanceAnalyzer::default().analyze(100_000.0, &curve, &[]).stats;
        assert_eq!(stats.sharpe_ratio, 0.0);
        assert_eq!(stats.sortino_ratio, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert_eq!(stats.max_drawdown_duration, 0);
    }

    #[test]
    fn max_drawdown_percent_of_peak() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let stats = PerformanceAnalyzer::default().analyze(100.0, &curve, &[]).stats;
        assert_relative_eq!(stats.max_drawdown, (110.0 - 80.0) / 110.0 * 100.0, epsilon = 1e-9);
        assert_eq!(stats.max_drawdown_duration, 4);
    }

    #[test]
    fn sharpe_positive_for_rising_curve() {
        let values: Vec<f64> = (0..60)
            .map(|i| 100_000.0 * (1.0 + 0.001 * i as f64 + 0.0005 * (i % 3) as f64))
            .collect();
        let curve = make_equity_curve(&values);
        let stats = PerformanceAnalyzer::default().analyze(100_000.0, &curve, &[]).stats;
        assert!(stats.sharpe_ratio > 0.0);
        assert!(stats.sharpe_ratio.is_finite());
    }

    #[test]
    fn sharpe_matches_formula() {
        let curve = make_equity_curve(&[100.0, 101.0, 100.0, 102.0]);
        let rets = [0.01, -1.0 / 101.0, 0.02];
        let mean = rets.iter().sum::<f64>() / 3.0;
        let sd = (rets.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0).sqrt();
        let stats = PerformanceAnalyzer::default().analyze(100.0, &curve, &[]).stats;
        assert_relative_eq!(stats.sharpe_ratio, mean / sd * 252f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn trade_metrics_count_only_sells() {
        let trades = round_trips(&[100.0, -50.0, 200.0, 0.0]);
        let m = compute_trade_metrics(&trades);
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert_relative_eq!(m.win_rate, 50.0);
        assert_relative_eq!(m.avg_trade_size, 1000.0);
        assert_relative_eq!(m.avg_holding_days, 5.0);
    }

    #[test]
    fn profit_factor_gross_ratio() {
        let m = compute_trade_metrics(&round_trips(&[100.0, -50.0, 200.0]));
        assert_relative_eq!(m.profit_factor.unwrap(), 6.0, epsilon = 1e-9);
        assert_relative_eq!(m.gross_profit, 300.0);
        assert_relative_eq!(m.gross_loss, 50.0);
    }

    #[test]
    fn profit_factor_none_without_losses() {
        let m = compute_trade_metrics(&round_trips(&[100.0, 20.0]));
        assert!(m.profit_factor.is_none());
        let json = serde_json::to_value(&m).unwrap();
        assert!(json["profitFactor"].is_null());
    }

    #[test]
    fn best_and_worst_trades() {
        let m = compute_trade_metrics(&round_trips(&[100.0, 300.0, -50.0, -150.0]));
        assert_eq!(m.best_trade.unwrap().ticker, "T1");
        assert_eq!(m.worst_trade.unwrap().ticker, "T3");
    }

    #[test]
    fn per_ticker_groups_sells() {
        let mut trades = round_trips(&[100.0, -40.0]);
        trades.push(make_trade(9, "T0", TradeType::Buy, None));
        trades.push(make_trade(10, "T0", TradeType::Sell, Some(-20.0)));

        let results = compute_per_ticker(&trades);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].ticker, "T0");
        assert_eq!(results[0].total_trades, 2);
        assert_relative_eq!(results[0].total_pnl, 80.0);
        assert_relative_eq!(results[0].win_rate, 50.0);
        assert_eq!(results[1].winning_trades, 0);
    }
}
