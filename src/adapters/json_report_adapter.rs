//! JSON report adapter implementing ReportPort.
//!
//! The report is the backtest response with the request echoed and a
//! compounded monthly return table added. The trade ledger can also be
//! exported as CSV.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::domain::error::SigtraderError;
use crate::domain::ledger::Trade;
use crate::domain::portfolio::EquityPoint;
use crate::domain::simulation::{BacktestRequest, BacktestResponse};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    /// Percent, compounded from daily returns.
    pub return_pct: f64,
}

pub fn compute_monthly_returns(equity_curve: &[EquityPoint]) -> Vec<MonthlyReturn> {
    let mut log_growth: BTreeMap<(i32, u32), f64> = BTreeMap::new();

    for window in equity_curve.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        if prev.portfolio_value <= 0.0 || curr.portfolio_value <= 0.0 {
            continue;
        }
        let key = (curr.date.year(), curr.date.month());
        *log_growth.entry(key).or_default() += (curr.portfolio_value / prev.portfolio_value).ln();
    }

    log_growth
        .into_iter()
        .map(|((year, month), ln)| MonthlyReturn {
            year,
            month,
            return_pct: (ln.exp() - 1.0) * 100.0,
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument<'a> {
    request: &'a BacktestRequest,
    #[serde(flatten)]
    response: &'a BacktestResponse,
    monthly_returns: Vec<MonthlyReturn>,
}

/// Flat ledger row; every column present so the CSV stays rectangular.
#[derive(Serialize)]
struct TradeRow<'a> {
    id: u64,
    #[serde(rename = "type")]
    trade_type: String,
    ticker: &'a str,
    date: NaiveDate,
    price: f64,
    shares: i64,
    value: f64,
    signal_value: f64,
    pnl: Option<f64>,
    return_pct: Option<f64>,
    holding_days: Option<usize>,
    commission: f64,
}

impl<'a> From<&'a Trade> for TradeRow<'a> {
    fn from(t: &'a Trade) -> Self {
        TradeRow {
            id: t.id,
            trade_type: t.trade_type.to_string(),
            ticker: &t.ticker,
            date: t.date,
            price: t.price,
            shares: t.shares,
            value: t.value,
            signal_value: t.signal_value,
            pnl: t.pnl,
            return_pct: t.return_pct,
            holding_days: t.holding_days,
            commission: t.commission,
        }
    }
}

pub struct JsonReportAdapter {
    pretty: bool,
}

impl JsonReportAdapter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn render(
        &self,
        response: &BacktestResponse,
        request: &BacktestRequest,
    ) -> Result<String, SigtraderError> {
        let doc = ReportDocument {
            request,
            response,
            monthly_returns: compute_monthly_returns(&response.equity_curve),
        };
        let json = if self.pretty {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        Ok(json)
    }

    pub fn write_trades_csv(&self, trades: &[Trade], output_path: &str) -> Result<(), SigtraderError> {
        ensure_parent(output_path)?;
        let mut writer = csv::Writer::from_path(output_path).map_err(|e| SigtraderError::DataSource {
            reason: format!("failed to create {output_path}: {e}"),
        })?;
        for trade in trades {
            writer
                .serialize(TradeRow::from(trade))
                .map_err(|e| SigtraderError::DataSource {
                    reason: format!("failed to write trade {}: {e}", trade.id),
                })?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new(true)
    }
}

fn ensure_parent(output_path: &str) -> Result<(), SigtraderError> {
    if let Some(parent) = Path::new(output_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        response: &BacktestResponse,
        request: &BacktestRequest,
        output_path: &str,
    ) -> Result<(), SigtraderError> {
        let json = self.render(response, request)?;
        ensure_parent(output_path)?;
        fs::write(output_path, json)?;
        Ok(())
    }
}
