//! Signal-driven portfolio simulation.
//!
//! One pass over the trading-day timeline, strictly in date order. For each
//! date the loop exits positions that have reached the holding period,
//! ranks firing candidates, enters the strongest while slots and cash
//! allow, and snapshots equity. Decisions for a date only read data dated
//! on or before it.

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::cmp::Ordering;
use std::time::{Duration, Instant};

use super::allocation::{Candidate, PositionSizing};
use super::error::SigtraderError;
use super::execution::{ExecutionConfig, affordable_shares, buy_fill, sell_fill, whole_shares};
use super::ledger::{Trade, TradeLedger};
use super::market_data::{MarketData, load_market_data};
use super::metrics::{PerformanceAnalyzer, Stats, TickerResult, TradeMetrics, compute_per_ticker};
use super::portfolio::{EquityPoint, PortfolioState};
use super::position::Position;
use super::signal::{SignalCatalog, SignalDescriptor};
use super::universe::ReferenceData;
use super::volatility::DEFAULT_LOOKBACK;
use crate::ports::price_port::PriceFeed;
use crate::ports::signal_port::SignalFeed;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub signal_name: String,
    pub threshold: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub max_positions: usize,
    pub holding_period: usize,
    pub position_sizing: PositionSizing,
}

impl BacktestRequest {
    /// Reject malformed or inconsistent parameters before any state exists.
    pub fn validate(&self) -> Result<(), SigtraderError> {
        if self.signal_name.trim().is_empty() {
            return Err(SigtraderError::invalid("signal_name", "must not be empty"));
        }
        if self.end_date < self.start_date {
            return Err(SigtraderError::invalid(
                "end_date",
                format!(
                    "end_date {} is before start_date {}",
                    self.end_date, self.start_date
                ),
            ));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(SigtraderError::invalid("threshold", "must be positive"));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(SigtraderError::invalid(
                "initial_capital",
                "must be positive",
            ));
        }
        if self.max_positions == 0 {
            return Err(SigtraderError::invalid("max_positions", "must be at least 1"));
        }
        if self.holding_period == 0 {
            return Err(SigtraderError::invalid(
                "holding_period",
                "must be at least 1 trading day",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub execution: ExecutionConfig,
    pub risk_free_rate: f64,
    pub volatility_lookback: usize,
    /// Runs spanning more trading dates than this fail before the loop.
    pub max_trading_dates: Option<usize>,
    /// Wall-clock ceiling for a whole run, loading included.
    pub time_budget: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            execution: ExecutionConfig::default(),
            risk_free_rate: 0.0,
            volatility_lookback: DEFAULT_LOOKBACK,
            max_trading_dates: None,
            time_budget: None,
        }
    }
}

/// Non-fatal events encountered during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    /// Firing candidates passed over because they had no price that date.
    pub unpriced_candidates: usize,
    /// Exit attempts postponed because the due position had no price.
    pub deferred_exits: usize,
    /// Candidates skipped because their size was zero shares or exceeded cash.
    pub cash_skips: usize,
    pub tickers_without_data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResponse {
    pub stats: Stats,
    pub trade_metrics: TradeMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub active_positions: Vec<Position>,
    pub ticker_results: Vec<TickerResult>,
    pub diagnostics: RunDiagnostics,
}

/// Wall-clock guard for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    budget: Option<Duration>,
}

impl RunClock {
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn check(&self) -> Result<(), SigtraderError> {
        match self.budget {
            Some(budget) if self.started.elapsed() > budget => {
                Err(SigtraderError::TimeBudgetExceeded {
                    elapsed_ms: self.started.elapsed().as_millis(),
                    budget_ms: budget.as_millis(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Wires the feeds, reference data and signal catalog into runnable backtests.
pub struct Backtester<'a> {
    pub catalog: &'a SignalCatalog,
    pub signal_feed: &'a dyn SignalFeed,
    pub price_feed: &'a dyn PriceFeed,
    pub reference: &'a ReferenceData,
    pub config: SimulationConfig,
}

impl Backtester<'_> {
    pub fn run(&self, request: &BacktestRequest) -> Result<BacktestResponse, SigtraderError> {
        request.validate()?;
        let descriptor = self.catalog.resolve(&request.signal_name)?;
        let clock = RunClock::start(self.config.time_budget);

        let market = load_market_data(
            self.signal_feed,
            self.price_feed,
            self.reference,
            &descriptor.name,
            request.start_date,
            request.end_date,
            self.config.volatility_lookback,
        )?;
        clock.check()?;

        simulate(request, descriptor, &market, &self.config, &clock)
    }
}

/// Run the simulation over already-assembled market data.
pub fn run_backtest(
    request: &BacktestRequest,
    descriptor: &SignalDescriptor,
    market: &MarketData,
    config: &SimulationConfig,
) -> Result<BacktestResponse, SigtraderError> {
    request.validate()?;
    let clock = RunClock::start(config.time_budget);
    simulate(request, descriptor, market, config, &clock)
}

fn simulate(
    request: &BacktestRequest,
    descriptor: &SignalDescriptor,
    market: &MarketData,
    config: &SimulationConfig,
    clock: &RunClock,
) -> Result<BacktestResponse, SigtraderError> {
    if market.timeline.is_empty() {
        return Err(SigtraderError::NoCommonRange {
            start: request.start_date,
            end: request.end_date,
        });
    }
    if let Some(limit) = config.max_trading_dates {
        if market.trading_days() > limit {
            return Err(SigtraderError::RangeTooLarge {
                dates: market.trading_days(),
                limit,
            });
        }
    }

    info!(
        "simulating '{}' ({}) threshold {} over {} dates, {} tickers, sizing {}",
        descriptor.name,
        descriptor.polarity,
        request.threshold,
        market.trading_days(),
        market.ticker_count(),
        request.position_sizing
    );

    let mut state = PortfolioState::new(request.initial_capital, request.max_positions);
    let mut ledger = TradeLedger::new();
    let mut diagnostics = RunDiagnostics {
        tickers_without_data: market.missing_tickers.clone(),
        ..RunDiagnostics::default()
    };

    for (day, &date) in market.timeline.iter().enumerate() {
        clock.check()?;

        for ticker in state.book.tickers() {
            if let Some(price) = market.price(&ticker, date) {
                state.book.mark(&ticker, price);
            }
        }

        exit_pass(&mut state, &mut ledger, &mut diagnostics, market, request, config, date, day);

        let ranked = rank_candidates(&state, &mut diagnostics, market, descriptor, request, date);

        entry_pass(&mut state, &mut ledger, &mut diagnostics, request, config, &ranked, date, day);

        state.record_equity(date);
        debug_assert!(
            (state.cash + state.book.invested() - request.initial_capital - ledger.realized_pnl())
                .abs()
                <= 1e-6 * request.initial_capital.max(1.0),
            "cash no longer reconciles with entry values on {date}"
        );
    }

    let analyzer = PerformanceAnalyzer::new(config.risk_free_rate);
    let analysis = analyzer.analyze(request.initial_capital, &state.equity_curve, ledger.all());
    let ticker_results = compute_per_ticker(ledger.all());

    let unrealized: f64 = state.book.iter().map(Position::unrealized_pnl).sum();
    info!(
        "finished: {} trades, {} round trips, {} open at end (unrealized {:.2}), final value {:.2}",
        ledger.len(),
        analysis.trade_metrics.total_trades,
        state.book.open_count(),
        unrealized,
        analysis.stats.final_value
    );

    Ok(BacktestResponse {
        stats: analysis.stats,
        trade_metrics: analysis.trade_metrics,
        equity_curve: state.equity_curve,
        trades: ledger.into_trades(),
        active_positions: state.book.into_open_positions(),
        ticker_results,
        diagnostics,
    })
}

#[allow(clippy::too_many_arguments)]
fn exit_pass(
    state: &mut PortfolioState,
    ledger: &mut TradeLedger,
    diagnostics: &mut RunDiagnostics,
    market: &MarketData,
    request: &BacktestRequest,
    config: &SimulationConfig,
    date: NaiveDate,
    day: usize,
) {
    let due = state
        .book
        .iter()
        .filter(|p| p.is_due(day, request.holding_period))
        .count();
    if due == 0 {
        return;
    }

    let closed = state
        .book
        .close_due(date, day, request.holding_period, |pos| {
            market
                .price(&pos.ticker, date)
                .map(|price| sell_fill(price, pos.shares, &config.execution))
        });

    diagnostics.deferred_exits += due - closed.len();

    for pos in closed {
        let pnl = pos.pnl.unwrap_or(0.0);
        state.cash += pos.entry_value + pnl;
        let held = pos.holding_days(day);
        debug!(
            "{date} SELL {} x{} @ {:.4} pnl {:.2} after {held} days",
            pos.ticker,
            pos.shares,
            pos.exit_price.unwrap_or(pos.last_price),
            pnl
        );
        ledger.record_sell(&pos, held);
    }
}

/// Firing, priced, unheld tickers for `date`, strongest first. Ties break
/// on ticker so runs are reproducible.
fn rank_candidates(
    state: &PortfolioState,
    diagnostics: &mut RunDiagnostics,
    market: &MarketData,
    descriptor: &SignalDescriptor,
    request: &BacktestRequest,
    date: NaiveDate,
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = Vec::new();

    for (ticker, value) in market.signals_on(date) {
        if state.book.holds(ticker) || !descriptor.fires(*value, request.threshold) {
            continue;
        }
        let Some(price) = market.price(ticker, date) else {
            diagnostics.unpriced_candidates += 1;
            continue;
        };
        ranked.push(Candidate {
            ticker: ticker.clone(),
            signal_value: *value,
            strength: descriptor.strength(*value),
            price,
            volatility: market.volatility(ticker, date),
        });
    }

    ranked.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    ranked
}

#[allow(clippy::too_many_arguments)]
fn entry_pass(
    state: &mut PortfolioState,
    ledger: &mut TradeLedger,
    diagnostics: &mut RunDiagnostics,
    request: &BacktestRequest,
    config: &SimulationConfig,
    ranked: &[Candidate],
    date: NaiveDate,
    day: usize,
) {
    if ranked.is_empty() || state.book.is_full() {
        return;
    }

    let plan = request
        .position_sizing
        .plan(state.cash, state.book.free_slots(), ranked);
    debug!(
        "{date} sizing {} of {} candidates ({})",
        plan.selected(),
        ranked.len(),
        request.position_sizing
    );

    for (rank, candidate) in ranked.iter().enumerate() {
        if state.book.is_full() {
            break;
        }

        let budget = plan.budget(rank, state.cash, state.book.free_slots());
        let sized = whole_shares(budget, candidate.price, &config.execution);
        let shares = affordable_shares(sized, candidate.price, state.cash, &config.execution);
        if shares <= 0 {
            diagnostics.cash_skips += 1;
            debug!(
                "{date} skip {}: budget {budget:.2} of cash {:.2} buys no shares",
                candidate.ticker, state.cash
            );
            continue;
        }

        let fill = buy_fill(candidate.price, shares, &config.execution);
        let position = Position::open(
            &candidate.ticker,
            date,
            day,
            fill.price,
            shares,
            fill.net_value,
            candidate.signal_value,
        );
        if !state.book.try_open(position.clone()) {
            warn!("{date} could not open {}: book full or ticker held", candidate.ticker);
            continue;
        }
        ledger.record_buy(&position);
        debug!(
            "{date} BUY {} x{shares} @ {:.4} (signal {:.4})",
            candidate.ticker, fill.price, candidate.signal_value
        );
        state.cash -= fill.net_value;
    }
}
