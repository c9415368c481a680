//! Property tests for simulation invariants over random markets.
//!
//! Every generated ticker is priced on every date, so exits are never
//! deferred and each round trip spans exactly the holding period.

mod common;

use common::*;
use proptest::prelude::*;
use sigtrader::domain::allocation::PositionSizing;
use sigtrader::domain::execution::ExecutionConfig;
use sigtrader::domain::simulation::{BacktestRequest, BacktestResponse, SimulationConfig};

const TICKERS: [&str; 5] = ["AA", "BB", "CC", "DD", "EE"];

#[derive(Debug, Clone)]
struct Market {
    closes: Vec<Vec<f64>>,
    signals: Vec<Vec<f64>>,
}

fn arb_market() -> impl Strategy<Value = Market> {
    (1usize..=5, 5usize..=30).prop_flat_map(|(tickers, days)| {
        (
            prop::collection::vec(prop::collection::vec(1.0..200.0_f64, days), tickers),
            prop::collection::vec(prop::collection::vec(-5.0..5.0_f64, days), tickers),
        )
            .prop_map(|(closes, signals)| Market { closes, signals })
    })
}

fn arb_sizing() -> impl Strategy<Value = PositionSizing> {
    prop::sample::select(PositionSizing::ALL.to_vec())
}

fn arb_execution() -> impl Strategy<Value = ExecutionConfig> {
    (0.0..10.0_f64, 0.0..0.5_f64, 0.0..1.0_f64).prop_map(
        |(commission_per_trade, commission_pct, slippage_pct)| ExecutionConfig {
            commission_per_trade,
            commission_pct,
            slippage_pct,
        },
    )
}

fn simulate(
    market: &Market,
    threshold: f64,
    max_positions: usize,
    holding_period: usize,
    sizing: PositionSizing,
) -> (BacktestRequest, BacktestResponse) {
    simulate_with(
        market,
        threshold,
        max_positions,
        holding_period,
        sizing,
        ExecutionConfig::default(),
    )
}

fn simulate_with(
    market: &Market,
    threshold: f64,
    max_positions: usize,
    holding_period: usize,
    sizing: PositionSizing,
    execution: ExecutionConfig,
) -> (BacktestRequest, BacktestResponse) {
    let mut prices = MockPriceFeed::new();
    let mut signals = MockSignalFeed::new();
    for (k, closes) in market.closes.iter().enumerate() {
        prices = prices.with_closes(TICKERS[k], closes);
        for (i, &value) in market.signals[k].iter().enumerate() {
            signals = signals.with_value("asymmetry", TICKERS[k], i + 1, value);
        }
    }
    let days = market.closes[0].len();
    let request = BacktestRequest {
        max_positions,
        holding_period,
        position_sizing: sizing,
        ..make_request("asymmetry", threshold, days)
    };
    let reference = universe(&TICKERS[..market.closes.len()]);
    let config = SimulationConfig {
        execution,
        ..SimulationConfig::default()
    };
    let response = run_with(&signals, &prices, &reference, &request, config).unwrap();
    (request, response)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn open_positions_never_exceed_capacity(
        market in arb_market(),
        threshold in 0.5..3.0_f64,
        max_positions in 1usize..=4,
        holding_period in 1usize..=6,
        sizing in arb_sizing(),
    ) {
        let (request, resp) = simulate(&market, threshold, max_positions, holding_period, sizing);
        for point in &resp.equity_curve {
            prop_assert!(point.num_positions <= request.max_positions);
            prop_assert!(point.cash >= -1e-6);
        }
        prop_assert!(resp.active_positions.len() <= request.max_positions);
    }

    #[test]
    fn cash_plus_cost_basis_is_conserved(
        market in arb_market(),
        threshold in 0.5..3.0_f64,
        max_positions in 1usize..=4,
        holding_period in 1usize..=6,
        sizing in arb_sizing(),
    ) {
        let (request, resp) = simulate(&market, threshold, max_positions, holding_period, sizing);
        assert_conservation(request.initial_capital, &resp);
    }

    #[test]
    fn costed_runs_conserve_and_stay_solvent(
        market in arb_market(),
        threshold in 0.5..3.0_f64,
        max_positions in 1usize..=4,
        holding_period in 1usize..=6,
        sizing in arb_sizing(),
        execution in arb_execution(),
    ) {
        let (request, resp) =
            simulate_with(&market, threshold, max_positions, holding_period, sizing, execution);
        assert_conservation(request.initial_capital, &resp);
        for point in &resp.equity_curve {
            prop_assert!(point.cash >= -1e-6);
        }
        for trade in &resp.trades {
            prop_assert!(trade.commission >= -1e-9);
        }
    }

    #[test]
    fn round_trips_span_holding_period(
        market in arb_market(),
        threshold in 0.5..3.0_f64,
        max_positions in 1usize..=4,
        holding_period in 1usize..=6,
    ) {
        let (request, resp) =
            simulate(&market, threshold, max_positions, holding_period, PositionSizing::Equal);
        for span in holding_spans(&resp) {
            prop_assert_eq!(span, request.holding_period);
        }
        prop_assert_eq!(resp.diagnostics.deferred_exits, 0);
    }

    #[test]
    fn reruns_are_identical(
        market in arb_market(),
        threshold in 0.5..3.0_f64,
        sizing in arb_sizing(),
    ) {
        let (_, first) = simulate(&market, threshold, 3, 3, sizing);
        let (_, second) = simulate(&market, threshold, 3, 3, sizing);
        prop_assert_eq!(
            serde_json::to_string(&first.trades).unwrap(),
            serde_json::to_string(&second.trades).unwrap()
        );
        prop_assert_eq!(
            serde_json::to_string(&first.equity_curve).unwrap(),
            serde_json::to_string(&second.equity_curve).unwrap()
        );
    }

    #[test]
    fn statistics_are_finite(
        market in arb_market(),
        threshold in 0.5..3.0_f64,
        sizing in arb_sizing(),
    ) {
        let (_, resp) = simulate(&market, threshold, 2, 2, sizing);
        let s = &resp.stats;
        for v in [s.final_value, s.total_return, s.annualized_return, s.sharpe_ratio, s.sortino_ratio, s.max_drawdown] {
            prop_assert!(v.is_finite());
        }
        prop_assert!(s.max_drawdown >= 0.0 && s.max_drawdown <= 100.0);
        prop_assert!(resp.trade_metrics.win_rate >= 0.0 && resp.trade_metrics.win_rate <= 100.0);
    }
}
