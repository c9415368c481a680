//! Fill simulation with an optional cost model.
//!
//! Costs are off unless configured. Buy fills pay slippage upward, sell
//! fills downward; commission is a flat fee plus a percentage of notional.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

impl ExecutionConfig {
    pub fn is_frictionless(&self) -> bool {
        self.commission_per_trade == 0.0 && self.commission_pct == 0.0 && self.slippage_pct == 0.0
    }
}

/// A priced fill. For buys `net_value` is total cash paid; for sells it is
/// cash received after commission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub net_value: f64,
    pub commission: f64,
}

/// flat_fee + notional * pct / 100
pub fn calculate_commission(notional: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (notional * config.commission_pct / 100.0)
}

pub fn apply_slippage_buy(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

pub fn apply_slippage_sell(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Whole shares a `budget` buys at the slipped price once commission is
/// paid out of the same budget: `shares * p * (1 + pct/100) + flat <= budget`.
pub fn whole_shares(budget: f64, market_price: f64, config: &ExecutionConfig) -> i64 {
    let price = apply_slippage_buy(market_price, config.slippage_pct);
    let unit_cost = price * (1.0 + config.commission_pct / 100.0);
    let spendable = budget - config.commission_per_trade;
    if unit_cost <= 0.0 || !spendable.is_finite() || spendable <= 0.0 {
        return 0;
    }
    (spendable / unit_cost).floor() as i64
}

/// Largest share count up to `shares` whose buy fill fits in `cash`.
pub fn affordable_shares(shares: i64, market_price: f64, cash: f64, config: &ExecutionConfig) -> i64 {
    let mut shares = shares;
    while shares > 0 && buy_fill(market_price, shares, config).net_value > cash {
        shares -= 1;
    }
    shares
}

pub fn buy_fill(market_price: f64, shares: i64, config: &ExecutionConfig) -> Fill {
    let price = apply_slippage_buy(market_price, config.slippage_pct);
    let notional = shares as f64 * price;
    let commission = calculate_commission(notional, config);
    Fill {
        price,
        net_value: notional + commission,
        commission,
    }
}

pub fn sell_fill(market_price: f64, shares: i64, config: &ExecutionConfig) -> Fill {
    let price = apply_slippage_sell(market_price, config.slippage_pct);
    let notional = shares as f64 * price;
    let commission = calculate_commission(notional, config);
    Fill {
        price,
        net_value: notional - commission,
        commission,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn costly() -> ExecutionConfig {
        ExecutionConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            slippage_pct: 0.05,
        }
    }

    #[test]
    fn default_is_frictionless() {
        let config = ExecutionConfig::default();
        assert!(config.is_frictionless());
        let fill = buy_fill(100.0, 10, &config);
        assert_relative_eq!(fill.price, 100.0);
        assert_relative_eq!(fill.net_value, 1000.0);
        assert_relative_eq!(fill.commission, 0.0);
    }

    #[test]
    fn commission_flat_plus_pct() {
        let commission = calculate_commission(10_000.0, &costly());
        assert_relative_eq!(commission, 10.0 + 10.0);
    }

    #[test]
    fn buy_pays_slippage_and_commission() {
        let config = costly();
        let fill = buy_fill(100.0, 10, &config);
        assert_relative_eq!(fill.price, 100.05);
        let notional = 10.0 * 100.05;
        assert_relative_eq!(fill.net_value, notional + 10.0 + notional * 0.001);
    }

    #[test]
    fn sell_receives_less() {
        let config = costly();
        let fill = sell_fill(100.0, 10, &config);
        assert_relative_eq!(fill.price, 99.95);
        let notional = 10.0 * 99.95;
        assert_relative_eq!(fill.net_value, notional - 10.0 - notional * 0.001);
    }

    #[test]
    fn whole_shares_rounds_down() {
        let config = ExecutionConfig::default();
        assert_eq!(whole_shares(1050.0, 100.0, &config), 10);
        assert_eq!(whole_shares(99.0, 100.0, &config), 0);
        assert_eq!(whole_shares(-5.0, 100.0, &config), 0);
        assert_eq!(whole_shares(500.0, 0.0, &config), 0);
    }

    #[test]
    fn whole_shares_leaves_room_for_costs() {
        let config = costly();
        let shares = whole_shares(10_000.0, 100.0, &config);
        assert!(shares > 0);
        assert!(buy_fill(100.0, shares, &config).net_value <= 10_000.0);
        assert!(buy_fill(100.0, shares + 1, &config).net_value > 10_000.0);
        // budget below the flat fee buys nothing
        assert_eq!(whole_shares(9.0, 1.0, &config), 0);
    }

    #[test]
    fn affordable_shares_trims_to_cash() {
        let config = costly();
        let fits = affordable_shares(100, 100.0, 5_000.0, &config);
        assert!(buy_fill(100.0, fits, &config).net_value <= 5_000.0);
        assert!(buy_fill(100.0, fits + 1, &config).net_value > 5_000.0);
        assert_eq!(affordable_shares(3, 100.0, 1_000_000.0, &config), 3);
        assert_eq!(affordable_shares(5, 100.0, 5.0, &config), 0);
    }
}
