//! Trailing return volatility.
//!
//! Population standard deviation of simple daily returns over a fixed
//! lookback. VOL(n)[i] uses returns r[i-n+1..=i] where r[j] = P[j]/P[j-1] - 1,
//! so the first n points are `None`. Maintained with running sums so each
//! step is O(1) regardless of history length.

pub const DEFAULT_LOOKBACK: usize = 20;

pub fn rolling_volatility(prices: &[f64], lookback: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    if lookback == 0 {
        out.resize(prices.len(), None);
        return out;
    }

    let returns: Vec<f64> = std::iter::once(0.0)
        .chain(prices.windows(2).map(|w| {
            if w[0] > 0.0 {
                w[1] / w[0] - 1.0
            } else {
                0.0
            }
        }))
        .collect();

    let n = lookback as f64;
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;

    for i in 0..prices.len() {
        if i >= 1 {
            sum += returns[i];
            sum_sq += returns[i] * returns[i];
        }
        if i > lookback {
            let dropped = returns[i - lookback];
            sum -= dropped;
            sum_sq -= dropped * dropped;
        }

        if i >= lookback {
            let mean = sum / n;
            // running sums can drift slightly negative on flat series
            let variance = (sum_sq / n - mean * mean).max(0.0);
            out.push(Some(variance.sqrt()));
        } else {
            out.push(None);
        }
    }

    out
}
