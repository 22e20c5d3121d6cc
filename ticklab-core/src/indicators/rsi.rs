//! Relative Strength Index over the last `period` price changes.
//!
//! Gains and losses are averaged with a plain mean (no exponential smoothing).
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge case: avg_loss == 0 → RSI = 100, including a completely flat window.

/// RSI of the most recent `period + 1` values.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }
    let window = &values[values.len() - period - 1..];

    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}
