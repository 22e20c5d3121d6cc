//! Simple moving average of the most recent samples.

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// SMA as it stood one sample ago (excluding the current value).
pub fn sma_before(values: &[f64], period: usize) -> Option<f64> {
    let (_, previous) = values.split_last()?;
    sma(previous, period)
}
