//! High/low channel of the samples preceding the current one.

/// `(high, low)` of the `lookback` values before the last value.
///
/// Needs `lookback + 1` values; the current value is never part of its own
/// channel.
pub fn prior_channel(values: &[f64], lookback: usize) -> Option<(f64, f64)> {
    if lookback == 0 || values.len() < lookback + 1 {
        return None;
    }
    let end = values.len() - 1;
    let window = &values[end - lookback..end];
    let high = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().copied().fold(f64::INFINITY, f64::min);
    Some((high, low))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_current_value() {
        let values = [100.0, 105.0, 95.0, 200.0];
        assert_eq!(prior_channel(&values, 3), Some((105.0, 95.0)));
        assert_eq!(prior_channel(&values, 2), Some((105.0, 95.0)));
        assert_eq!(prior_channel(&values, 1), Some((95.0, 95.0)));
    }

    #[test]
    fn needs_lookback_plus_one() {
        assert_eq!(prior_channel(&[1.0, 2.0, 3.0], 3), None);
        assert_eq!(prior_channel(&[1.0, 2.0, 3.0], 0), None);
    }
}
