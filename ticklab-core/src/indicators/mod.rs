//! Pure indicator functions over a trailing price slice.
//!
//! Each function looks only at the tail of `values` and returns `None` when
//! there is not enough history, so strategies can turn that into `hold`.

pub mod channel;
pub mod rsi;
pub mod sma;

pub use channel::prior_channel;
pub use rsi::rsi;
pub use sma::{sma, sma_before};

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, eps: f64) {
    assert!(
        (actual - expected).abs() < eps,
        "expected {expected}, got {actual} (eps={eps})"
    );
}
