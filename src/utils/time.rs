//! Platform clock types.
//!
//! `std::time::Instant` panics on `wasm32-unknown-unknown`, so the engine
//! routes every timestamp through these re-exports.

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};

/// Time elapsed between `earlier` and `now`, clamped to zero when the caller
/// passes a `now` that predates `earlier`.
#[inline]
#[must_use]
pub fn elapsed_between(earlier: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_clamped_for_past_now() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(2);
        assert_eq!(elapsed_between(later, t0), Duration::ZERO);
        assert_eq!(elapsed_between(t0, later), Duration::from_secs(2));
    }
}
