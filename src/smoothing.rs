//! Temporal smoothing
//!
//! Exponentially weighted moving average over the raw valence stream. The
//! smoother is parameterised by a window (span) `w`, giving a decay factor
//! `alpha = 2 / (w + 1)`.
//!
//! The filter is evaluated with the streaming recurrence
//! `y[0] = x[0]; y[r] = alpha * x[r] + (1 - alpha) * y[r - 1]`, which equals
//! the closed-form weighted sum over the complete history but stays
//! numerically stable for arbitrarily long sessions and costs O(1) per sample.
//! Because each output depends on the full prefix, a smoother that starts
//! mid-session will not reproduce the outputs of a continuous run.

use crate::error::FluxError;
use serde::{Deserialize, Serialize};

/// Default EWMA window
pub const DEFAULT_WINDOW: f64 = 10.0;

/// Default number of decimal digits kept when persisting smoothed values
pub const DEFAULT_PRECISION: u32 = 4;

/// Largest precision whose rounding factor stays exact in an f64
pub const MAX_PRECISION: u32 = 15;

/// Decay factor for a given window
pub fn alpha_for_window(window: f64) -> Result<f64, FluxError> {
    if !window.is_finite() || window <= 0.0 {
        return Err(FluxError::InvalidWindow(window));
    }
    Ok(2.0 / (window + 1.0))
}

/// Streaming EWMA state.
///
/// Carries only the previous smoothed value, so the session object that owns
/// it never needs the raw sample history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EwmaSmoother {
    alpha: f64,
    last: Option<f64>,
    samples: u64,
}

impl Default for EwmaSmoother {
    fn default() -> Self {
        Self {
            alpha: 2.0 / (DEFAULT_WINDOW + 1.0),
            last: None,
            samples: 0,
        }
    }
}

impl EwmaSmoother {
    /// Create a smoother with the given window
    pub fn new(window: f64) -> Result<Self, FluxError> {
        Ok(Self {
            alpha: alpha_for_window(window)?,
            last: None,
            samples: 0,
        })
    }

    /// Feed one raw sample and return the new smoothed value
    pub fn update(&mut self, sample: f64) -> f64 {
        let smoothed = match self.last {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.last = Some(smoothed);
        self.samples += 1;
        smoothed
    }

    /// Most recent smoothed value, if any sample has been seen
    pub fn current(&self) -> Option<f64> {
        self.last
    }

    /// Number of samples folded into the current value
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

/// Smooth an entire history, returning one output per input sample.
///
/// Equivalent to feeding every sample through a fresh [`EwmaSmoother`].
pub fn ewma_series(samples: &[f64], window: f64) -> Result<Vec<f64>, FluxError> {
    let mut smoother = EwmaSmoother::new(window)?;
    Ok(samples.iter().map(|&x| smoother.update(x)).collect())
}

/// Round to a fixed number of decimal digits for persistence
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Last output of the direct weighted-sum form:
    /// `x0 * rev^n + alpha * sum(x[k] * rev^(n-1-k))`.
    fn closed_form_last(samples: &[f64], window: f64) -> f64 {
        let alpha = 2.0 / (window + 1.0);
        let rev = 1.0 - alpha;
        let n = samples.len() as i32;
        let offset = samples[0] * rev.powi(n);
        let weighted: f64 = samples
            .iter()
            .enumerate()
            .map(|(k, x)| x * rev.powi(n - 1 - k as i32))
            .sum();
        offset + alpha * weighted
    }

    #[test]
    fn test_constant_sequence_is_fixed_point() {
        for window in [0.5, 1.0, 3.0, 10.0, 250.0] {
            let out = ewma_series(&[0.37; 50], window).unwrap();
            assert_eq!(out.len(), 50);
            for v in out {
                assert!((v - 0.37).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_two_sample_regression_fixture() {
        // alpha = 2/11; y1 = alpha * 1.0 + (1 - alpha) * 0.0
        let out = ewma_series(&[0.0, 1.0], 10.0).unwrap();
        assert_eq!(round_to(out[1], 4), 0.1818);
        assert!((out[1] - closed_form_last(&[0.0, 1.0], 10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_recurrence_matches_closed_form() {
        let samples = [0.5, 0.8, 0.2, 1.0, 0.0, 0.65, 0.4];
        for n in 2..=samples.len() {
            let out = ewma_series(&samples[..n], 4.0).unwrap();
            let expected = closed_form_last(&samples[..n], 4.0);
            assert!(
                (out[n - 1] - expected).abs() < 1e-9,
                "n={} got {} expected {}",
                n,
                out[n - 1],
                expected
            );
        }
    }

    #[test]
    fn test_streaming_matches_series() {
        let samples = [0.1, 0.9, 0.5, 0.5, 0.2];
        let series = ewma_series(&samples, 10.0).unwrap();
        let mut smoother = EwmaSmoother::new(10.0).unwrap();
        for (x, expected) in samples.iter().zip(series.iter()) {
            assert_eq!(smoother.update(*x), *expected);
        }
        assert_eq!(smoother.sample_count(), 5);
        assert_eq!(smoother.current(), series.last().copied());
    }

    #[test]
    fn test_long_session_stays_finite() {
        let mut smoother = EwmaSmoother::new(10.0).unwrap();
        let mut last = 0.0;
        for i in 0..200_000 {
            last = smoother.update(if i % 2 == 0 { 1.0 } else { 0.0 });
        }
        assert!(last.is_finite());
        assert!((0.0..=1.0).contains(&last));
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert!(matches!(
            EwmaSmoother::new(0.0),
            Err(FluxError::InvalidWindow(_))
        ));
        assert!(EwmaSmoother::new(-3.0).is_err());
        assert!(EwmaSmoother::new(f64::NAN).is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(0.5, 4), 0.5);
    }
}
