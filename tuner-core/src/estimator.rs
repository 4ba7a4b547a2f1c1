//! # Fundamental Frequency Estimator
//!
//! Time-domain autocorrelation pitch detection for monophonic, plucked
//! sources (guitar, bass, ukulele).
//!
//! ## Pipeline
//! 1. RMS gate over the whole frame
//! 2. Unnormalised autocorrelation over a fixed window, for the lags that
//!    correspond to `min_frequency..=max_frequency`
//! 3. Peak picking: best local maximum, stopping early at the first peak
//!    stronger than `early_exit_ratio` of the zero-lag energy
//! 4. Parabolic interpolation around the chosen lag
//! 5. `sample_rate / refined_lag`
//!
//! Silence and weak periodicity are reported as [`Estimate::NoSignal`].
//! Only a misconfigured caller (short frame, bad sample rate, inconsistent
//! settings) gets an `Err`.

use crate::error::{TunerError, TunerResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Tunable parameters of the estimator.
///
/// Defaults are tuned for 44.1/48 kHz input with 4096-sample frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Frames quieter than this RMS are treated as silence
    pub min_rms: f32,
    /// Lowest detectable fundamental in Hz
    pub min_frequency: f32,
    /// Highest detectable fundamental in Hz
    pub max_frequency: f32,
    /// Number of samples correlated per lag, taken from the start of the frame
    pub window_size: usize,
    /// Absolute floor for the winning correlation value
    pub min_correlation: f32,
    /// Fraction of zero-lag energy at which peak picking stops
    pub early_exit_ratio: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_rms: 0.005,
            min_frequency: 65.0,
            max_frequency: 1000.0,
            window_size: 2048,
            min_correlation: 0.01,
            early_exit_ratio: 0.9,
        }
    }
}

impl EstimatorConfig {
    /// Checks the settings independently of any sample rate.
    pub fn validate(&self) -> TunerResult<()> {
        let positive = |v: f32| v.is_finite() && v > 0.0;

        if !positive(self.min_frequency) || !positive(self.max_frequency) {
            return Err(TunerError::InvalidConfig(format!(
                "frequency bounds must be positive, got {} - {} Hz",
                self.min_frequency, self.max_frequency
            )));
        }
        if self.min_frequency >= self.max_frequency {
            return Err(TunerError::InvalidConfig(format!(
                "min_frequency ({}) must be below max_frequency ({})",
                self.min_frequency, self.max_frequency
            )));
        }
        if self.window_size == 0 {
            return Err(TunerError::InvalidConfig("window_size must be non-zero".into()));
        }
        if !self.min_rms.is_finite() || self.min_rms < 0.0 {
            return Err(TunerError::InvalidConfig(format!("min_rms must be >= 0, got {}", self.min_rms)));
        }
        if !self.min_correlation.is_finite() || self.min_correlation < 0.0 {
            return Err(TunerError::InvalidConfig(format!(
                "min_correlation must be >= 0, got {}",
                self.min_correlation
            )));
        }
        if !positive(self.early_exit_ratio) {
            return Err(TunerError::InvalidConfig(format!(
                "early_exit_ratio must be positive, got {}",
                self.early_exit_ratio
            )));
        }
        Ok(())
    }

    /// Searched lag range `(min_lag, max_lag)` at `sample_rate`, inclusive.
    pub fn lag_range(&self, sample_rate: f32) -> TunerResult<(usize, usize)> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(TunerError::InvalidSampleRate(sample_rate));
        }
        self.validate()?;

        let min_lag = (sample_rate / self.max_frequency).floor() as usize;
        let max_lag = (sample_rate / self.min_frequency).floor() as usize;
        if min_lag == 0 || min_lag > max_lag {
            return Err(TunerError::InvalidConfig(format!(
                "no usable lags for {} - {} Hz at {} Hz sample rate",
                self.min_frequency, self.max_frequency, sample_rate
            )));
        }
        Ok((min_lag, max_lag))
    }

    /// Minimum frame length accepted at `sample_rate`: `window_size + max_lag`.
    pub fn required_len(&self, sample_rate: f32) -> TunerResult<usize> {
        let (_, max_lag) = self.lag_range(sample_rate)?;
        Ok(self.window_size + max_lag)
    }

    /// Longest lag that may be picked as a peak.
    ///
    /// The period of a tone at exactly `min_frequency` is usually fractional,
    /// and its correlation peak can fall on the lag after `max_lag`.
    fn search_limit(&self, sample_rate: f32, max_lag: usize) -> usize {
        ((sample_rate / self.min_frequency).ceil() as usize).max(max_lag)
    }
}

/// Outcome of a single estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    /// Fundamental frequency in Hz
    Frequency(f32),
    /// Too quiet, or no convincing periodicity
    NoSignal,
}

impl Estimate {
    /// The detected frequency, if any.
    pub fn frequency(self) -> Option<f32> {
        match self {
            Estimate::Frequency(f) => Some(f),
            Estimate::NoSignal => None,
        }
    }
}

/// Autocorrelation pitch estimator.
///
/// Holds the correlation buffer between calls so steady-state estimation
/// does not allocate. The buffer grows once if the sample rate rises.
#[derive(Debug, Clone)]
pub struct Estimator {
    config: EstimatorConfig,
    correlations: Vec<f32>,
}

impl Estimator {
    /// Creates an estimator, rejecting inconsistent settings up front.
    pub fn new(config: EstimatorConfig) -> TunerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            correlations: Vec::new(),
        })
    }

    /// Creates an estimator with its buffer sized for `sample_rate`.
    pub fn with_sample_rate(config: EstimatorConfig, sample_rate: f32) -> TunerResult<Self> {
        let (_, max_lag) = config.lag_range(sample_rate)?;
        let limit = config.search_limit(sample_rate, max_lag);
        Ok(Self {
            config,
            correlations: vec![0.0; limit + 2],
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimates the fundamental frequency of `samples`.
    ///
    /// # Errors
    /// * [`TunerError::InvalidSampleRate`] for a non-positive or non-finite rate
    /// * [`TunerError::BufferTooShort`] if `samples` is shorter than
    ///   [`EstimatorConfig::required_len`]
    /// * [`TunerError::InvalidConfig`] if the frequency bounds leave no lags
    pub fn estimate(&mut self, samples: &[f32], sample_rate: f32) -> TunerResult<Estimate> {
        let (min_lag, max_lag) = self.config.lag_range(sample_rate)?;
        let window_size = self.config.window_size;
        let required = window_size + max_lag;
        if samples.len() < required {
            return Err(TunerError::BufferTooShort {
                len: samples.len(),
                required,
            });
        }

        // --- Energy gate ---
        let level = rms(samples);
        if level < self.config.min_rms {
            trace!("[estimator] below gate: rms={level:.5}");
            return Ok(Estimate::NoSignal);
        }

        // --- Correlation over the searched lags and their outer neighbours ---
        let window = &samples[..window_size];
        let zero_lag: f32 = window.iter().map(|&s| s * s).sum();

        let limit = self.config.search_limit(sample_rate, max_lag);
        if self.correlations.len() < limit + 2 {
            self.correlations.resize(limit + 2, 0.0);
        }
        // Lag 0 is the frame energy and never serves as a neighbour.
        let first = (min_lag - 1).max(1);
        // At least one sample always overlaps, since len >= window_size + max_lag.
        let last = (limit + 1).min(samples.len() - 1);
        for lag in first..=last {
            self.correlations[lag] = correlate(window, &samples[lag..]);
        }
        let correlations = &self.correlations;

        // --- Peak picking ---
        // Only lags with both neighbours computed are candidates.
        let early_exit = self.config.early_exit_ratio * zero_lag;
        let mut best: Option<(usize, f32)> = None;
        for lag in min_lag.max(first + 1)..=limit.min(last - 1) {
            let value = correlations[lag];
            if value <= correlations[lag - 1] || value <= correlations[lag + 1] {
                continue;
            }
            if best.is_none_or(|(_, best_value)| value > best_value) {
                best = Some((lag, value));
            }
            if value > early_exit {
                trace!("[estimator] early exit at lag {lag}");
                break;
            }
        }

        let Some((best_lag, best_value)) = best else {
            debug!("[estimator] no local maximum in lags {min_lag}..={limit}");
            return Ok(Estimate::NoSignal);
        };
        if best_value < self.config.min_correlation {
            debug!("[estimator] peak at lag {best_lag} too weak: {best_value:.4}");
            return Ok(Estimate::NoSignal);
        }

        // --- Parabolic refinement ---
        let refined = refine_lag(
            best_lag,
            correlations[best_lag - 1],
            best_value,
            correlations[best_lag + 1],
        );
        if !refined.is_finite() || refined <= 0.0 {
            debug!("[estimator] rejected refined lag {refined}");
            return Ok(Estimate::NoSignal);
        }

        let frequency = sample_rate / refined;
        if frequency.is_finite() && frequency > 0.0 {
            Ok(Estimate::Frequency(frequency))
        } else {
            Ok(Estimate::NoSignal)
        }
    }
}

/// Correlation of `window` against `tail` over their overlap.
///
/// When `tail` is shorter than the window the sum is scaled up to the full
/// window length, keeping it comparable with the lags before it.
fn correlate(window: &[f32], tail: &[f32]) -> f32 {
    let overlap = window.len().min(tail.len());
    let sum: f32 = window[..overlap]
        .iter()
        .zip(tail)
        .map(|(&a, &b)| a * b)
        .sum();
    if overlap < window.len() {
        sum * window.len() as f32 / overlap as f32
    } else {
        sum
    }
}

/// Root-mean-square level of `samples`; zero for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Sub-sample lag from a parabola through `(lag-1, y1)`, `(lag, y2)`, `(lag+1, y3)`.
///
/// Falls back to `lag` when the three points are collinear.
pub fn refine_lag(lag: usize, y1: f32, y2: f32, y3: f32) -> f32 {
    let a = (y1 + y3 - 2.0 * y2) / 2.0;
    let b = (y3 - y1) / 2.0;
    if a != 0.0 {
        lag as f32 - b / (2.0 * a)
    } else {
        lag as f32
    }
}
