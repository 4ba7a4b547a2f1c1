//! Application configuration, loaded from an optional JSON file.
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```json
//! { "smoothing": 8, "estimator": { "min_rms": 0.01 } }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tuner_core::EstimatorConfig;

use crate::audio::BUFFER_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sample rate requested from the input device
    pub sample_rate: u32,
    /// Samples per analysis frame
    pub buffer_size: usize,
    /// Number of readings averaged for the cents display
    pub smoothing: usize,
    pub estimator: EstimatorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: BUFFER_SIZE,
            smoothing: 5,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration at `path`, or the defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let data = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_json(&data).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate(config.sample_rate)?;
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Checks that frames are long enough for the estimator at `sample_rate`.
    ///
    /// Called again once the device reports its actual rate.
    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        let required = self.estimator.required_len(sample_rate as f32)?;
        if self.buffer_size < required {
            bail!(
                "buffer_size {} is too short: {} Hz needs at least {} samples",
                self.buffer_size,
                sample_rate,
                required
            );
        }
        Ok(())
    }
}
