//! Run configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::features::EncoderConfig;
use crate::error::PipelineError;

/// Configuration of one augmentation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Glob pattern of raw race files
    pub input: String,
    /// Directory receiving one artifact per horse
    pub output: PathBuf,
    pub encoder: EncoderConfig,
    /// Worker threads; `None` uses every core, `Some(1)` runs sequentially
    pub jobs: Option<usize>,
}

impl AugmentConfig {
    pub fn new(input: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            encoder: EncoderConfig::default(),
            jobs: None,
        }
    }

    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.input.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "input pattern must not be empty".to_string(),
            ));
        }
        if self.output.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "output directory must not be empty".to_string(),
            ));
        }
        if self.encoder.max_result_position == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_result_position must be at least 1".to_string(),
            ));
        }
        let scale = self.encoder.cash_prize_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "cash_prize_scale must be a positive number, got {}",
                scale
            )));
        }
        if self.jobs == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
