//! Race Music - augmented race-history time series for horses
//!
//! This library provides:
//! - Parsing of scraped per-race JSON files into performance records
//! - Horse identity resolution across files and spellings
//! - Chronological per-horse sequences with duplicate removal
//! - Fixed-arity feature encoding (position, days since last race, prize)
//! - Atomic, re-loadable per-horse JSON artifacts
//!
//! # Example
//!
//! ```no_run
//! use race_music::{load_artifact, AugmentConfig, AugmentPipeline};
//!
//! let config = AugmentConfig::new("data/raw/2016-2018_races/historic/*.json", "data/interim/music");
//! let summary = AugmentPipeline::new(config)?.run()?;
//!
//! for written in &summary.artifacts {
//!     let artifact = load_artifact(&written.path)?;
//!     println!("{}: {} races", artifact.horse_key, artifact.performance_count);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod artifact;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;

// Re-export commonly used types
pub use artifact::{load_artifact, load_manifest, ArtifactWriter, RunManifest};
pub use config::AugmentConfig;
pub use data::{EncoderConfig, FeatureEncoder, IdentityResolver, RaceFileParser, SequenceBuilder};
pub use error::{DataWarning, FileUnreadable, HorseFailure, ParseError, PipelineError};
pub use models::{
    FeatureVector, HorseArtifact, HorseKey, HorseSequence, PerformanceRecord, ResultPosition,
};
pub use pipeline::{run_augmentation, AugmentPipeline, PipelineEvent, RunStage, RunSummary};
