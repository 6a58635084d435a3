//! Augmentation pipeline
//!
//! Drives one run through its stages:
//!
//! ```text
//! Discovering -> Parsing -> Building -> Encoding -> Writing -> Reporting
//! ```
//!
//! Bad rows, unreadable files and per-horse write problems are collected in
//! the [`RunSummary`]; a run only fails when nothing matched the input
//! pattern, no artifact could be produced, or an internal invariant broke.
//!
//! # Example
//!
//! ```no_run
//! use race_music::{AugmentConfig, AugmentPipeline};
//!
//! let config = AugmentConfig::new("data/raw/2016-2018_races/historic/*.json", "data/interim/music");
//! let summary = AugmentPipeline::new(config)?.run()?;
//! println!("{} artifacts written", summary.artifacts.len());
//! # Ok::<(), race_music::PipelineError>(())
//! ```

use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::artifact::{write_manifest, ArtifactWriter, ManifestEntry, RunManifest};
use crate::config::AugmentConfig;
use crate::data::features::{FeatureEncoder, ARTIFACT_FORMAT_VERSION};
use crate::data::identity::IdentityResolver;
use crate::data::parser::RaceFileParser;
use crate::data::sequence::SequenceBuilder;
use crate::error::{DataWarning, FileUnreadable, HorseFailure, ParseError, PipelineError};
use crate::models::{HorseArtifact, HorseKey, HorseSequence, PerformanceRecord, FEATURE_NAMES};

/// Stage of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Discovering,
    Parsing,
    Building,
    Encoding,
    Writing,
    Reporting,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Discovering => "discovering",
            RunStage::Parsing => "parsing",
            RunStage::Building => "building",
            RunStage::Encoding => "encoding",
            RunStage::Writing => "writing",
            RunStage::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

/// Progress notifications; file and artifact events may come from worker
/// threads
#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    StageStarted(RunStage),
    FilesDiscovered(usize),
    FileParsed(&'a Path),
    HorsesBuilt(usize),
    ArtifactWritten(&'a HorseKey),
}

/// An artifact that reached its final name
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenArtifact {
    pub key: HorseKey,
    pub path: PathBuf,
    pub performance_count: usize,
}

/// Outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub files_parsed: usize,
    pub file_failures: Vec<FileUnreadable>,
    pub rows_read: usize,
    pub records_kept: usize,
    pub distinct_raw_names: usize,
    pub horses_built: usize,
    pub artifacts: Vec<WrittenArtifact>,
    pub warnings: Vec<DataWarning>,
    pub horse_failures: Vec<HorseFailure>,
    pub manifest_path: Option<PathBuf>,
}

impl RunSummary {
    /// True when no file, row or horse was lost
    pub fn is_clean(&self) -> bool {
        self.file_failures.is_empty() && self.warnings.is_empty() && self.horse_failures.is_empty()
    }

    fn log_totals(&self) {
        info!(
            "Parsed {}/{} files: {} rows, {} records kept for {} horses ({} raw names)",
            self.files_parsed,
            self.files_discovered,
            self.rows_read,
            self.records_kept,
            self.horses_built,
            self.distinct_raw_names
        );
        info!(
            "Wrote {} artifacts; {} warnings, {} file failures, {} horse failures",
            self.artifacts.len(),
            self.warnings.len(),
            self.file_failures.len(),
            self.horse_failures.len()
        );
    }
}

/// Input files matched by a pattern
#[derive(Debug, Default)]
pub struct Discovery {
    /// Sorted, files only
    pub files: Vec<PathBuf>,
    /// Entries the glob walk could not read
    pub failures: Vec<FileUnreadable>,
}

/// Expand the input pattern
pub fn discover_inputs(pattern: &str) -> Result<Discovery, PipelineError> {
    let entries = glob::glob(pattern).map_err(|e| PipelineError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut discovery = Discovery::default();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => discovery.files.push(path),
            Ok(_) => {}
            Err(e) => discovery.failures.push(FileUnreadable {
                path: e.path().to_path_buf(),
                reason: e.error().to_string(),
            }),
        }
    }
    discovery.files.sort();

    if discovery.files.is_empty() {
        return Err(PipelineError::NoInputFiles {
            pattern: pattern.to_string(),
        });
    }
    Ok(discovery)
}

/// Records and warnings from one file
#[derive(Debug, Default)]
struct ParsedFile {
    rows: usize,
    records: Vec<PerformanceRecord>,
    warnings: Vec<DataWarning>,
}

fn parse_one(parser: &RaceFileParser, path: &Path) -> Result<ParsedFile, ParseError> {
    let mut file = ParsedFile::default();
    for row in parser.parse_file(path)? {
        file.rows += 1;
        match row {
            Ok(parsed) => {
                file.warnings.extend(parsed.warnings);
                file.records.push(parsed.record);
            }
            Err(warning) => file.warnings.push(warning),
        }
    }
    Ok(file)
}

/// State owned by a single run; nothing outlives it
#[derive(Debug, Default)]
struct RunContext {
    resolver: IdentityResolver,
    summary: RunSummary,
}

impl RunContext {
    fn record_warnings(&mut self, warnings: Vec<DataWarning>) {
        for warning in &warnings {
            debug!("{}", warning);
        }
        self.summary.warnings.extend(warnings);
    }

    fn record_horse_failure(&mut self, failure: HorseFailure) {
        warn!("{}", failure);
        self.summary.horse_failures.push(failure);
    }
}

/// Glob-to-artifacts augmentation run
pub struct AugmentPipeline {
    config: AugmentConfig,
}

impl AugmentPipeline {
    pub fn new(config: AugmentConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        self.run_with_observer(|_| {})
    }

    /// Run, reporting progress to `observer`
    pub fn run_with_observer<F>(&self, observer: F) -> Result<RunSummary, PipelineError>
    where
        F: Fn(PipelineEvent<'_>) + Sync,
    {
        // Local pool so concurrent runs can use different thread counts
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.unwrap_or(0))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        let mut ctx = RunContext::default();

        // Discovering
        observer(PipelineEvent::StageStarted(RunStage::Discovering));
        let discovery = discover_inputs(&self.config.input)?;
        info!(
            "Found {} input files matching {}",
            discovery.files.len(),
            self.config.input
        );
        for failure in &discovery.failures {
            warn!("Unreadable input {}", failure);
        }
        ctx.summary.files_discovered = discovery.files.len();
        ctx.summary.file_failures.extend(discovery.failures);
        observer(PipelineEvent::FilesDiscovered(discovery.files.len()));

        // Parsing: results keep glob order whatever the thread count
        observer(PipelineEvent::StageStarted(RunStage::Parsing));
        let parser = RaceFileParser::new();
        let parsed: Vec<(PathBuf, Result<ParsedFile, ParseError>)> = pool.install(|| {
            discovery
                .files
                .par_iter()
                .map(|path| {
                    let outcome = parse_one(&parser, path);
                    observer(PipelineEvent::FileParsed(path.as_path()));
                    (path.clone(), outcome)
                })
                .collect()
        });

        // Building
        observer(PipelineEvent::StageStarted(RunStage::Building));
        let mut builder = SequenceBuilder::new();
        for (path, outcome) in parsed {
            match outcome {
                Ok(file) => {
                    ctx.summary.files_parsed += 1;
                    ctx.summary.rows_read += file.rows;
                    ctx.record_warnings(file.warnings);
                    for record in file.records {
                        let key = ctx.resolver.resolve(&record.horse_raw_name);
                        builder.add(key, record)?;
                    }
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    ctx.summary.file_failures.push(FileUnreadable {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let build = builder.build()?;
        ctx.record_warnings(build.warnings);
        ctx.summary.horses_built = build.sequences.len();
        ctx.summary.records_kept = build.sequences.iter().map(HorseSequence::len).sum();
        ctx.summary.distinct_raw_names = ctx.resolver.alias_count();
        info!(
            "Built {} horse sequences from {} raw names",
            build.sequences.len(),
            ctx.resolver.alias_count()
        );
        observer(PipelineEvent::HorsesBuilt(build.sequences.len()));

        // Encoding: names are claimed in first-encounter order, so on a
        // collision the horse met first in the sorted inputs keeps the name
        observer(PipelineEvent::StageStarted(RunStage::Encoding));
        let mut writer = ArtifactWriter::new(&self.config.output);
        let mut planned: Vec<(HorseSequence, PathBuf)> = Vec::with_capacity(build.sequences.len());
        for sequence in build.sequences {
            match writer.claim(&sequence.key) {
                Ok(path) => planned.push((sequence, path)),
                Err(failure) => ctx.record_horse_failure(failure),
            }
        }

        let encoder = FeatureEncoder::new(self.config.encoder);
        let encoded: Vec<(HorseArtifact, PathBuf)> = pool.install(|| {
            planned
                .into_par_iter()
                .map(|(sequence, path)| (encoder.build_artifact(&sequence), path))
                .collect()
        });

        if let Some((artifact, _)) = encoded.iter().find(|(a, _)| {
            a.features.len() != a.performance_count || a.race_dates.len() != a.performance_count
        }) {
            return Err(PipelineError::InternalInvariantViolation(format!(
                "encoded {} vectors for {} performances of '{}'",
                artifact.features.len(),
                artifact.performance_count,
                artifact.horse_key
            )));
        }

        // Writing
        observer(PipelineEvent::StageStarted(RunStage::Writing));
        if !encoded.is_empty() {
            writer
                .prepare()
                .map_err(|source| PipelineError::OutputDir {
                    path: writer.destination().to_path_buf(),
                    source,
                })?;
        }

        let written: Vec<Result<WrittenArtifact, HorseFailure>> = pool.install(|| {
            encoded
                .par_iter()
                .map(|(artifact, path)| -> Result<WrittenArtifact, HorseFailure> {
                    writer.write(path, artifact)?;
                    observer(PipelineEvent::ArtifactWritten(&artifact.horse_key));
                    Ok(WrittenArtifact {
                        key: artifact.horse_key.clone(),
                        path: path.clone(),
                        performance_count: artifact.performance_count,
                    })
                })
                .collect()
        });

        for result in written {
            match result {
                Ok(artifact) => ctx.summary.artifacts.push(artifact),
                Err(failure) => ctx.record_horse_failure(failure),
            }
        }

        // Reporting
        observer(PipelineEvent::StageStarted(RunStage::Reporting));
        if ctx.summary.artifacts.is_empty() {
            ctx.summary.log_totals();
            return Err(PipelineError::ZeroArtifactsProduced {
                summary: Box::new(ctx.summary),
            });
        }

        let manifest = self.manifest(&ctx.summary.artifacts);
        match write_manifest(writer.destination(), &manifest) {
            Ok(path) => ctx.summary.manifest_path = Some(path),
            Err(e) => warn!("Failed to write run manifest: {}", e),
        }

        ctx.summary.log_totals();
        Ok(ctx.summary)
    }

    fn manifest(&self, artifacts: &[WrittenArtifact]) -> RunManifest {
        RunManifest {
            format_version: ARTIFACT_FORMAT_VERSION,
            encoder: self.config.encoder,
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            artifacts: artifacts
                .iter()
                .map(|a| ManifestEntry {
                    horse_key: a.key.clone(),
                    file_name: a
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    performance_count: a.performance_count,
                })
                .collect(),
        }
    }
}

/// Validate `config` and run it once
pub fn run_augmentation(config: AugmentConfig) -> Result<RunSummary, PipelineError> {
    AugmentPipeline::new(config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_stage_display() {
        assert_eq!(RunStage::Discovering.to_string(), "discovering");
        assert_eq!(RunStage::Reporting.to_string(), "reporting");
    }

    #[test]
    fn test_discover_sorted_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "[]").unwrap();
        fs::write(dir.path().join("a.json"), "[]").unwrap();
        fs::create_dir(dir.path().join("c.json")).unwrap();

        let pattern = format!("{}/*.json", dir.path().display());
        let discovery = discover_inputs(&pattern).unwrap();
        let names: Vec<_> = discovery
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_discover_errors() {
        assert!(matches!(
            discover_inputs("data/[.json"),
            Err(PipelineError::InvalidPattern { .. })
        ));

        let dir = tempdir().unwrap();
        let pattern = format!("{}/*.json", dir.path().display());
        assert!(matches!(
            discover_inputs(&pattern),
            Err(PipelineError::NoInputFiles { .. })
        ));
    }

    #[test]
    fn test_parse_one_counts_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("race.json");
        fs::write(
            &path,
            r#"[{"name": "Sea Bird", "date": "2017-04-12", "position": "T"},
                {"name": "Sea Bird", "date": "soon"}]"#,
        )
        .unwrap();

        let file = parse_one(&RaceFileParser::new(), &path).unwrap();
        assert_eq!(file.rows, 2);
        assert_eq!(file.records.len(), 1);
        assert_eq!(file.warnings.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AugmentConfig::new("*.json", "out").with_jobs(Some(0));
        assert!(matches!(
            AugmentPipeline::new(config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
