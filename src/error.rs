//! Error and warning types
//!
//! Data-quality problems are values collected into the run summary; only
//! structural failures and invariant violations end a run.

use chrono::NaiveDate;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::HorseKey;
use crate::pipeline::RunSummary;

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("no input files matched '{pattern}'")]
    NoInputFiles { pattern: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot prepare output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),

    #[error(
        "no artifacts were produced ({} file(s) parsed, {} horse(s) built)",
        .summary.files_parsed,
        .summary.horses_built
    )]
    ZeroArtifactsProduced { summary: Box<RunSummary> },

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

/// Reasons a whole input file contributes nothing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected layout: {0}")]
    Layout(String),
}

/// An input file that could not be read, recorded in the run summary
#[derive(Debug, Clone, PartialEq)]
pub struct FileUnreadable {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for FileUnreadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// Per-horse failures; the horse is skipped and the run continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HorseFailure {
    #[error("artifact name '{file_name}' for '{key}' is already used by '{existing_key}'")]
    NameCollision {
        key: HorseKey,
        existing_key: HorseKey,
        file_name: String,
    },

    #[error("failed to write artifact for '{key}': {reason}")]
    WriteFailed { key: HorseKey, reason: String },
}

impl HorseFailure {
    pub fn key(&self) -> &HorseKey {
        match self {
            HorseFailure::NameCollision { key, .. } => key,
            HorseFailure::WriteFailed { key, .. } => key,
        }
    }
}

/// Skippable data-quality issues
#[derive(Debug, Clone, PartialEq)]
pub enum DataWarning {
    /// Row dropped entirely
    MalformedRow {
        source_file: String,
        row: String,
        reason: String,
    },
    /// Field present but unusable; the record is kept with the field unknown
    UnparsableField {
        source_file: String,
        row: String,
        field: &'static str,
        raw: String,
    },
    /// Record dropped because the horse already has one for this date and file
    DuplicateRecord {
        key: HorseKey,
        race_date: NaiveDate,
        source_file: String,
        race_id: Option<String>,
    },
    /// Two kept races on the same day from different files
    SameDayRaces {
        key: HorseKey,
        race_date: NaiveDate,
    },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::MalformedRow {
                source_file,
                row,
                reason,
            } => write!(f, "{} {}: row skipped: {}", source_file, row, reason),
            DataWarning::UnparsableField {
                source_file,
                row,
                field,
                raw,
            } => write!(
                f,
                "{} {}: unparsable {} '{}', treated as unknown",
                source_file, row, field, raw
            ),
            DataWarning::DuplicateRecord {
                key,
                race_date,
                source_file,
                race_id,
            } => {
                write!(f, "duplicate record for '{}' on {} in {}", key, race_date, source_file)?;
                if let Some(race_id) = race_id {
                    write!(f, " (race {})", race_id)?;
                }
                f.write_str(" dropped")
            }
            DataWarning::SameDayRaces { key, race_date } => {
                write!(f, "'{}' has several races on {}", key, race_date)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = DataWarning::UnparsableField {
            source_file: "race.json".to_string(),
            row: "partants[2]".to_string(),
            field: "result_position",
            raw: "DNF".to_string(),
        };
        let text = warning.to_string();
        assert!(text.contains("partants[2]"));
        assert!(text.contains("DNF"));
    }

    #[test]
    fn test_duplicate_warning_names_race() {
        let warning = DataWarning::DuplicateRecord {
            key: HorseKey::new("bold runner".to_string()),
            race_date: NaiveDate::from_ymd_opt(2017, 4, 12).unwrap(),
            source_file: "race.json".to_string(),
            race_id: Some("r-1".to_string()),
        };
        assert_eq!(
            warning.to_string(),
            "duplicate record for 'bold runner' on 2017-04-12 in race.json (race r-1) dropped"
        );
    }

    #[test]
    fn test_horse_failure_key() {
        let failure = HorseFailure::NameCollision {
            key: HorseKey::new("éclair".to_string()),
            existing_key: HorseKey::new("eclair".to_string()),
            file_name: "eclair.json".to_string(),
        };
        assert_eq!(failure.key().as_str(), "éclair");
        assert!(failure.to_string().contains("eclair.json"));
    }

    #[test]
    fn test_zero_artifacts_display() {
        let summary = RunSummary {
            files_parsed: 2,
            horses_built: 1,
            ..RunSummary::default()
        };
        let err = PipelineError::ZeroArtifactsProduced {
            summary: Box::new(summary),
        };
        assert!(err.to_string().contains("2 file(s) parsed"));
    }
}
