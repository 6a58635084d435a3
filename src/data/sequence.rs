//! Per-horse sequence building
//!
//! Groups keyed records, sorts each group by race date (stable, so same-day
//! races keep input order) and drops repeated (date, file) pairs. Horses are
//! emitted in the order their first record was added.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::error::{DataWarning, PipelineError};
use crate::models::{HorseKey, HorseSequence, PerformanceRecord};

/// Output of a build: sequences in first-encounter order plus the warnings raised
#[derive(Debug, Default)]
pub struct SequenceBuild {
    pub sequences: Vec<HorseSequence>,
    pub warnings: Vec<DataWarning>,
}

/// Accumulates records for every horse of a run
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    groups: Vec<(HorseKey, Vec<PerformanceRecord>)>,
    /// Position of each key in `groups`
    index: HashMap<HorseKey, usize>,
    record_count: usize,
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under its resolved key. Records must arrive in input order.
    pub fn add(&mut self, key: HorseKey, record: PerformanceRecord) -> Result<(), PipelineError> {
        if key.is_empty() {
            return Err(PipelineError::InternalInvariantViolation(format!(
                "record for '{}' from {} reached the sequence builder without a key",
                record.horse_raw_name, record.source_file
            )));
        }

        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, Vec::new()));
                self.groups.len() - 1
            }
        };
        self.groups[slot].1.push(record);
        self.record_count += 1;
        Ok(())
    }

    /// Number of records added so far
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Number of distinct horses added so far
    pub fn horse_count(&self) -> usize {
        self.groups.len()
    }

    /// Sort, deduplicate and emit one sequence per horse
    pub fn build(self) -> Result<SequenceBuild, PipelineError> {
        let mut build = SequenceBuild::default();

        for (key, mut records) in self.groups {
            records.sort_by_key(|r| r.race_date);

            let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
            let mut kept: Vec<PerformanceRecord> = Vec::with_capacity(records.len());

            for record in records {
                if !seen.insert((record.race_date, record.source_file.clone())) {
                    build.warnings.push(DataWarning::DuplicateRecord {
                        key: key.clone(),
                        race_date: record.race_date,
                        source_file: record.source_file,
                        race_id: record.race_id,
                    });
                    continue;
                }

                if kept.last().is_some_and(|prev| prev.race_date == record.race_date) {
                    build.warnings.push(DataWarning::SameDayRaces {
                        key: key.clone(),
                        race_date: record.race_date,
                    });
                }
                kept.push(record);
            }

            if kept.is_empty() {
                continue;
            }

            if kept.windows(2).any(|w| w[0].race_date > w[1].race_date) {
                return Err(PipelineError::InternalInvariantViolation(format!(
                    "sequence for '{}' is not in date order after sorting",
                    key
                )));
            }

            build.sequences.push(HorseSequence {
                key,
                performances: kept,
            });
        }

        Ok(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultPosition;

    fn record(name: &str, date: (i32, u32, u32), file: &str, position: u16) -> PerformanceRecord {
        PerformanceRecord {
            horse_raw_name: name.to_string(),
            race_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            result_position: ResultPosition::Placed(position),
            winner_cash_prize: Some(10_000.0),
            source_file: file.to_string(),
            race_id: None,
            music: Vec::new(),
        }
    }

    fn key(name: &str) -> HorseKey {
        HorseKey::new(name.to_string())
    }

    #[test]
    fn test_sorts_by_date_with_stable_ties() {
        let mut builder = SequenceBuilder::new();
        builder.add(key("a"), record("A", (2017, 5, 1), "c.json", 1)).unwrap();
        builder.add(key("a"), record("A", (2017, 4, 1), "b.json", 2)).unwrap();
        builder.add(key("a"), record("A", (2017, 5, 1), "a.json", 3)).unwrap();

        let build = builder.build().unwrap();
        assert_eq!(build.sequences.len(), 1);

        let positions: Vec<_> = build.sequences[0]
            .performances
            .iter()
            .map(|p| p.result_position)
            .collect();
        assert_eq!(
            positions,
            vec![
                ResultPosition::Placed(2),
                ResultPosition::Placed(1),
                ResultPosition::Placed(3)
            ]
        );
        assert!(matches!(build.warnings[..], [DataWarning::SameDayRaces { .. }]));
    }

    #[test]
    fn test_drops_duplicate_date_and_file() {
        let mut builder = SequenceBuilder::new();
        builder.add(key("a"), record("A", (2017, 4, 1), "a.json", 1)).unwrap();
        builder.add(key("a"), record("a", (2017, 4, 1), "a.json", 5)).unwrap();
        builder.add(key("a"), record("A", (2017, 4, 1), "b.json", 2)).unwrap();

        let build = builder.build().unwrap();
        let seq = &build.sequences[0];
        assert_eq!(seq.len(), 2);
        // The first encountered record wins
        assert_eq!(seq.performances[0].result_position, ResultPosition::Placed(1));
        assert_eq!(seq.performances[1].source_file, "b.json");

        let duplicates = build
            .warnings
            .iter()
            .filter(|w| matches!(w, DataWarning::DuplicateRecord { .. }))
            .count();
        assert_eq!(duplicates, 1);
    }

    #[test]
    fn test_sequences_in_first_encounter_order() {
        let mut builder = SequenceBuilder::new();
        builder.add(key("zeta"), record("Zeta", (2017, 4, 1), "a.json", 1)).unwrap();
        builder.add(key("alpha"), record("Alpha", (2017, 4, 1), "a.json", 2)).unwrap();
        builder.add(key("zeta"), record("Zeta", (2017, 4, 8), "b.json", 3)).unwrap();
        assert_eq!(builder.horse_count(), 2);
        assert_eq!(builder.record_count(), 3);

        let build = builder.build().unwrap();
        let keys: Vec<_> = build.sequences.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(build.sequences[0].len(), 2);
    }

    #[test]
    fn test_unkeyed_record_is_fatal() {
        let mut builder = SequenceBuilder::new();
        let err = builder
            .add(key(""), record("!!", (2017, 4, 1), "a.json", 1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InternalInvariantViolation(_)));
    }

    #[test]
    fn test_empty_builder() {
        let build = SequenceBuilder::new().build().unwrap();
        assert!(build.sequences.is_empty());
        assert!(build.warnings.is_empty());
    }
}
