use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of features in every encoded performance
pub const FEATURE_COUNT: usize = 3;

/// Feature names in encoding order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["result_position", "days_since_previous", "cash_prize"];

/// Finishing position of a horse in one race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultPosition {
    /// Ranked finish, 1 = winner
    Placed(u16),
    /// Disqualified, fell, not ranked, or not reported
    Unknown,
}

/// One horse's performance in one race, as parsed from a raw file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub horse_raw_name: String,
    pub race_date: NaiveDate,
    pub result_position: ResultPosition,
    /// Prize paid to the race winner; `None` when missing or unusable
    pub winner_cash_prize: Option<f64>,
    pub source_file: String,
    #[serde(default)]
    pub race_id: Option<String>,
    /// Prior finishing positions from the bookmaker "musique" string
    #[serde(default)]
    pub music: Vec<u16>,
}

/// Canonical identity of a horse within one run.
///
/// Only the identity resolver creates keys; deserialization accepts any
/// string so stored artifacts can be loaded back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HorseKey(String);

impl HorseKey {
    pub(crate) fn new(normalized: String) -> Self {
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for HorseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chronologically ordered performances of one horse
#[derive(Debug, Clone, PartialEq)]
pub struct HorseSequence {
    pub key: HorseKey,
    /// Sorted by race date ascending, ties in input order
    pub performances: Vec<PerformanceRecord>,
}

impl HorseSequence {
    pub fn len(&self) -> usize {
        self.performances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.performances.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.performances.first().map(|p| p.race_date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.performances.last().map(|p| p.race_date)
    }
}

/// Encoded features of one performance.
///
/// Serialized as a plain `[position, gap, prize]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct FeatureVector {
    pub result_position: f64,
    pub days_since_previous: f64,
    pub cash_prize: f64,
}

impl FeatureVector {
    /// Flat vector in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [self.result_position, self.days_since_previous, self.cash_prize]
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            result_position: values[0],
            days_since_previous: values[1],
            cash_prize: values[2],
        }
    }
}

impl From<FeatureVector> for [f64; FEATURE_COUNT] {
    fn from(vector: FeatureVector) -> Self {
        vector.to_array()
    }
}

/// On-disk content of one horse's augmented music
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorseArtifact {
    pub format_version: u32,
    pub horse_key: HorseKey,
    pub performance_count: usize,
    pub feature_names: Vec<String>,
    /// Race date of each entry of `features`
    pub race_dates: Vec<NaiveDate>,
    pub features: Vec<FeatureVector>,
    /// Career prefix taken from the earliest performance's music
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub music: Vec<FeatureVector>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_serializes_as_array() {
        let vector = FeatureVector {
            result_position: 0.3,
            days_since_previous: -1.0,
            cash_prize: 0.71,
        };
        let json = serde_json::to_string(&vector).unwrap();
        assert_eq!(json, "[0.3,-1.0,0.71]");

        let back: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vector);
    }

    #[test]
    fn test_feature_vector_rejects_wrong_arity() {
        assert!(serde_json::from_str::<FeatureVector>("[0.1,0.2]").is_err());
    }

    #[test]
    fn test_horse_key_is_transparent() {
        let key = HorseKey::new("bold runner".to_string());
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"bold runner\"");
        assert_eq!(key.to_string(), "bold runner");
    }

    #[test]
    fn test_sequence_dates() {
        let record = |day: u32| PerformanceRecord {
            horse_raw_name: "Bold Runner".to_string(),
            race_date: NaiveDate::from_ymd_opt(2017, 4, day).unwrap(),
            result_position: ResultPosition::Placed(1),
            winner_cash_prize: Some(1000.0),
            source_file: "a.json".to_string(),
            race_id: None,
            music: Vec::new(),
        };
        let seq = HorseSequence {
            key: HorseKey::new("bold runner".to_string()),
            performances: vec![record(2), record(9)],
        };
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.first_date(), NaiveDate::from_ymd_opt(2017, 4, 2));
        assert_eq!(seq.last_date(), NaiveDate::from_ymd_opt(2017, 4, 9));
    }
}
