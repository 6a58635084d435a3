//! Feature Encoding
//!
//! Turns a horse's ordered performances into fixed-arity feature vectors:
//! normalized finishing position, days since the previous race, and
//! log-scaled winner's prize.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    FeatureVector, HorseArtifact, HorseSequence, ResultPosition, FEATURE_NAMES,
};

/// Positions beyond this are treated as this (the bookmaker "music" caps at 10)
pub const DEFAULT_MAX_RESULT_POSITION: u16 = 10;
/// Prize mapped to 1.0 after log scaling
pub const DEFAULT_CASH_PRIZE_SCALE: f64 = 1_000_000.0;

/// Position was not ranked or not reported
pub const UNKNOWN_POSITION: f64 = -1.0;
/// First performance of a sequence has no gap
pub const NO_PREVIOUS_RACE: f64 = -1.0;
/// Prize missing or unusable
pub const UNKNOWN_PRIZE: f64 = -1.0;

/// Artifact layout version written by this encoder
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Encoding parameters, fixed for a whole run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub max_result_position: u16,
    pub cash_prize_scale: f64,
    /// Prepend the earliest performance's music to each artifact
    pub include_music: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_result_position: DEFAULT_MAX_RESULT_POSITION,
            cash_prize_scale: DEFAULT_CASH_PRIZE_SCALE,
            include_music: false,
        }
    }
}

/// Feature names in vector order
pub fn get_feature_names() -> Vec<&'static str> {
    FEATURE_NAMES.to_vec()
}

/// Deterministic encoder for horse sequences
#[derive(Debug, Clone, Copy)]
pub struct FeatureEncoder {
    config: EncoderConfig,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Placed positions map into (0, 1], capped at the maximum field size
    pub fn encode_position(&self, position: ResultPosition) -> f64 {
        match position {
            ResultPosition::Placed(p) => {
                let max = self.config.max_result_position.max(1);
                f64::from(p.min(max)) / f64::from(max)
            }
            ResultPosition::Unknown => UNKNOWN_POSITION,
        }
    }

    /// `ln(1 + prize) / ln(1 + scale)`, clamped to [0, 1]
    pub fn encode_prize(&self, prize: Option<f64>) -> f64 {
        match prize {
            Some(p) if p.is_finite() && p >= 0.0 => {
                let denominator = self.config.cash_prize_scale.ln_1p();
                if denominator <= 0.0 {
                    return 0.0;
                }
                (p.ln_1p() / denominator).clamp(0.0, 1.0)
            }
            _ => UNKNOWN_PRIZE,
        }
    }

    /// One vector per performance, same order
    pub fn encode(&self, sequence: &HorseSequence) -> Vec<FeatureVector> {
        let mut previous: Option<NaiveDate> = None;

        sequence
            .performances
            .iter()
            .map(|performance| {
                let days_since_previous = match previous {
                    Some(prev) => (performance.race_date - prev).num_days() as f64,
                    None => NO_PREVIOUS_RACE,
                };
                previous = Some(performance.race_date);

                FeatureVector {
                    result_position: self.encode_position(performance.result_position),
                    days_since_previous,
                    cash_prize: self.encode_prize(performance.winner_cash_prize),
                }
            })
            .collect()
    }

    /// Career prefix from the music of the earliest performance.
    ///
    /// Empty unless `include_music` is set.
    pub fn encode_music(&self, sequence: &HorseSequence) -> Vec<FeatureVector> {
        if !self.config.include_music {
            return Vec::new();
        }

        sequence
            .performances
            .first()
            .map(|first| {
                first
                    .music
                    .iter()
                    .map(|&p| FeatureVector {
                        result_position: self.encode_position(ResultPosition::Placed(p)),
                        days_since_previous: NO_PREVIOUS_RACE,
                        cash_prize: UNKNOWN_PRIZE,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Full artifact content for one horse
    pub fn build_artifact(&self, sequence: &HorseSequence) -> HorseArtifact {
        HorseArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            horse_key: sequence.key.clone(),
            performance_count: sequence.len(),
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            race_dates: sequence.performances.iter().map(|p| p.race_date).collect(),
            features: self.encode(sequence),
            music: self.encode_music(sequence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HorseKey, PerformanceRecord, FEATURE_COUNT};

    fn performance(day: u32, position: ResultPosition, prize: Option<f64>) -> PerformanceRecord {
        PerformanceRecord {
            horse_raw_name: "Bold Runner".to_string(),
            race_date: NaiveDate::from_ymd_opt(2017, 4, day).unwrap(),
            result_position: position,
            winner_cash_prize: prize,
            source_file: format!("race_{}.json", day),
            race_id: None,
            music: vec![1, 4, 2],
        }
    }

    fn sequence() -> HorseSequence {
        HorseSequence {
            key: HorseKey::new("bold runner".to_string()),
            performances: vec![
                performance(1, ResultPosition::Placed(2), Some(22_000.0)),
                performance(8, ResultPosition::Unknown, None),
                performance(8, ResultPosition::Placed(14), Some(0.0)),
                performance(20, ResultPosition::Placed(1), Some(5_000_000.0)),
            ],
        }
    }

    #[test]
    fn test_encode_position() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        assert!((encoder.encode_position(ResultPosition::Placed(1)) - 0.1).abs() < 1e-12);
        assert!((encoder.encode_position(ResultPosition::Placed(10)) - 1.0).abs() < 1e-12);
        // Capped at the maximum field size
        assert!((encoder.encode_position(ResultPosition::Placed(18)) - 1.0).abs() < 1e-12);
        assert_eq!(encoder.encode_position(ResultPosition::Unknown), UNKNOWN_POSITION);
    }

    #[test]
    fn test_encode_prize() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        assert_eq!(encoder.encode_prize(Some(0.0)), 0.0);
        assert!((encoder.encode_prize(Some(DEFAULT_CASH_PRIZE_SCALE)) - 1.0).abs() < 1e-12);
        assert_eq!(encoder.encode_prize(Some(1e12)), 1.0);
        let mid = encoder.encode_prize(Some(1000.0));
        assert!(mid > 0.0 && mid < 1.0);
        assert_eq!(encoder.encode_prize(None), UNKNOWN_PRIZE);
    }

    #[test]
    fn test_encode_sequence() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        let vectors = encoder.encode(&sequence());

        assert_eq!(vectors.len(), 4);
        assert_eq!(vectors[0].days_since_previous, NO_PREVIOUS_RACE);
        assert_eq!(vectors[1].days_since_previous, 7.0);
        assert_eq!(vectors[2].days_since_previous, 0.0);
        assert_eq!(vectors[3].days_since_previous, 12.0);

        assert_eq!(vectors[1].result_position, UNKNOWN_POSITION);
        assert_eq!(vectors[1].cash_prize, UNKNOWN_PRIZE);
        assert!((vectors[2].result_position - 1.0).abs() < 1e-12);
        assert_eq!(vectors[3].cash_prize, 1.0);

        for vector in &vectors {
            assert_eq!(vector.to_array().len(), FEATURE_COUNT);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        let again = FeatureEncoder::new(EncoderConfig::default());
        assert_eq!(encoder.encode(&sequence()), again.encode(&sequence()));
    }

    #[test]
    fn test_music_prefix() {
        let off = FeatureEncoder::new(EncoderConfig::default());
        assert!(off.encode_music(&sequence()).is_empty());

        let on = FeatureEncoder::new(EncoderConfig {
            include_music: true,
            ..EncoderConfig::default()
        });
        let music = on.encode_music(&sequence());
        assert_eq!(music.len(), 3);
        assert!((music[1].result_position - 0.4).abs() < 1e-12);
        assert_eq!(music[0].days_since_previous, NO_PREVIOUS_RACE);
        assert_eq!(music[0].cash_prize, UNKNOWN_PRIZE);
    }

    #[test]
    fn test_build_artifact() {
        let encoder = FeatureEncoder::new(EncoderConfig::default());
        let artifact = encoder.build_artifact(&sequence());

        assert_eq!(artifact.horse_key.as_str(), "bold runner");
        assert_eq!(artifact.performance_count, 4);
        assert_eq!(artifact.features.len(), artifact.race_dates.len());
        assert_eq!(artifact.feature_names, get_feature_names());
        assert!(artifact.music.is_empty());
    }
}
