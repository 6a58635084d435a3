//! Raw race file parser
//!
//! Reads one scraped race file (JSON, UTF-8 or Windows-1252) and yields one
//! performance record per runner.
//!
//! # Example
//!
//! ```no_run
//! use race_music::data::parser::RaceFileParser;
//! use std::path::Path;
//!
//! let parser = RaceFileParser::new();
//! for row in parser.parse_file(Path::new("race_2017_04_12.json")).unwrap() {
//!     match row {
//!         Ok(parsed) => println!("{} on {}", parsed.record.horse_raw_name, parsed.record.race_date),
//!         Err(warning) => println!("skipped: {}", warning),
//!     }
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use encoding_rs::WINDOWS_1252;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{DataWarning, ParseError};
use crate::models::{PerformanceRecord, ResultPosition};

const HORSE_NAME_KEYS: &[&str] = &["horse.name", "horse_name", "name", "horse.genyId"];
const RACE_DATE_KEYS: &[&str] = &["race_date", "date", "raceScheduledStartEpochMs"];
const POSITION_KEYS: &[&str] = &["result_position", "results.position", "position"];
const PRIZE_KEYS: &[&str] = &["winner_cash_prize", "priceFirst", "price.first"];
const RACE_ID_KEYS: &[&str] = &["race_id", "raceId", "genyId"];
const MUSIC_KEYS: &[&str] = &["musique", "music"];

/// Key holding the runners of a race object
const RUNNERS_KEY: &str = "partants";

/// Flattened view of a JSON object with dotted keys
type FlatRow = BTreeMap<String, Value>;

/// Outcome of reading one field from a raw row
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Parsed(T),
    /// Present but unusable; carries the raw text
    Unknown(String),
    /// Missing or null
    Absent,
}

/// A record plus the field-level warnings raised while building it
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub record: PerformanceRecord,
    pub warnings: Vec<DataWarning>,
}

/// Race file parser
pub struct RaceFileParser {
    year_marker_pattern: Regex,
    music_position_pattern: Regex,
}

impl Default for RaceFileParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RaceFileParser {
    pub fn new() -> Self {
        Self {
            year_marker_pattern: Regex::new(r"\([^)]*\)").unwrap(),
            music_position_pattern: Regex::new(r"[1-9]+").unwrap(),
        }
    }

    /// Open a race file and return its rows.
    ///
    /// The returned iterator makes a single pass over the runners. Errors here
    /// mean the whole file is unusable.
    pub fn parse_file(&self, path: &Path) -> Result<RaceFileRows<'_>, ParseError> {
        let content = read_race_file(path)?;
        let document: Value = serde_json::from_str(&content)?;
        let source_file = path.to_string_lossy().to_string();

        let (race, rows, label) = match document {
            Value::Object(mut map) => {
                let runners = match map.remove(RUNNERS_KEY) {
                    Some(Value::Array(runners)) => runners,
                    Some(_) => {
                        return Err(ParseError::Layout(format!(
                            "'{}' is not an array",
                            RUNNERS_KEY
                        )))
                    }
                    None => {
                        return Err(ParseError::Layout(format!(
                            "object without '{}'",
                            RUNNERS_KEY
                        )))
                    }
                };
                let mut race = FlatRow::new();
                flatten_into("", &Value::Object(map), &mut race);
                (race, runners, RUNNERS_KEY)
            }
            Value::Array(rows) => (FlatRow::new(), rows, "rows"),
            _ => {
                return Err(ParseError::Layout(
                    "expected a race object or an array of rows".to_string(),
                ))
            }
        };

        Ok(RaceFileRows {
            parser: self,
            source_file,
            race,
            rows: rows.into_iter().enumerate(),
            label,
        })
    }

    /// Extract prior finishing positions from a music string.
    ///
    /// `1a2a(16)3a` gives `[1, 2, 3]`: year markers in parentheses are removed
    /// and `0` (unplaced) separates like any other non-position character.
    pub fn parse_music(&self, music: &str) -> Vec<u16> {
        let cleaned = self.year_marker_pattern.replace_all(music, " ");
        self.music_position_pattern
            .find_iter(&cleaned)
            .filter_map(|m| m.as_str().parse().ok())
            .collect()
    }

    /// Build a record from a runner row.
    ///
    /// Identity, position and music come from the runner alone. Date, prize
    /// and race id fall back to the enclosing race when the runner lacks them.
    fn build_record(
        &self,
        runner: &FlatRow,
        race: &FlatRow,
        row_id: String,
        source_file: &str,
    ) -> Result<ParsedRecord, DataWarning> {
        let malformed = |reason: String| DataWarning::MalformedRow {
            source_file: source_file.to_string(),
            row: row_id.clone(),
            reason,
        };

        let horse_raw_name = match lookup(runner, HORSE_NAME_KEYS).and_then(value_text) {
            Some(name) if name.chars().any(char::is_alphanumeric) => name.trim().to_string(),
            Some(name) => return Err(malformed(format!("blank horse name '{}'", name))),
            None => return Err(malformed("missing horse name".to_string())),
        };

        let race_date = match parse_date_field(inherited(runner, race, RACE_DATE_KEYS)) {
            Field::Parsed(date) => date,
            Field::Unknown(raw) => return Err(malformed(format!("unparsable race date '{}'", raw))),
            Field::Absent => return Err(malformed("missing race date".to_string())),
        };

        let mut warnings = Vec::new();
        let mut unparsable = |field: &'static str, raw: String| {
            warnings.push(DataWarning::UnparsableField {
                source_file: source_file.to_string(),
                row: row_id.clone(),
                field,
                raw,
            })
        };

        let result_position = match parse_position_field(lookup(runner, POSITION_KEYS)) {
            Field::Parsed(position) => ResultPosition::Placed(position),
            Field::Unknown(raw) => {
                unparsable("result_position", raw);
                ResultPosition::Unknown
            }
            Field::Absent => ResultPosition::Unknown,
        };

        let winner_cash_prize = match parse_prize_field(inherited(runner, race, PRIZE_KEYS)) {
            Field::Parsed(prize) => Some(prize),
            Field::Unknown(raw) => {
                unparsable("winner_cash_prize", raw);
                None
            }
            Field::Absent => None,
        };

        let race_id = inherited(runner, race, RACE_ID_KEYS).and_then(value_text);
        let music = lookup(runner, MUSIC_KEYS)
            .and_then(Value::as_str)
            .map(|m| self.parse_music(m))
            .unwrap_or_default();

        Ok(ParsedRecord {
            record: PerformanceRecord {
                horse_raw_name,
                race_date,
                result_position,
                winner_cash_prize,
                source_file: source_file.to_string(),
                race_id,
                music,
            },
            warnings,
        })
    }
}

/// Single-pass iterator over the rows of one race file
pub struct RaceFileRows<'a> {
    parser: &'a RaceFileParser,
    source_file: String,
    race: FlatRow,
    rows: std::iter::Enumerate<std::vec::IntoIter<Value>>,
    label: &'static str,
}

impl Iterator for RaceFileRows<'_> {
    type Item = Result<ParsedRecord, DataWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, value) = self.rows.next()?;
        let row_id = format!("{}[{}]", self.label, index);

        if !value.is_object() {
            return Some(Err(DataWarning::MalformedRow {
                source_file: self.source_file.clone(),
                row: row_id,
                reason: "row is not an object".to_string(),
            }));
        }

        let mut runner = FlatRow::new();
        flatten_into("", &value, &mut runner);

        Some(
            self.parser
                .build_record(&runner, &self.race, row_id, &self.source_file),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// Read file as UTF-8, falling back to Windows-1252
fn read_race_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let (decoded, _, _) = WINDOWS_1252.decode(e.as_bytes());
            decoded.into_owned()
        }
    };

    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Flatten nested objects into dotted keys (`horse.name`)
fn flatten_into(prefix: &str, value: &Value, out: &mut FlatRow) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, inner, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// First alias present in the row; a present null still counts as a match
fn lookup<'a>(row: &'a FlatRow, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| row.get(*key))
}

/// Runner value first, then the race-level one
fn inherited<'a>(runner: &'a FlatRow, race: &'a FlatRow, keys: &[&str]) -> Option<&'a Value> {
    lookup(runner, keys).or_else(|| lookup(race, keys))
}

/// Text of a string or number value
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a race date: epoch milliseconds or a date string
pub fn parse_date_field(value: Option<&Value>) -> Field<NaiveDate> {
    let value = match value {
        None | Some(Value::Null) => return Field::Absent,
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(date_from_epoch_ms),
        Value::String(s) if s.trim().is_empty() => return Field::Absent,
        Value::String(s) => parse_date_text(s),
        _ => None,
    };

    match parsed {
        Some(date) => Field::Parsed(date),
        None => Field::Unknown(raw_text(value)),
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let all_digits = !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit());

    if all_digits && text.len() == 8 {
        let year = text[0..4].parse().ok()?;
        let month = text[4..6].parse().ok()?;
        let day = text[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if all_digits {
        return text.parse().ok().and_then(date_from_epoch_ms);
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

fn date_from_epoch_ms(ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// Parse a finishing position; only positive integers are placed
pub fn parse_position_field(value: Option<&Value>) -> Field<u16> {
    let value = match value {
        None | Some(Value::Null) => return Field::Absent,
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match parsed.and_then(|p| u16::try_from(p).ok()).filter(|p| *p > 0) {
        Some(position) => Field::Parsed(position),
        None => Field::Unknown(raw_text(value)),
    }
}

/// Parse a non-negative cash amount
pub fn parse_prize_field(value: Option<&Value>) -> Field<f64> {
    let value = match value {
        None | Some(Value::Null) => return Field::Absent,
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Field::Absent,
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };

    match parsed.filter(|p| p.is_finite() && *p >= 0.0) {
        Some(prize) => Field::Parsed(prize),
        None => Field::Unknown(raw_text(value)),
    }
}
