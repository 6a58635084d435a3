//! Record parsing, identity resolution, sequence building and feature encoding

pub mod features;
pub mod identity;
pub mod parser;
pub mod sequence;

// Re-export commonly used types
pub use features::{get_feature_names, EncoderConfig, FeatureEncoder};
pub use identity::{normalize_name, IdentityResolver};
pub use parser::{Field, ParsedRecord, RaceFileParser, RaceFileRows};
pub use sequence::{SequenceBuild, SequenceBuilder};
