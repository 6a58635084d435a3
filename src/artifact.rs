//! Artifact storage
//!
//! One pretty-printed JSON file per horse, written through a temporary file
//! in the destination directory and renamed into place.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::data::features::EncoderConfig;
use crate::error::HorseFailure;
use crate::models::{HorseArtifact, HorseKey};

pub const ARTIFACT_EXTENSION: &str = "json";
pub const MANIFEST_FILE_NAME: &str = "_manifest.json";

/// Longest file stem produced for an artifact, in bytes
const MAX_STEM_LEN: usize = 96;

/// Filesystem-safe stem for a key: ASCII letters and digits separated by `_`.
///
/// The mapping is lossy. Accents are folded away, and a key with no
/// ASCII-foldable character at all (`東京`, `ドバイ`) becomes `_`, so every
/// such key after the first claimed is reported as a name collision.
pub fn safe_file_stem(key: &HorseKey) -> String {
    let mut stem = String::with_capacity(key.as_str().len());
    let mut pending_separator = false;

    for ch in key.as_str().nfkd().filter(|c| !is_combining_mark(*c)) {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !stem.is_empty() {
                stem.push('_');
            }
            pending_separator = false;
            stem.push(ch);
        } else {
            pending_separator = true;
        }
    }

    stem.truncate(MAX_STEM_LEN);
    let stem = stem.trim_end_matches('_');
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem.to_string()
    }
}

/// Artifact file name for a key
pub fn artifact_file_name(key: &HorseKey) -> String {
    format!("{}.{}", safe_file_stem(key), ARTIFACT_EXTENSION)
}

/// Writes artifacts into one directory, refusing to reuse a name for a
/// different key
#[derive(Debug)]
pub struct ArtifactWriter {
    destination: PathBuf,
    claimed: HashMap<String, HorseKey>,
}

impl ArtifactWriter {
    pub fn new<P: AsRef<Path>>(destination: P) -> Self {
        Self {
            destination: destination.as_ref().to_path_buf(),
            claimed: HashMap::new(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Create the destination directory if absent
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.destination)
    }

    /// Final path of a key's artifact, without claiming it
    pub fn artifact_path(&self, key: &HorseKey) -> PathBuf {
        self.destination.join(artifact_file_name(key))
    }

    /// Reserve the artifact name for a key.
    ///
    /// Claiming the same key twice returns the same path.
    pub fn claim(&mut self, key: &HorseKey) -> Result<PathBuf, HorseFailure> {
        let file_name = artifact_file_name(key);

        match self.claimed.get(&file_name) {
            Some(existing) if existing == key => {}
            Some(existing) => {
                return Err(HorseFailure::NameCollision {
                    key: key.clone(),
                    existing_key: existing.clone(),
                    file_name,
                })
            }
            None => {
                self.claimed.insert(file_name.clone(), key.clone());
            }
        }

        Ok(self.destination.join(file_name))
    }

    /// Write an artifact to a path obtained from [`claim`](Self::claim).
    ///
    /// Takes `&self` so claimed artifacts can be written concurrently.
    pub fn write(&self, path: &Path, artifact: &HorseArtifact) -> Result<(), HorseFailure> {
        if !path.starts_with(&self.destination) {
            return Err(HorseFailure::WriteFailed {
                key: artifact.horse_key.clone(),
                reason: format!("{} is outside {}", path.display(), self.destination.display()),
            });
        }
        write_artifact(path, artifact).map_err(|e| HorseFailure::WriteFailed {
            key: artifact.horse_key.clone(),
            reason: e.to_string(),
        })
    }
}

/// Atomically write an artifact to `path`
pub fn write_artifact(path: &Path, artifact: &HorseArtifact) -> io::Result<()> {
    write_json_atomic(path, artifact)
}

/// Read an artifact back
pub fn load_artifact<P: AsRef<Path>>(path: P) -> io::Result<HorseArtifact> {
    read_json(path.as_ref())
}

/// Manifest line for one written artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub horse_key: HorseKey,
    pub file_name: String,
    pub performance_count: usize,
}

/// Index of the artifacts written by a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub format_version: u32,
    pub encoder: EncoderConfig,
    pub feature_names: Vec<String>,
    pub artifacts: Vec<ManifestEntry>,
}

pub fn write_manifest(destination: &Path, manifest: &RunManifest) -> io::Result<PathBuf> {
    let path = destination.join(MANIFEST_FILE_NAME);
    write_json_atomic(&path, manifest)?;
    Ok(path)
}

pub fn load_manifest<P: AsRef<Path>>(destination: P) -> io::Result<RunManifest> {
    read_json(&destination.as_ref().join(MANIFEST_FILE_NAME))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
