//! Sub-graph artifact encode/decode.
//!
//! Binary artifacts use bincode with the standard config; JSON is kept for
//! inspection and hand-written fixtures. Files are named `stage_<i>.bin` or
//! `stage_<i>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use stagecut_types::stage::SubGraph;

use crate::error::{Result, SplitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    #[default]
    Bincode,
    Json,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Bincode => "bin",
            Self::Json => "json",
        }
    }

    /// Guess the format from a file extension; anything but `.json` is binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Bincode,
        }
    }
}

pub fn encode<T: Serialize>(value: &T, format: ArtifactFormat) -> Result<Vec<u8>> {
    match format {
        ArtifactFormat::Bincode => bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| SplitError::Serialization(e.to_string())),
        ArtifactFormat::Json => {
            serde_json::to_vec_pretty(value).map_err(|e| SplitError::Serialization(e.to_string()))
        }
    }
}

pub fn decode<T: DeserializeOwned>(data: &[u8], format: ArtifactFormat) -> Result<T> {
    match format {
        ArtifactFormat::Bincode => {
            let (value, _) =
                bincode::serde::decode_from_slice(data, bincode::config::standard())
                    .map_err(|e| SplitError::Serialization(e.to_string()))?;
            Ok(value)
        }
        ArtifactFormat::Json => {
            serde_json::from_slice(data).map_err(|e| SplitError::Serialization(e.to_string()))
        }
    }
}

/// Write one artifact per stage into `dir`, returning the paths in stage order.
///
/// Every stage is encoded and written under a `.tmp` name first; the final
/// names only appear once all writes succeeded, so a failed call leaves no
/// `stage_<i>` files behind.
pub fn write_artifacts(dir: &Path, subs: &[SubGraph], format: ArtifactFormat) -> Result<Vec<PathBuf>> {
    let encoded = subs
        .iter()
        .map(|sub| encode(sub, format).map(|bytes| (sub.stage, bytes)))
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dir)?;
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(encoded.len());
    for (stage, bytes) in &encoded {
        let path = dir.join(format!("stage_{stage}.{}", format.extension()));
        let tmp = path.with_extension(format!("{}.tmp", format.extension()));
        if let Err(e) = fs::write(&tmp, bytes) {
            discard(staged.iter().map(|(tmp, _)| tmp));
            return Err(e.into());
        }
        staged.push((tmp, path));
    }

    let mut paths = Vec::with_capacity(staged.len());
    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            discard(paths.iter().chain(staged[i..].iter().map(|(tmp, _)| tmp)));
            return Err(e.into());
        }
        info!(stage = encoded[i].0, path = %path.display(), "wrote stage artifact");
        paths.push(path.clone());
    }
    Ok(paths)
}

/// Best-effort removal of files from an aborted write.
fn discard<'p>(paths: impl Iterator<Item = &'p PathBuf>) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

pub fn read_artifact(path: &Path) -> Result<SubGraph> {
    let data = fs::read(path)?;
    decode(&data, ArtifactFormat::from_path(path))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
