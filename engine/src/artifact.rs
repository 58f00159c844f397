use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::executor::ArtifactPayload;

pub const DEFAULT_ARTIFACT_PREFIX: &str = "block";

/// A named artifact, held in memory until the run has succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// `<prefix>-<block index>-<ordinal>.<ext>`
    pub name: String,
    pub bytes: Vec<u8>,
    /// Index of the block that declared it.
    pub block: usize,
}

/// Names artifacts after the position of the block that produced them, so
/// an unchanged document always yields the same file names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    prefix: String,
    artifacts: Vec<Artifact>,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        ArtifactStore::new(DEFAULT_ARTIFACT_PREFIX)
    }
}

impl ArtifactStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        ArtifactStore {
            prefix: prefix.into(),
            artifacts: Vec::new(),
        }
    }

    /// Name and keep the payloads of one block; returns the names in
    /// declaration order. Ordinals start at 1.
    pub fn claim(&mut self, block: usize, payloads: Vec<ArtifactPayload>) -> Vec<String> {
        payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let name = format!(
                    "{}-{:03}-{}.{}",
                    self.prefix,
                    block,
                    i + 1,
                    payload.extension
                );
                self.artifacts.push(Artifact {
                    name: name.clone(),
                    bytes: payload.bytes,
                    block,
                });
                name
            })
            .collect()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Write artifacts into `dir`, creating it if needed.
pub fn persist(artifacts: &[Artifact], dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if artifacts.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    artifacts
        .iter()
        .map(|artifact| {
            let path = dir.join(&artifact.name);
            fs::write(&path, &artifact.bytes).map_err(|e| Error::io(&path, e))?;
            debug!(path = %path.display(), bytes = artifact.bytes.len(), "wrote artifact");
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(ext: &str) -> ArtifactPayload {
        ArtifactPayload {
            extension: ext.to_string(),
            bytes: b"data".to_vec(),
        }
    }

    #[test]
    fn names_derive_from_position() {
        let mut store = ArtifactStore::new("fig");
        let names = store.claim(7, vec![payload("svg"), payload("csv")]);
        assert_eq!(names, vec!["fig-007-1.svg", "fig-007-2.csv"]);
        assert_eq!(store.artifacts()[1].block, 7);
    }

    #[test]
    fn persist_creates_the_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut store = ArtifactStore::default();
        store.claim(0, vec![payload("txt")]);
        let dir = tmp.path().join("out/artifacts");
        let written = persist(store.artifacts(), &dir).unwrap();
        assert_eq!(written, vec![dir.join("block-000-1.txt")]);
        assert_eq!(fs::read(&written[0]).unwrap(), b"data");
    }
}
