//! Single-file agent checkpoint archive
//!
//! An archive is a gzip-compressed bincode container of named members.
//! Every agent writes two: [`PARAMETERS_MEMBER`], the bincode-encoded
//! parameter blob, and [`STATE_MEMBER`], a JSON record of hyperparameters
//! and the exact random-generator state.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use curricula_core::{AgentFamily, RLError, Result};

/// Member holding the function-approximator parameters
pub const PARAMETERS_MEMBER: &str = "network.bin";
/// Member holding the configuration record
pub const STATE_MEMBER: &str = "state.agent.json";

const EXTENSION: &str = "agent";

/// Normalise a user-supplied path to the archive file name
#[must_use]
pub fn archive_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == EXTENSION) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(EXTENSION);
        PathBuf::from(name)
    }
}

/// In-memory archive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentArchive {
    members: BTreeMap<String, Vec<u8>>,
    #[serde(skip)]
    source: PathBuf,
}

#[derive(Deserialize)]
struct FamilyTag {
    family: AgentFamily,
}

impl AgentArchive {
    /// Empty archive
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a member as bincode
    pub fn insert_bincode<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.members.insert(name.to_string(), bincode::serialize(value)?);
        Ok(())
    }

    /// Store a member as pretty JSON
    pub fn insert_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.members.insert(name.to_string(), serde_json::to_vec_pretty(value)?);
        Ok(())
    }

    /// Raw bytes of a member
    pub fn member(&self, name: &str) -> Result<&[u8]> {
        self.members
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| RLError::Checkpoint {
                path: self.source.clone(),
                reason: format!("missing member {name}"),
            })
    }

    /// Decode a bincode member
    pub fn bincode<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(bincode::deserialize(self.member(name)?)?)
    }

    /// Decode a JSON member
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(serde_json::from_slice(self.member(name)?)?)
    }

    /// Family recorded in the state member
    pub fn family(&self) -> Result<AgentFamily> {
        Ok(self.json::<FamilyTag>(STATE_MEMBER)?.family)
    }

    /// Names of all members
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Write the archive next to `path`, returning the absolute file name
    ///
    /// The bytes go to a temporary sibling first and are renamed into place.
    pub async fn write(&self, path: &Path) -> Result<PathBuf> {
        let path = archive_path(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bincode::serialize(&self.members)?)?;
        let bytes = encoder.finish()?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(tokio::fs::canonicalize(&path).await?)
    }

    /// Read an archive written by [`AgentArchive::write`]
    pub async fn read(path: &Path) -> Result<Self> {
        let path = archive_path(path);
        let bytes = tokio::fs::read(&path).await?;
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| RLError::Checkpoint {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let members = bincode::deserialize(&decoded)?;
        Ok(Self { members, source: path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path() {
        assert_eq!(archive_path(Path::new("out/run")), PathBuf::from("out/run.agent"));
        assert_eq!(archive_path(Path::new("out/run.agent")), PathBuf::from("out/run.agent"));
        assert_eq!(archive_path(Path::new("out/nocurr.v1")), PathBuf::from("out/nocurr.v1.agent"));
    }

    #[tokio::test]
    async fn test_write_read_members() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = AgentArchive::new();
        archive.insert_bincode(PARAMETERS_MEMBER, &vec![1.5f32, -2.0]).unwrap();
        archive
            .insert_json(STATE_MEMBER, &serde_json::json!({ "family": "dqn", "gamma": 0.9 }))
            .unwrap();
        let written = archive.write(&dir.path().join("nested/agent")).await.unwrap();
        assert!(written.ends_with("nested/agent.agent"));

        let restored = AgentArchive::read(&dir.path().join("nested/agent")).await.unwrap();
        assert_eq!(restored.bincode::<Vec<f32>>(PARAMETERS_MEMBER).unwrap(), vec![1.5, -2.0]);
        assert_eq!(restored.family().unwrap(), AgentFamily::Dqn);
        assert!(matches!(restored.member("missing"), Err(RLError::Checkpoint { .. })));
    }
}
