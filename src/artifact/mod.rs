//! Build artifact state and file helpers

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What the build ultimately produced
///
/// Starts as `NoArtifact`, becomes `Packaged` on cascade success, or
/// `ArchiveOnly` when every strategy is exhausted but the upstream archive
/// still exists. Reporting is the terminal consumer; the state lives only
/// for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "path", rename_all = "snake_case")]
pub enum BuildArtifactState {
    NoArtifact,
    ArchiveOnly(PathBuf),
    Packaged(PathBuf),
}

impl BuildArtifactState {
    /// Resolve the terminal artifact state after the cascade finishes
    pub fn resolve(package: Option<PathBuf>, archive_path: &Path) -> Self {
        match package {
            Some(path) => BuildArtifactState::Packaged(path),
            None if archive_path.exists() => {
                BuildArtifactState::ArchiveOnly(archive_path.to_path_buf())
            }
            None => BuildArtifactState::NoArtifact,
        }
    }

    /// Whether anything distributable (or manually exportable) exists
    pub fn has_artifact(&self) -> bool {
        !matches!(self, BuildArtifactState::NoArtifact)
    }
}

/// Streaming SHA-256 of a file
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Size of a file in bytes
pub fn file_size(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_packaged_wins() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("App.xcarchive");
        fs::create_dir(&archive).unwrap();

        let state =
            BuildArtifactState::resolve(Some(PathBuf::from("out/app.ipa")), &archive);
        assert_eq!(
            state,
            BuildArtifactState::Packaged(PathBuf::from("out/app.ipa"))
        );
        assert!(state.has_artifact());
    }

    #[test]
    fn test_resolve_archive_only() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("App.xcarchive");
        fs::create_dir(&archive).unwrap();

        let state = BuildArtifactState::resolve(None, &archive);
        assert_eq!(state, BuildArtifactState::ArchiveOnly(archive));
        assert!(state.has_artifact());
    }

    #[test]
    fn test_resolve_no_artifact() {
        let dir = TempDir::new().unwrap();
        let state = BuildArtifactState::resolve(None, &dir.path().join("missing.xcarchive"));
        assert_eq!(state, BuildArtifactState::NoArtifact);
        assert!(!state.has_artifact());
    }

    #[test]
    fn test_file_sha256_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"hello").unwrap();

        let digest = file_sha256(&path).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(file_size(&path).unwrap(), 5);
    }
}
