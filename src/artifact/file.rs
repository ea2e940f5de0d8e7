//! A single physical artifact and its content digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read buffer size used while hashing artifacts.
const HASH_CHUNK_SIZE: usize = 128 * 1024;

/// One physical artifact tracked by the manifest.
///
/// Equality is by `filename` and `sha256` only: a file that moved on disk, or
/// that has been uploaded since, is still the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    /// Local path; only known for freshly scanned files
    #[serde(skip)]
    pub path: Option<PathBuf>,

    /// Artifact filename
    pub filename: String,

    /// Backend reference, null until uploaded
    #[serde(rename = "filepath")]
    pub reference: Option<String>,

    /// Lowercase hex SHA-256 of the full content
    pub sha256: String,

    /// Size in bytes
    pub size: u64,
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.filename == other.filename && self.sha256 == other.sha256
    }
}

impl Eq for File {}

impl File {
    /// Hash and stat a file on disk.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no filename", path.display()),
                )
            })?;

        let size = fs::metadata(path)?.len();
        let sha256 = compute_file_sha256(path)?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            filename,
            reference: None,
            sha256,
            size,
        })
    }

    /// Whether the backend has handed out a reference for this file.
    pub fn is_uploaded(&self) -> bool {
        self.reference.is_some()
    }
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
pub fn compute_file_sha256(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_path_hashes_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lineage-17.1-20200422-UNOFFICIAL-bardock.zip");
        fs::write(&path, b"hello").unwrap();

        let file = File::from_path(&path).unwrap();
        assert_eq!(file.filename, "lineage-17.1-20200422-UNOFFICIAL-bardock.zip");
        assert_eq!(file.size, 5);
        assert_eq!(
            file.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(file.path.as_deref(), Some(path.as_path()));
        assert!(!file.is_uploaded());
    }

    #[test]
    fn test_hash_spans_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.zip");
        let content = vec![7u8; HASH_CHUNK_SIZE * 2 + 17];
        fs::write(&path, &content).unwrap();

        let expected = hex::encode(Sha256::digest(&content));
        assert_eq!(compute_file_sha256(&path).unwrap(), expected);
    }

    #[test]
    fn test_equality_ignores_path_and_reference() {
        let a = File {
            path: Some(PathBuf::from("/a/x.zip")),
            filename: "x.zip".to_string(),
            reference: None,
            sha256: "abc".to_string(),
            size: 1,
        };
        let mut b = a.clone();
        b.path = None;
        b.reference = Some("bardock/x.zip".to_string());
        assert_eq!(a, b);

        b.sha256 = "def".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_serialized_shape() {
        let file = File {
            path: Some(PathBuf::from("/local/x.zip")),
            filename: "x.zip".to_string(),
            reference: None,
            sha256: "abc".to_string(),
            size: 3,
        };
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"filename": "x.zip", "filepath": null, "sha256": "abc", "size": 3})
        );

        let back: File = serde_json::from_value(value).unwrap();
        assert!(back.path.is_none());
        assert_eq!(back, file);
    }
}
