//! Publishing backends.
//!
//! A backend stores the files of a build somewhere they can be served from
//! and hands back a reference for each. Two variants exist: a local mirror
//! directory and GitHub releases. The variant is picked from configuration
//! once, at construction.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::{Asset, Release, RemoteBackend};

use std::io;
use std::path::PathBuf;

use crate::artifact::{Build, File};
use crate::config::{BackendKind, Config};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}: no local copy to upload")]
    MissingLocalPath(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} failed with status {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },
}

/// Capability every publishing backend provides.
///
/// Removal is best effort: a build or file that is already gone is not an
/// error. Any other failure is returned and aborts the work on that build.
pub trait Backend {
    /// Whether the build currently exists in the backend.
    fn is_uploaded(&mut self, build: &Build) -> Result<bool, BackendError>;

    /// Upload every file of the build, setting each file's reference.
    fn upload(&mut self, build: &mut Build) -> Result<(), BackendError>;

    /// Remove the build from the backend.
    fn unupload(&mut self, build: &Build) -> Result<(), BackendError>;

    /// Add one file to an already uploaded build, setting its reference.
    fn upload_file(&mut self, build: &Build, file: &mut File) -> Result<(), BackendError>;

    /// Remove one file from an uploaded build.
    fn remove_file(&mut self, build: &Build, file: &File) -> Result<(), BackendError>;

    /// Drop the local copy of a build that will never be published.
    ///
    /// Only backends serving the builds tree itself have anything to do.
    fn discard(&mut self, _build: &Build) -> Result<(), BackendError> {
        Ok(())
    }
}

/// The configured backend.
#[derive(Debug)]
pub enum AnyBackend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

impl AnyBackend {
    /// Build the backend selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        match config.backend_kind() {
            BackendKind::Local => Ok(AnyBackend::Local(LocalBackend::from_config(config))),
            BackendKind::Remote => Ok(AnyBackend::Remote(RemoteBackend::from_config(config)?)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            AnyBackend::Local(_) => BackendKind::Local,
            AnyBackend::Remote(_) => BackendKind::Remote,
        }
    }
}

impl Backend for AnyBackend {
    fn is_uploaded(&mut self, build: &Build) -> Result<bool, BackendError> {
        match self {
            AnyBackend::Local(b) => b.is_uploaded(build),
            AnyBackend::Remote(b) => b.is_uploaded(build),
        }
    }

    fn upload(&mut self, build: &mut Build) -> Result<(), BackendError> {
        match self {
            AnyBackend::Local(b) => b.upload(build),
            AnyBackend::Remote(b) => b.upload(build),
        }
    }

    fn unupload(&mut self, build: &Build) -> Result<(), BackendError> {
        match self {
            AnyBackend::Local(b) => b.unupload(build),
            AnyBackend::Remote(b) => b.unupload(build),
        }
    }

    fn upload_file(&mut self, build: &Build, file: &mut File) -> Result<(), BackendError> {
        match self {
            AnyBackend::Local(b) => b.upload_file(build, file),
            AnyBackend::Remote(b) => b.upload_file(build, file),
        }
    }

    fn remove_file(&mut self, build: &Build, file: &File) -> Result<(), BackendError> {
        match self {
            AnyBackend::Local(b) => b.remove_file(build, file),
            AnyBackend::Remote(b) => b.remove_file(build, file),
        }
    }

    fn discard(&mut self, build: &Build) -> Result<(), BackendError> {
        match self {
            AnyBackend::Local(b) => b.discard(build),
            AnyBackend::Remote(b) => b.discard(build),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_local_without_token() {
        let config = Config::parse_json(r#"{"builds_path": "a", "builds_json_path": "b"}"#).unwrap();
        let backend = AnyBackend::from_config(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Local);
    }

    #[test]
    fn test_selects_remote_with_token() {
        let config = Config::parse_json(
            r#"{"builds_path": "a", "builds_json_path": "b", "github_token": "t"}"#,
        )
        .unwrap();
        let backend = AnyBackend::from_config(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Remote);
    }
}
