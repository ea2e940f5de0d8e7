//! Manifest file storage and scoped read-modify-write sessions.
//!
//! A session loads the whole manifest on open and writes it back on close.
//! Closing persists even when the work inside the session failed part way:
//! whatever was reconciled before the failure is recorded, and the next run
//! repairs the rest. There is no locking; callers serialize access.

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::{Manifest, ManifestError};

/// Location of a manifest file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest; a missing file is an empty manifest.
    pub fn load(&self) -> Result<Manifest, ManifestError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "manifest not found, starting empty");
            return Ok(Manifest::new());
        }

        let json = fs::read_to_string(&self.path).map_err(|source| ManifestError::Io {
            path: self.path.clone(),
            source,
        })?;
        Manifest::from_json(&json)
    }

    /// Rewrite the manifest file in full.
    ///
    /// Writes a sibling temp file first and renames it over the target.
    pub fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let json = manifest.to_json()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ManifestError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(format!(".tmp.{}", std::process::id()));
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, json).map_err(|source| ManifestError::Io {
            path: temp_path.clone(),
            source,
        })?;

        if let Err(source) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(ManifestError::Io {
                path: self.path.clone(),
                source,
            });
        }

        Ok(())
    }

    /// Open a read-modify-write session.
    pub fn session(&self) -> Result<ManifestSession, ManifestError> {
        let manifest = self.load()?;
        Ok(ManifestSession {
            store: self.clone(),
            manifest,
            committed: false,
        })
    }
}

/// A loaded manifest that is written back when the session ends.
///
/// `commit` reports write errors; a session dropped without `commit` (early
/// return, error path, panic) still writes, logging any failure.
#[derive(Debug)]
pub struct ManifestSession {
    store: ManifestStore,
    manifest: Manifest,
    committed: bool,
}

impl ManifestSession {
    /// Write the manifest back and end the session.
    pub fn commit(mut self) -> Result<(), ManifestError> {
        self.committed = true;
        self.store.save(&self.manifest)
    }
}

impl Deref for ManifestSession {
    type Target = Manifest;

    fn deref(&self) -> &Manifest {
        &self.manifest
    }
}

impl DerefMut for ManifestSession {
    fn deref_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }
}

impl Drop for ManifestSession {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.store.save(&self.manifest) {
            error!(path = %self.store.path().display(), error = %e, "failed to persist manifest");
        }
    }
}
