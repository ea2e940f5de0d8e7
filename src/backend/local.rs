//! Local mirror backend.
//!
//! Files are placed under the publish root at the same relative path they
//! have under the builds root, and referenced by that relative path. When the
//! publish root is the builds root nothing is copied: the builds tree is
//! served as is, and removing a build deletes it from disk.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::{Backend, BackendError};
use crate::artifact::{Build, File};
use crate::config::Config;

/// Mirrors builds into a local directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    builds_root: PathBuf,
    publish_root: PathBuf,
}

impl LocalBackend {
    pub fn new(builds_root: impl Into<PathBuf>, publish_root: impl Into<PathBuf>) -> Self {
        Self {
            builds_root: builds_root.into(),
            publish_root: publish_root.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.builds_path, config.publish_root())
    }

    pub fn publish_root(&self) -> &Path {
        &self.publish_root
    }

    /// Whether the builds tree is served as is.
    pub fn is_in_place(&self) -> bool {
        self.builds_root == self.publish_root || same_file(&self.builds_root, &self.publish_root)
    }

    /// Destination of `file`, relative to the publish root.
    fn relative_destination(&self, build: &Build, source: &Path) -> PathBuf {
        if let Some(relative) = relative_to(source, &self.builds_root) {
            return relative;
        }
        Path::new(&build.device)
            .join(&build.name)
            .join(source.file_name().unwrap_or_default())
    }

    fn place(&self, build: &Build, file: &mut File) -> Result<(), BackendError> {
        let source = file
            .path
            .clone()
            .ok_or_else(|| BackendError::MissingLocalPath(file.filename.clone()))?;

        let relative = self.relative_destination(build, &source);
        let destination = self.publish_root.join(&relative);

        if !same_file(&source, &destination) {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::copy(&source, &destination).map_err(io_error(&destination))?;
            debug!(file = %file.filename, destination = %destination.display(), "copied");
        }

        file.reference = Some(to_reference(&relative));
        Ok(())
    }

    fn delete(&self, reference: &str) -> Result<(), BackendError> {
        let path = self.publish_root.join(reference);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BackendError::Io { path, source: e }),
        }

        // Prune emptied build directories, never the device directory itself.
        let depth = Path::new(reference).components().count();
        let mut dir = path.parent();
        for _ in 2..depth {
            let Some(current) = dir else { break };
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }
}

impl Backend for LocalBackend {
    fn is_uploaded(&mut self, build: &Build) -> Result<bool, BackendError> {
        if build.files.is_empty() {
            return Ok(false);
        }
        Ok(build.files.iter().all(|f| match &f.reference {
            Some(reference) => self.publish_root.join(reference).is_file(),
            None => false,
        }))
    }

    fn upload(&mut self, build: &mut Build) -> Result<(), BackendError> {
        let identity = build.clone();
        for file in &mut build.files {
            self.place(&identity, file)?;
        }
        Ok(())
    }

    fn unupload(&mut self, build: &Build) -> Result<(), BackendError> {
        for reference in build.files.iter().filter_map(|f| f.reference.as_deref()) {
            self.delete(reference)?;
        }
        Ok(())
    }

    fn upload_file(&mut self, build: &Build, file: &mut File) -> Result<(), BackendError> {
        self.place(build, file)
    }

    fn remove_file(&mut self, _build: &Build, file: &File) -> Result<(), BackendError> {
        match &file.reference {
            Some(reference) => self.delete(reference),
            None => Ok(()),
        }
    }

    fn discard(&mut self, build: &Build) -> Result<(), BackendError> {
        if !self.is_in_place() {
            return Ok(());
        }
        for path in build.files.iter().filter_map(|f| f.path.as_deref()) {
            if let Some(relative) = relative_to(path, &self.builds_root) {
                self.delete(&to_reference(&relative))?;
            }
        }
        Ok(())
    }
}

/// `path` relative to `root`, also trying canonical forms of both.
fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    if let Ok(relative) = path.strip_prefix(root) {
        return Some(relative.to_path_buf());
    }
    let path = fs::canonicalize(path).ok()?;
    let root = fs::canonicalize(root).ok()?;
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Relative path with `/` separators, as stored in the manifest.
fn to_reference(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BackendError + '_ {
    move |source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    }
}
