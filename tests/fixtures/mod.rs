//! Test fixtures for publisher integration tests
//!
//! This module provides:
//! - A temporary builds tree with a manifest path next to it
//! - A recording backend that never touches the network

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use lineage_publisher::{Backend, BackendError, Build, Config, File};
use tempfile::TempDir;

/// Temporary directory holding `builds/`, `publish/` and `builds.json`.
pub struct Workspace {
    _dir: TempDir,
    pub builds: PathBuf,
    pub publish: PathBuf,
    pub manifest: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let builds = dir.path().join("builds");
        let publish = dir.path().join("publish");
        fs::create_dir_all(&builds).unwrap();
        Self {
            manifest: dir.path().join("builds.json"),
            builds,
            publish,
            _dir: dir,
        }
    }

    /// Write a file under the builds root; content defaults to its path.
    pub fn write(&self, relative: &str) -> PathBuf {
        self.write_with(relative, relative)
    }

    pub fn write_with(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.builds.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.builds.join(relative)).unwrap();
    }

    /// Config publishing into `publish/`.
    pub fn config(&self, builds_limit: usize) -> Config {
        self.config_json(&format!(
            r#"{{
                "builds_path": {},
                "builds_json_path": {},
                "publish_path": {},
                "builds_limit": {}
            }}"#,
            json_path(&self.builds),
            json_path(&self.manifest),
            json_path(&self.publish),
            builds_limit
        ))
    }

    pub fn config_json(&self, json: &str) -> Config {
        Config::parse_json(json).unwrap()
    }

    pub fn manifest_text(&self) -> String {
        fs::read_to_string(&self.manifest).unwrap()
    }

    pub fn manifest_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.manifest_text()).unwrap()
    }

    /// Build names in the manifest bucket of `device`, oldest first.
    pub fn manifest_names(&self, device: &str) -> Vec<String> {
        self.manifest_json()[device]
            .as_array()
            .map(|builds| {
                builds
                    .iter()
                    .map(|b| b["name"].as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn json_path(path: &Path) -> String {
    serde_json::to_string(&path.to_string_lossy()).unwrap()
}

/// A backend call, with the build name and, for file calls, the filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    IsUploaded(String),
    Upload(String),
    Unupload(String),
    UploadFile(String, String),
    RemoveFile(String, String),
    Discard(String),
}

/// In-memory backend recording every call.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    /// Builds currently published, by name
    pub published: HashSet<String>,
    /// Builds whose upload fails
    pub fail_upload: HashSet<String>,
    /// Builds whose existence check fails
    pub fail_check: HashSet<String>,
    /// Builds whose unupload fails
    pub fail_unupload: HashSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls that change backend state.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Call::IsUploaded(_) | Call::Discard(_)))
            .cloned()
            .collect()
    }

    /// Names of the builds handed to `discard`.
    pub fn discards(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Discard(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    fn failure(build: &Build) -> BackendError {
        BackendError::Status {
            method: "POST".to_string(),
            url: format!("mock://{}/{}", build.device, build.name),
            status: 500,
            body: "injected failure".to_string(),
        }
    }
}

fn reference(build: &Build, file: &File) -> String {
    format!("mock://{}/{}/{}", build.device, build.name, file.filename)
}

impl Backend for RecordingBackend {
    fn is_uploaded(&mut self, build: &Build) -> Result<bool, BackendError> {
        self.calls.push(Call::IsUploaded(build.name.clone()));
        if self.fail_check.contains(&build.name) {
            return Err(Self::failure(build));
        }
        Ok(self.published.contains(&build.name))
    }

    fn upload(&mut self, build: &mut Build) -> Result<(), BackendError> {
        self.calls.push(Call::Upload(build.name.clone()));
        if self.fail_upload.contains(&build.name) {
            return Err(Self::failure(build));
        }
        let identity = build.clone();
        for file in &mut build.files {
            file.reference = Some(reference(&identity, file));
        }
        self.published.insert(build.name.clone());
        Ok(())
    }

    fn unupload(&mut self, build: &Build) -> Result<(), BackendError> {
        self.calls.push(Call::Unupload(build.name.clone()));
        if self.fail_unupload.contains(&build.name) {
            return Err(Self::failure(build));
        }
        self.published.remove(&build.name);
        Ok(())
    }

    fn upload_file(&mut self, build: &Build, file: &mut File) -> Result<(), BackendError> {
        self.calls
            .push(Call::UploadFile(build.name.clone(), file.filename.clone()));
        if self.fail_upload.contains(&build.name) {
            return Err(Self::failure(build));
        }
        file.reference = Some(reference(build, file));
        Ok(())
    }

    fn remove_file(&mut self, build: &Build, file: &File) -> Result<(), BackendError> {
        self.calls
            .push(Call::RemoveFile(build.name.clone(), file.filename.clone()));
        Ok(())
    }

    fn discard(&mut self, build: &Build) -> Result<(), BackendError> {
        self.calls.push(Call::Discard(build.name.clone()));
        Ok(())
    }
}
