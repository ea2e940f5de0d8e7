//! Build manifest (builds.json)
//!
//! Maps each device codename to the ordered list of builds published for
//! it. The file is rewritten in full on every session close.

mod query;
mod store;

pub use query::{BuildFilter, FilterError};
pub use store::{ManifestSession, ManifestStore};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::PathBuf;

use crate::artifact::Build;

/// Errors for manifest operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Device '{device}': build '{name}' has no files")]
    EmptyBuild { device: String, name: String },

    #[error("Device '{device}': duplicate build '{name}'")]
    DuplicateBuild { device: String, name: String },

    #[error("Device '{device}': build '{name}' belongs to device '{found}'")]
    DeviceMismatch {
        device: String,
        name: String,
        found: String,
    },
}

/// In-memory manifest: device codename to its bucket of builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    devices: BTreeMap<String, Vec<Build>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate manifest JSON.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize to JSON.
    ///
    /// Buckets are written oldest first and empty buckets are dropped, so
    /// the same logical content always produces the same bytes.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut normalized = self.clone();
        normalized.normalize();
        let mut json = serde_json::to_string_pretty(&normalized)?;
        json.push('\n');
        Ok(json)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for (device, builds) in &self.devices {
            let mut names = HashSet::new();
            for build in builds {
                if build.files.is_empty() {
                    return Err(ManifestError::EmptyBuild {
                        device: device.clone(),
                        name: build.name.clone(),
                    });
                }
                if build.device != *device {
                    return Err(ManifestError::DeviceMismatch {
                        device: device.clone(),
                        name: build.name.clone(),
                        found: build.device.clone(),
                    });
                }
                if !names.insert(build.name.as_str()) {
                    return Err(ManifestError::DuplicateBuild {
                        device: device.clone(),
                        name: build.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.devices.retain(|_, builds| !builds.is_empty());
        for builds in self.devices.values_mut() {
            builds.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
        }
    }

    /// Device codenames with at least one build, sorted.
    pub fn devices(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|(_, builds)| !builds.is_empty())
            .map(|(device, _)| device.clone())
            .collect()
    }

    /// Builds tracked for `device`, in manifest order.
    pub fn bucket(&self, device: &str) -> &[Build] {
        self.devices.get(device).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, device: &str, name: &str) -> Option<&Build> {
        self.bucket(device).iter().find(|b| b.name == name)
    }

    pub fn find_mut(&mut self, device: &str, name: &str) -> Option<&mut Build> {
        self.devices
            .get_mut(device)?
            .iter_mut()
            .find(|b| b.name == name)
    }

    /// Append a build to its device bucket, replacing one of the same name.
    pub fn insert(&mut self, build: Build) {
        let bucket = self.devices.entry(build.device.clone()).or_default();
        match bucket.iter_mut().find(|b| b.name == build.name) {
            Some(existing) => *existing = build,
            None => bucket.push(build),
        }
    }

    /// Remove a build by name; `None` when it was not tracked.
    pub fn remove(&mut self, device: &str, name: &str) -> Option<Build> {
        let bucket = self.devices.get_mut(device)?;
        let index = bucket.iter().position(|b| b.name == name)?;
        let removed = bucket.remove(index);
        if bucket.is_empty() {
            self.devices.remove(device);
        }
        Some(removed)
    }

    /// Every build, device by device, in manifest order.
    pub fn builds(&self) -> impl Iterator<Item = &Build> {
        self.devices.values().flatten()
    }

    /// Builds matching `filter`, in manifest order.
    pub fn filter<'a>(&'a self, filter: &'a BuildFilter) -> impl Iterator<Item = &'a Build> + 'a {
        self.builds().filter(move |b| filter.matches(b))
    }

    pub fn len(&self) -> usize {
        self.devices.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::File;

    fn build(filename: &str) -> Build {
        let primary = File {
            path: None,
            filename: filename.to_string(),
            reference: Some(format!("ref/{}", filename)),
            sha256: "00".repeat(32),
            size: 10,
        };
        Build::new(primary, Vec::new()).unwrap()
    }

    #[test]
    fn test_insert_find_remove() {
        let mut manifest = Manifest::new();
        manifest.insert(build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip"));
        manifest.insert(build("lineage-17.1-20200101-UNOFFICIAL-bardock.zip"));
        manifest.insert(build("lineage-18.1-20210101-UNOFFICIAL-lavender.zip"));

        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.devices(), vec!["bardock", "lavender"]);
        assert!(manifest
            .find("bardock", "lineage-17.1-20200101-UNOFFICIAL-bardock")
            .is_some());

        let removed = manifest.remove("lavender", "lineage-18.1-20210101-UNOFFICIAL-lavender");
        assert!(removed.is_some());
        assert_eq!(manifest.devices(), vec!["bardock"]);
        assert!(manifest.remove("lavender", "anything").is_none());
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut manifest = Manifest::new();
        manifest.insert(build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip"));
        manifest.insert(build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip"));
        assert_eq!(manifest.bucket("bardock").len(), 1);
    }

    #[test]
    fn test_json_is_sorted_oldest_first_and_stable() {
        let mut manifest = Manifest::new();
        manifest.insert(build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip"));
        manifest.insert(build("lineage-17.1-20200101-UNOFFICIAL-bardock.zip"));

        let json = manifest.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["bardock"][0]["date"], "2020-01-01");
        assert_eq!(value["bardock"][1]["date"], "2020-04-22");

        let reloaded = Manifest::from_json(&json).unwrap();
        assert_eq!(reloaded.to_json().unwrap(), json);
    }

    #[test]
    fn test_from_json_rejects_invalid_buckets() {
        let empty_files = r#"{"bardock": [{"name": "x", "device": "bardock", "type": "unofficial",
            "version": "17.1", "date": "2020-04-22", "datetime": 0, "files": []}]}"#;
        assert!(matches!(
            Manifest::from_json(empty_files),
            Err(ManifestError::EmptyBuild { .. })
        ));

        let mut manifest = Manifest::new();
        manifest.insert(build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip"));
        let json = manifest.to_json().unwrap().replace("\"bardock\": [", "\"lavender\": [");
        assert!(matches!(
            Manifest::from_json(&json),
            Err(ManifestError::DeviceMismatch { .. })
        ));
    }

    #[test]
    fn test_preserves_os_patch_level() {
        let json = r#"{"bardock": [{"name": "lineage-17.1-20200422-UNOFFICIAL-bardock",
            "device": "bardock", "type": "unofficial", "version": "17.1", "date": "2020-04-22",
            "datetime": 1587513600, "os_patch_level": "2020-04-05",
            "files": [{"filename": "lineage-17.1-20200422-UNOFFICIAL-bardock.zip",
                       "filepath": "bardock/lineage-17.1-20200422-UNOFFICIAL-bardock.zip",
                       "sha256": "ab", "size": 3}]}]}"#;
        let manifest = Manifest::from_json(json).unwrap();
        let build = &manifest.bucket("bardock")[0];
        assert_eq!(build.os_patch_level.as_deref(), Some("2020-04-05"));
        assert!(build.files[0].path.is_none());

        let out = manifest.to_json().unwrap();
        assert!(out.contains("\"os_patch_level\": \"2020-04-05\""));
    }
}
