//! A logical release unit: one primary artifact plus auxiliary files.

use build_name::NameError;
use serde::{Deserialize, Serialize};

use super::{Dated, File};

/// One build of a device for a given version, date and type.
///
/// `files[0]` is the primary artifact and defines every identity field; the
/// rest are auxiliary (checksums, a matched recovery image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    /// Identity key: the primary filename without its extension
    pub name: String,

    /// Device codename
    pub device: String,

    /// Build type ("unofficial", "official", "nightly", ...)
    #[serde(rename = "type")]
    pub build_type: String,

    /// Version string
    pub version: String,

    /// `YYYY-MM-DD` display date
    pub date: String,

    /// Epoch seconds of the build date, used for all ordering
    #[serde(rename = "datetime")]
    pub timestamp: i64,

    /// Primary artifact first, auxiliary files after
    pub files: Vec<File>,

    /// Security patch level, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_patch_level: Option<String>,
}

impl Build {
    /// Build from a primary artifact and its auxiliary files.
    ///
    /// Fails when the primary filename is not a recognized build artifact.
    pub fn new(primary: File, extras: Vec<File>) -> Result<Self, NameError> {
        let parsed = build_name::parse(&primary.filename)?;

        let mut files = Vec::with_capacity(extras.len() + 1);
        files.push(primary);
        files.extend(extras);

        Ok(Self {
            name: parsed.stem.clone(),
            device: parsed.device.clone(),
            build_type: parsed.build_type.clone(),
            version: parsed.version.clone(),
            date: parsed.display_date(),
            timestamp: parsed.timestamp(),
            files,
            os_patch_level: None,
        })
    }

    /// The primary artifact.
    pub fn primary(&self) -> Option<&File> {
        self.files.first()
    }

    /// Whether one of the auxiliary files is a recovery image.
    pub fn has_recovery(&self) -> bool {
        self.files
            .iter()
            .skip(1)
            .any(|f| build_name::is_recovery_image(&f.filename))
    }

    /// Whether this build carries a file equal to `file`.
    pub fn contains_file(&self, file: &File) -> bool {
        self.files.iter().any(|f| f == file)
    }

    /// Files of `self` that `other` does not carry.
    pub fn files_missing_from<'a>(&'a self, other: &Build) -> Vec<&'a File> {
        self.files.iter().filter(|f| !other.contains_file(f)).collect()
    }

    /// Whether both builds carry the same set of files.
    pub fn same_files(&self, other: &Build) -> bool {
        self.files_missing_from(other).is_empty() && other.files_missing_from(self).is_empty()
    }

    /// Whether every file has a backend reference.
    pub fn is_fully_uploaded(&self) -> bool {
        self.files.iter().all(File::is_uploaded)
    }
}

impl PartialEq for Build {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.same_files(other)
    }
}

impl Eq for Build {}

impl Dated for Build {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(filename: &str, sha256: &str) -> File {
        File {
            path: None,
            filename: filename.to_string(),
            reference: None,
            sha256: sha256.to_string(),
            size: 1,
        }
    }

    const PRIMARY: &str = "lineage-17.1-20200422-UNOFFICIAL-bardock.zip";

    #[test]
    fn test_new_takes_identity_from_primary() {
        let build = Build::new(file(PRIMARY, "aa"), vec![file("extra.txt", "bb")]).unwrap();
        assert_eq!(build.name, "lineage-17.1-20200422-UNOFFICIAL-bardock");
        assert_eq!(build.device, "bardock");
        assert_eq!(build.version, "17.1");
        assert_eq!(build.build_type, "unofficial");
        assert_eq!(build.date, "2020-04-22");
        assert_eq!(build.timestamp, 1_587_513_600);
        assert_eq!(build.primary().unwrap().filename, PRIMARY);
        assert_eq!(build.files.len(), 2);
    }

    #[test]
    fn test_new_rejects_unrecognized_primary() {
        assert!(Build::new(file("notes.txt", "aa"), Vec::new()).is_err());
    }

    #[test]
    fn test_equality_is_set_equality_of_files() {
        let a = Build::new(file(PRIMARY, "aa"), vec![file("x", "1"), file("y", "2")]).unwrap();
        let b = Build::new(file(PRIMARY, "aa"), vec![file("y", "2"), file("x", "1")]).unwrap();
        assert_eq!(a, b);

        let c = Build::new(file(PRIMARY, "aa"), vec![file("x", "1")]).unwrap();
        assert_ne!(a, c);

        let d = Build::new(file(PRIMARY, "changed"), vec![file("x", "1"), file("y", "2")]).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn test_files_missing_from() {
        let old = Build::new(file(PRIMARY, "aa"), vec![file("a", "1")]).unwrap();
        let new = Build::new(file(PRIMARY, "aa"), vec![file("c", "3")]).unwrap();

        let removed: Vec<_> = old.files_missing_from(&new).iter().map(|f| f.filename.clone()).collect();
        let added: Vec<_> = new.files_missing_from(&old).iter().map(|f| f.filename.clone()).collect();
        assert_eq!(removed, vec!["a"]);
        assert_eq!(added, vec!["c"]);
    }

    #[test]
    fn test_has_recovery() {
        let without = Build::new(file(PRIMARY, "aa"), Vec::new()).unwrap();
        assert!(!without.has_recovery());

        let with = Build::new(
            file(PRIMARY, "aa"),
            vec![file("lineage-17.1-20200101-recovery-bardock.img", "rr")],
        )
        .unwrap();
        assert!(with.has_recovery());
    }

    #[test]
    fn test_manifest_record_shape() {
        let build = Build::new(file(PRIMARY, "aa"), Vec::new()).unwrap();
        let value = serde_json::to_value(&build).unwrap();
        assert_eq!(value["type"], "unofficial");
        assert_eq!(value["datetime"], 1_587_513_600);
        assert!(value.get("os_patch_level").is_none());
        assert_eq!(value["files"][0]["filepath"], serde_json::Value::Null);
    }
}
