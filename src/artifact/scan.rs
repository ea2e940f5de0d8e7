//! Builds directory scanner.
//!
//! The builds root holds one directory per device. Inside a device directory
//! a build is either a single artifact file or a sub-directory holding
//! exactly one artifact plus any number of extra files. Loose recovery images
//! in the device directory form the pool recoveries are matched from.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use build_name::NameError;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::recovery::{match_recovery, RecoveryImage};
use super::{Build, File};

/// Errors raised while turning directory entries into builds.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{0}")]
    Name(#[from] NameError),

    #[error("{0}: no build artifact found")]
    NoPrimary(PathBuf),

    #[error("{path}: multiple build artifacts ({found})")]
    MultiplePrimaries { path: PathBuf, found: String },

    #[error("{path}: build is for device '{found}', expected '{expected}'")]
    DeviceMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("{0} is neither a build file nor a build directory")]
    NotABuild(PathBuf),
}

/// Outcome of a scan: the builds found, newest first, and per-build failures.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Builds sorted by descending timestamp
    pub builds: Vec<Build>,

    /// Entries that could not be turned into a build (non-fatal)
    pub errors: Vec<ScanError>,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.builds.extend(other.builds);
        self.errors.extend(other.errors);
    }

    fn sort_newest_first(&mut self) {
        // Stable, so equal dates keep directory order.
        self.builds.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
}

/// Scan every device directory under `root`, skipping blacklisted devices.
pub fn scan_builds(root: &Path, blacklisted_devices: &[String]) -> Result<ScanReport, ScanError> {
    let mut report = ScanReport::default();

    for entry in list_dir(root, &mut report.errors)? {
        if !entry.file_type().is_dir() {
            continue;
        }

        let device = entry.file_name().to_string_lossy().into_owned();
        if blacklisted_devices.contains(&device) {
            info!(device = %device, "skipping blacklisted device");
            continue;
        }

        match scan_device_dir(entry.path(), &device) {
            Ok(device_report) => report.merge(device_report),
            Err(e) => {
                warn!(device = %device, error = %e, "skipping unreadable device directory");
                report.errors.push(e);
            }
        }
    }

    report.sort_newest_first();
    Ok(report)
}

/// Scan the directory of a single device under `root`.
///
/// A device without a directory yields an empty report.
pub fn scan_device(root: &Path, device: &str) -> Result<ScanReport, ScanError> {
    let device_dir = root.join(device);
    if !device_dir.is_dir() {
        warn!(device = %device, path = %device_dir.display(), "device directory not found");
        return Ok(ScanReport::default());
    }

    let mut report = scan_device_dir(&device_dir, device)?;
    report.sort_newest_first();
    Ok(report)
}

/// Load a single build from a file or build directory path.
///
/// An artifact inside a build directory (`<device>/<dir>/<artifact>`) loads
/// the whole directory. Recovery images in the device directory are used as
/// the recovery pool.
pub fn load_build(path: &Path) -> Result<Build, ScanError> {
    let (mut build, build_path) = if path.is_dir() {
        (build_from_dir(path)?, path)
    } else if path.is_file() {
        let build = build_from_file(path)?;
        match enclosing_build_dir(path, &build.device) {
            Some(dir) => (build_from_dir(dir)?, dir),
            None => (build, path),
        }
    } else {
        return Err(ScanError::NotABuild(path.to_path_buf()));
    };

    let pool = match build_path.parent() {
        Some(parent) if parent.is_dir() => recovery_pool(parent)?,
        _ => Vec::new(),
    };
    let mut hashed = HashMap::new();
    attach_recovery(&mut build, &pool, &mut hashed)?;

    Ok(build)
}

/// Directory holding `artifact` when it sits one level below a directory
/// named after `device`.
fn enclosing_build_dir<'a>(artifact: &'a Path, device: &str) -> Option<&'a Path> {
    let dir = artifact.parent()?;
    let device_dir = dir.parent()?;
    let named = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned());
    if named(dir)? != device && named(device_dir)? == device {
        Some(dir)
    } else {
        None
    }
}

fn scan_device_dir(device_dir: &Path, device: &str) -> Result<ScanReport, ScanError> {
    let mut report = ScanReport::default();
    let mut pool = Vec::new();

    for entry in list_dir(device_dir, &mut report.errors)? {
        let path = entry.path();

        let loaded = if entry.file_type().is_dir() {
            build_from_dir(path)
        } else if entry.file_type().is_file() {
            let filename = entry.file_name().to_string_lossy();
            match build_name::parse(&filename) {
                Ok(name) if name.is_recovery() => {
                    pool.push(RecoveryImage {
                        name,
                        path: path.to_path_buf(),
                    });
                    continue;
                }
                Ok(_) => build_from_file(path),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "ignoring non-build file");
                    continue;
                }
            }
        } else {
            continue;
        };

        match loaded.and_then(|build| check_device(build, device, path)) {
            Ok(build) => report.builds.push(build),
            Err(e) => {
                warn!(device = %device, error = %e, "skipping unparseable build");
                report.errors.push(e);
            }
        }
    }

    let mut hashed = HashMap::new();
    let mut kept = Vec::with_capacity(report.builds.len());
    for mut build in std::mem::take(&mut report.builds) {
        match attach_recovery(&mut build, &pool, &mut hashed) {
            Ok(()) => kept.push(build),
            Err(e) => {
                warn!(build = %build.name, error = %e, "failed to attach recovery");
                report.errors.push(e);
            }
        }
    }
    report.builds = kept;

    Ok(report)
}

fn build_from_file(path: &Path) -> Result<Build, ScanError> {
    let primary = File::from_path(path).map_err(io_error(path))?;
    Ok(Build::new(primary, Vec::new())?)
}

fn build_from_dir(dir: &Path) -> Result<Build, ScanError> {
    let mut primaries = Vec::new();
    let mut extras = Vec::new();

    let mut unreadable = Vec::new();
    let entries = list_dir(dir, &mut unreadable)?;
    if let Some(e) = unreadable.into_iter().next() {
        return Err(e);
    }

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_primary = build_name::is_build_artifact(&entry.file_name().to_string_lossy());
        if is_primary {
            primaries.push(entry.into_path());
        } else {
            extras.push(entry.into_path());
        }
    }

    let primary = match primaries.as_slice() {
        [] => return Err(ScanError::NoPrimary(dir.to_path_buf())),
        [primary] => File::from_path(primary).map_err(io_error(primary))?,
        many => {
            let found = many
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ScanError::MultiplePrimaries {
                path: dir.to_path_buf(),
                found,
            });
        }
    };

    let extras = extras
        .iter()
        .map(|p| File::from_path(p).map_err(io_error(p)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Build::new(primary, extras)?)
}

fn check_device(build: Build, device: &str, path: &Path) -> Result<Build, ScanError> {
    if build.device != device {
        return Err(ScanError::DeviceMismatch {
            path: path.to_path_buf(),
            expected: device.to_string(),
            found: build.device,
        });
    }
    Ok(build)
}

fn recovery_pool(dir: &Path) -> Result<Vec<RecoveryImage>, ScanError> {
    Ok(list_dir(dir, &mut Vec::new())?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| RecoveryImage::from_path(e.path()))
        .collect())
}

/// Append the matched recovery image unless the build already carries one.
fn attach_recovery(
    build: &mut Build,
    pool: &[RecoveryImage],
    hashed: &mut HashMap<PathBuf, File>,
) -> Result<(), ScanError> {
    if build.has_recovery() {
        return Ok(());
    }

    let Some(recovery) = match_recovery(&build.device, build.timestamp, pool) else {
        return Ok(());
    };

    let file = match hashed.get(&recovery.path) {
        Some(file) => file.clone(),
        None => {
            let file = File::from_path(&recovery.path).map_err(io_error(&recovery.path))?;
            hashed.insert(recovery.path.clone(), file.clone());
            file
        }
    };

    debug!(build = %build.name, recovery = %file.filename, "matched recovery");
    build.files.push(file);
    Ok(())
}

/// Entries directly under `dir`.
///
/// Failing to read `dir` itself is an error; an unreadable entry, such as a
/// dangling symlink, is pushed onto `errors` and skipped.
fn list_dir(dir: &Path, errors: &mut Vec<ScanError>) -> Result<Vec<DirEntry>, ScanError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                errors.push(e.into());
            }
        }
    }
    Ok(entries)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ScanError + '_ {
    move |source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    }
}
