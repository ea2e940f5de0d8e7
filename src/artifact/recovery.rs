//! Recovery image matching.
//!
//! A build gets the recovery image of the same device with the closest date
//! not after its own; when every candidate is newer, the earliest newer one.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use build_name::BuildName;

use super::Dated;

/// A recovery image found on disk.
#[derive(Debug, Clone)]
pub struct RecoveryImage {
    /// Parsed filename identity
    pub name: BuildName,

    /// Location on disk
    pub path: PathBuf,
}

impl RecoveryImage {
    /// Recognize a recovery image by its filename.
    ///
    /// Returns `None` for anything that is not a `recovery` typed artifact.
    pub fn from_path(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_str()?;
        let name = build_name::parse(filename).ok()?;
        if !name.is_recovery() {
            return None;
        }

        Some(Self {
            name,
            path: path.to_path_buf(),
        })
    }

    pub fn device(&self) -> &str {
        &self.name.device
    }

    pub fn filename(&self) -> &str {
        &self.name.filename
    }
}

impl Dated for RecoveryImage {
    fn timestamp(&self) -> i64 {
        self.name.timestamp()
    }
}

/// Select the recovery image for a build of `device` dated `timestamp`.
///
/// Ties on date go to the lexicographically smallest filename. An empty pool
/// for the device is not an error; the build simply has no recovery.
pub fn match_recovery<'a>(
    device: &str,
    timestamp: i64,
    pool: &'a [RecoveryImage],
) -> Option<&'a RecoveryImage> {
    let mut floor: Option<&RecoveryImage> = None;
    let mut ceiling: Option<&RecoveryImage> = None;

    for candidate in pool.iter().filter(|r| r.device() == device) {
        let ts = candidate.timestamp();
        if ts <= timestamp {
            let better = floor.map_or(true, |f| {
                (Reverse(ts), candidate.filename()) < (Reverse(f.timestamp()), f.filename())
            });
            if better {
                floor = Some(candidate);
            }
        } else {
            let better = ceiling
                .map_or(true, |c| (ts, candidate.filename()) < (c.timestamp(), c.filename()));
            if better {
                ceiling = Some(candidate);
            }
        }
    }

    floor.or(ceiling)
}
