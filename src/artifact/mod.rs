//! Build artifacts: files, builds, directory scanning and recovery matching.

mod build;
mod file;
pub mod recovery;
pub mod scan;

pub use build::Build;
pub use file::{compute_file_sha256, File};
pub use recovery::{match_recovery, RecoveryImage};
pub use scan::{load_build, scan_builds, scan_device, ScanError, ScanReport};

/// Anything ordered by a build date timestamp.
pub trait Dated {
    /// Epoch seconds of the date, used for ordering only.
    fn timestamp(&self) -> i64;
}
