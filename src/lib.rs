//! LineageOS build publisher
//!
//! Scans a tree of build artifacts, publishes new builds through a backend
//! (a local mirror directory or GitHub releases), keeps a JSON manifest of
//! what is published and prunes builds past the per-device retention limit.

pub mod artifact;
pub mod backend;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod publisher;
pub mod retention;

pub use artifact::{Build, File, RecoveryImage, ScanError, ScanReport};
pub use backend::{AnyBackend, Backend, BackendError, LocalBackend, RemoteBackend};
pub use config::{BackendKind, Config, ConfigError};
pub use manifest::{BuildFilter, FilterError, Manifest, ManifestError, ManifestSession, ManifestStore};
pub use publisher::{IndexReport, MergeOutcome, PublishError, Publisher, SkipReason};
pub use retention::RetentionPolicy;
