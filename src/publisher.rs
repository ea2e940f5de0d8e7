//! Reconciliation engine.
//!
//! Brings the manifest and the backend in line with the builds on disk:
//! drops builds the backend no longer has, publishes new builds, diffs the
//! files of changed ones and applies retention after every insertion. Work
//! on one build never aborts the run; failures are logged and counted.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::artifact::{self, Build, File, ScanError, ScanReport};
use crate::backend::{Backend, BackendError};
use crate::config::Config;
use crate::manifest::{BuildFilter, Manifest, ManifestError, ManifestStore};
use crate::retention::RetentionPolicy;

/// Errors that abort a publisher operation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Why a build was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BlacklistedDevice,
    IgnoredVersion,
    /// Older than every build the retention window keeps
    OutsideRetention,
}

/// Result of merging one build into the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Updated {
        removed_files: usize,
        added_files: usize,
    },
    /// Already tracked with the same files
    Unchanged,
    Skipped(SkipReason),
}

/// Counters for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Builds found on disk
    pub scanned: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Removed by retention
    pub evicted: usize,
    /// Dropped because they left the backend or are no longer allowed
    pub removed: usize,
    /// Builds whose processing failed
    pub failed: usize,
    /// Files or directories the scanner could not turn into builds
    pub scan_errors: usize,
}

impl IndexReport {
    fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Added => self.added += 1,
            MergeOutcome::Updated { .. } => self.updated += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
            MergeOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Publishes builds through a backend and keeps the manifest in sync.
pub struct Publisher<B> {
    config: Config,
    store: ManifestStore,
    retention: RetentionPolicy,
    backend: B,
}

impl<B: Backend> Publisher<B> {
    pub fn new(config: &Config, backend: B) -> Self {
        Self {
            store: ManifestStore::new(&config.builds_json_path),
            retention: config.retention(),
            config: config.clone(),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Full reconciliation of every device under the builds root.
    pub fn index_builds(&mut self) -> Result<IndexReport, PublishError> {
        let mut session = self.store.session()?;
        let mut report = IndexReport::default();

        for device in session.devices() {
            self.clean_device(&mut session, &device, &mut report);
        }

        let scan = artifact::scan_builds(&self.config.builds_path, &self.config.blacklisted_devices)?;
        self.merge_scanned(&mut session, scan, &mut report);

        session.commit()?;
        log_report(&report);
        Ok(report)
    }

    /// Reconciliation restricted to one device.
    pub fn index_device_builds(&mut self, device: &str) -> Result<IndexReport, PublishError> {
        let mut session = self.store.session()?;
        let mut report = IndexReport::default();

        self.clean_device(&mut session, device, &mut report);

        let scan = if self.config.is_blacklisted(device) {
            info!(device, "device is blacklisted, not scanning");
            ScanReport::default()
        } else {
            artifact::scan_device(&self.config.builds_path, device)?
        };
        self.merge_scanned(&mut session, scan, &mut report);

        session.commit()?;
        log_report(&report);
        Ok(report)
    }

    /// Merge a single build, publishing what changed.
    pub fn add_build(&mut self, build: Build) -> Result<MergeOutcome, PublishError> {
        let mut session = self.store.session()?;
        let device = build.device.clone();

        let outcome = self.merge_build(&mut session, build)?;
        if matches!(outcome, MergeOutcome::Added | MergeOutcome::Updated { .. }) {
            self.enforce_retention(&mut session, &device, &mut IndexReport::default());
        }

        session.commit()?;
        Ok(outcome)
    }

    /// Load the build at `path` and merge it.
    pub fn add_build_path(&mut self, path: &Path) -> Result<MergeOutcome, PublishError> {
        let build = artifact::load_build(path)?;
        self.add_build(build)
    }

    /// Unpublish a build and drop it from the manifest.
    ///
    /// Returns whether the manifest tracked it.
    pub fn remove_build(&mut self, build: &Build) -> Result<bool, PublishError> {
        let mut session = self.store.session()?;

        let target = unshared(&session, build);
        self.backend.unupload(&target)?;
        let removed = session.remove(&build.device, &build.name).is_some();

        session.commit()?;
        Ok(removed)
    }

    /// Tracked builds matching `filter`, without touching the manifest file.
    pub fn find_builds(&self, filter: &BuildFilter) -> Result<Vec<Build>, PublishError> {
        let manifest = self.store.load()?;
        Ok(manifest.filter(filter).cloned().collect())
    }

    pub fn find_all_builds(&self) -> Result<Vec<Build>, PublishError> {
        self.find_builds(&BuildFilter::default())
    }

    /// Drop builds of `device` that are no longer allowed or no longer in
    /// the backend, then apply retention.
    fn clean_device(&mut self, manifest: &mut Manifest, device: &str, report: &mut IndexReport) {
        for build in manifest.bucket(device).to_vec() {
            let disallowed = if self.config.is_blacklisted(&build.device) {
                Some("blacklisted device")
            } else if self.config.is_ignored_version(&build.version) {
                Some("ignored version")
            } else {
                None
            };

            if let Some(reason) = disallowed {
                let target = unshared(manifest, &build);
                match self.backend.unupload(&target) {
                    Ok(()) => {
                        manifest.remove(device, &build.name);
                        info!(build = %build.name, reason, "unpublished build");
                        report.removed += 1;
                    }
                    Err(e) => {
                        error!(build = %build.name, error = %e, "failed to unpublish build");
                        report.failed += 1;
                    }
                }
                continue;
            }

            match self.backend.is_uploaded(&build) {
                Ok(true) => debug!(build = %build.name, "still published"),
                Ok(false) => {
                    manifest.remove(device, &build.name);
                    warn!(build = %build.name, "build missing from backend, dropped from manifest");
                    report.removed += 1;
                }
                Err(e) => {
                    error!(build = %build.name, error = %e, "failed to check build, keeping it");
                    report.failed += 1;
                }
            }
        }

        self.enforce_retention(manifest, device, report);
    }

    fn merge_scanned(&mut self, manifest: &mut Manifest, scan: ScanReport, report: &mut IndexReport) {
        report.scanned += scan.builds.len();
        report.scan_errors += scan.errors.len();
        for e in &scan.errors {
            warn!(error = %e, "skipped unreadable build");
        }

        for build in scan.builds {
            let device = build.device.clone();
            let name = build.name.clone();
            let scanned = build.clone();
            match self.merge_build(manifest, build) {
                Ok(outcome) => {
                    report.record(&outcome);
                    match outcome {
                        MergeOutcome::Added | MergeOutcome::Updated { .. } => {
                            self.enforce_retention(manifest, &device, report);
                        }
                        MergeOutcome::Skipped(SkipReason::OutsideRetention) => {
                            self.discard(manifest, &scanned, report);
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    error!(build = %name, error = %e, "failed to publish build");
                    report.failed += 1;
                }
            }
        }
    }

    fn merge_build(&mut self, manifest: &mut Manifest, incoming: Build) -> Result<MergeOutcome, BackendError> {
        if self.config.is_blacklisted(&incoming.device) {
            info!(build = %incoming.name, "device is blacklisted, skipping");
            return Ok(MergeOutcome::Skipped(SkipReason::BlacklistedDevice));
        }
        if self.config.is_ignored_version(&incoming.version) {
            info!(build = %incoming.name, version = %incoming.version, "version is ignored, skipping");
            return Ok(MergeOutcome::Skipped(SkipReason::IgnoredVersion));
        }

        match manifest.find(&incoming.device, &incoming.name) {
            None => {
                if self.retention.would_evict(manifest.bucket(&incoming.device), &incoming) {
                    info!(build = %incoming.name, "older than the retention window, skipping");
                    return Ok(MergeOutcome::Skipped(SkipReason::OutsideRetention));
                }

                let mut build = incoming;
                self.backend.upload(&mut build)?;
                info!(build = %build.name, files = build.files.len(), "published build");
                manifest.insert(build);
                Ok(MergeOutcome::Added)
            }
            Some(existing) if *existing == incoming => {
                debug!(build = %incoming.name, "unchanged");
                Ok(MergeOutcome::Unchanged)
            }
            Some(_) => self.update_build(manifest, incoming),
        }
    }

    /// Replace the files of a tracked build with those of `incoming`.
    ///
    /// New files are published before stale ones are removed, so the build
    /// never runs out of files and a same-name file is replaced rather than
    /// deleted. Progress is recorded as it happens, so a failure part way
    /// leaves the manifest describing what the backend actually holds.
    fn update_build(&mut self, manifest: &mut Manifest, incoming: Build) -> Result<MergeOutcome, BackendError> {
        let Some(current) = manifest.find(&incoming.device, &incoming.name) else {
            return Ok(MergeOutcome::Unchanged);
        };
        let stale: Vec<(File, bool)> = current
            .files_missing_from(&incoming)
            .into_iter()
            .map(|f| (f.clone(), is_shared(manifest, current, f)))
            .collect();
        let mut snapshot = current.clone();

        let mut files = Vec::with_capacity(incoming.files.len());
        let mut added_files = 0;
        for mut file in incoming.files {
            if let Some(kept) = snapshot.files.iter().find(|f| **f == file) {
                files.push(kept.clone());
                continue;
            }
            self.backend.upload_file(&snapshot, &mut file)?;
            match snapshot.files.iter_mut().find(|f| f.filename == file.filename) {
                Some(replaced) => *replaced = file.clone(),
                None => snapshot.files.push(file.clone()),
            }
            replace_files(manifest, &snapshot);
            files.push(file);
            added_files += 1;
        }

        let mut removed_files = 0;
        for (file, shared) in &stale {
            // Same-name files were overwritten by their upload
            let replaced = files.iter().any(|f| f.filename == file.filename);
            if !shared && !replaced {
                self.backend.remove_file(&snapshot, file)?;
                snapshot.files.retain(|f| f != file);
                replace_files(manifest, &snapshot);
            }
            removed_files += 1;
        }

        snapshot.files = files;
        if incoming.os_patch_level.is_some() {
            snapshot.os_patch_level = incoming.os_patch_level;
        }
        info!(build = %snapshot.name, removed_files, added_files, "updated build");
        manifest.insert(snapshot);

        Ok(MergeOutcome::Updated {
            removed_files,
            added_files,
        })
    }

    /// Drop the local copy of a scanned build retention will never keep.
    fn discard(&mut self, manifest: &Manifest, build: &Build, report: &mut IndexReport) {
        let mut target = build.clone();
        target
            .files
            .retain(|f| !manifest.builds().flat_map(|b| &b.files).any(|tracked| tracked == f));
        match self.backend.discard(&target) {
            Ok(()) => debug!(build = %build.name, "discarded build"),
            Err(e) => {
                error!(build = %build.name, error = %e, "failed to discard build");
                report.failed += 1;
            }
        }
    }

    /// Evict builds of `device` that fall outside the retention window.
    fn enforce_retention(&mut self, manifest: &mut Manifest, device: &str, report: &mut IndexReport) {
        let bucket = manifest.bucket(device);
        let evicted: Vec<Build> = self
            .retention
            .evicted(bucket)
            .into_iter()
            .map(|i| bucket[i].clone())
            .collect();

        for build in evicted {
            let target = unshared(manifest, &build);
            match self.backend.unupload(&target) {
                Ok(()) => {
                    manifest.remove(device, &build.name);
                    info!(build = %build.name, "evicted old build");
                    report.evicted += 1;
                }
                Err(e) => {
                    error!(build = %build.name, error = %e, "failed to evict build, keeping it");
                    report.failed += 1;
                }
            }
        }
    }
}

/// Whether another tracked build references the same published file.
fn is_shared(manifest: &Manifest, owner: &Build, file: &File) -> bool {
    let Some(reference) = file.reference.as_deref() else {
        return false;
    };
    manifest
        .builds()
        .filter(|b| !(b.device == owner.device && b.name == owner.name))
        .flat_map(|b| &b.files)
        .any(|f| f.reference.as_deref() == Some(reference))
}

/// Copy of `build` without the files other tracked builds still reference,
/// such as a recovery image matched to several builds.
fn unshared(manifest: &Manifest, build: &Build) -> Build {
    let mut target = build.clone();
    target.files.retain(|f| !is_shared(manifest, build, f));
    target
}

fn replace_files(manifest: &mut Manifest, snapshot: &Build) {
    if snapshot.files.is_empty() {
        manifest.remove(&snapshot.device, &snapshot.name);
        return;
    }
    if let Some(build) = manifest.find_mut(&snapshot.device, &snapshot.name) {
        build.files = snapshot.files.clone();
    }
}

fn log_report(report: &IndexReport) {
    info!(
        scanned = report.scanned,
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        evicted = report.evicted,
        removed = report.removed,
        failed = report.failed,
        "reconciliation finished"
    );
}
