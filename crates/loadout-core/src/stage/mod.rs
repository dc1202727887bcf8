//! Package staging: materialize descriptor package bytes onto disk and
//! wait for the staged file to come free before handing it to the
//! installer.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error};

use crate::descriptor::{Descriptor, PackageSource};

/// Failed lock probes tolerated before every further probe logs an error.
/// The wait itself never gives up.
const LOCK_WAIT_NOISY_AFTER: u32 = 15;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A materialized package ready for installation.
#[derive(Debug, Clone)]
pub struct MaterializedPackage {
    pub path: PathBuf,
    /// blake3 hex digest of the package bytes, carried into the run report.
    pub content_hash: String,
}

/// Stages embedded package bytes at a deterministic on-disk path.
#[derive(Debug, Clone)]
pub struct PackageStager {
    stage_dir: PathBuf,
    poll_interval: Duration,
}

impl PackageStager {
    pub fn new(stage_dir: PathBuf) -> Self {
        Self {
            stage_dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the lock-wait poll interval (tests mostly).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    /// Resolve a descriptor's package to an on-disk file.
    ///
    /// File sources pass through as-is after a readability check; embedded
    /// sources are staged, overwriting any previous staging of the same id.
    pub fn materialize(&self, descriptor: &dyn Descriptor) -> anyhow::Result<MaterializedPackage> {
        match descriptor.package() {
            PackageSource::File(path) => {
                let bytes = fs::read(&path)
                    .with_context(|| format!("Failed to read package file: {}", path.display()))?;
                Ok(MaterializedPackage {
                    path,
                    content_hash: content_hash(&bytes),
                })
            }
            PackageSource::Embedded { id, bytes } => self.stage(&id, &bytes),
        }
    }

    /// Stage embedded package bytes and wait for the file to come free.
    ///
    /// The staged file name keeps only the last two dot-separated segments
    /// of the package id, so restaging the same id lands on the same path.
    pub fn stage(&self, package_id: &str, bytes: &[u8]) -> anyhow::Result<MaterializedPackage> {
        fs::create_dir_all(&self.stage_dir).with_context(|| {
            format!("Failed to create stage directory: {}", self.stage_dir.display())
        })?;

        let path = self.stage_dir.join(stage_file_name(package_id));
        fs::write(&path, bytes).with_context(|| {
            format!("Failed to stage package {} at {}", package_id, path.display())
        })?;
        debug!(package = %package_id, path = %path.display(), "staged package bytes");

        self.wait_until_free(package_id, &path);
        Ok(MaterializedPackage {
            path,
            content_hash: content_hash(bytes),
        })
    }

    /// Block until an exclusive lock on the staged file succeeds.
    ///
    /// There is deliberately no timeout; the wait only gets noisier after
    /// [`LOCK_WAIT_NOISY_AFTER`] failed probes. Callers that need
    /// cancellation must wrap this externally.
    fn wait_until_free(&self, package_id: &str, path: &Path) {
        let mut failed_probes = 0u32;
        loop {
            if probe_exclusive(path) {
                return;
            }
            failed_probes += 1;
            if failed_probes > LOCK_WAIT_NOISY_AFTER {
                error!(
                    package = %package_id,
                    path = %path.display(),
                    failed_probes,
                    "staged package is still locked, continuing to wait"
                );
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

/// One exclusive-lock probe. Any failure, including the file not being
/// openable, counts as still busy.
fn probe_exclusive(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => file.try_lock().is_ok(),
        Err(_) => false,
    }
}

/// Last two dot-separated segments of a package id, e.g.
/// `host.demo.content.zip` stages as `content.zip`.
fn stage_file_name(package_id: &str) -> String {
    let segments: Vec<&str> = package_id.split('.').collect();
    if segments.len() <= 2 {
        package_id.to_string()
    } else {
        segments[segments.len() - 2..].join(".")
    }
}

fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
