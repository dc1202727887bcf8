//! Run reports: the auditable outcome of one orchestration pass.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one full orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub installed: Vec<InstalledPackage>,
    pub skipped: Vec<SkippedPackage>,
    pub excluded: Vec<ExcludedPackage>,
    pub failed: Vec<FailedPackage>,
}

impl RunReport {
    /// True when nothing was excluded and no install failed.
    pub fn is_clean(&self) -> bool {
        self.excluded.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub key: String,
    /// Package file the installer was invoked with.
    pub path: PathBuf,
    /// blake3 hex digest of the package bytes.
    pub content_hash: String,
    /// Whether the install only succeeded on its retry.
    pub retried: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPackage {
    pub key: String,
    pub reason: String,
}

/// A descriptor excluded from the run by an evaluation or staging error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedPackage {
    pub key: String,
    pub error: String,
}

/// A descriptor whose install failed after its retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPackage {
    pub key: String,
    pub error: String,
}

/// Outcome of the admission phase alone; nothing is installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    /// Admitted descriptors in discovery order. Installation drains them
    /// in reverse.
    pub admitted: Vec<AdmittedPackage>,
    pub skipped: Vec<SkippedPackage>,
    pub excluded: Vec<ExcludedPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittedPackage {
    pub key: String,
    pub dependencies: Vec<String>,
    /// Human-readable package locator.
    pub package: String,
}
