//! Installer boundary and the scoped invocation that drives it.
//!
//! The actual package installer belongs to the host; this module owns how
//! it is called: elevated, synchronous, under an execution scope that is
//! guaranteed to be released, and with one retry of the whole sequence
//! before the failure is reported.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::descriptor::{Descriptor, FileHooks, RecordHooks};

/// Context handed to the installer for one attempt.
#[derive(Debug, Clone)]
pub struct InstallContext {
    /// Suppress the host's access checks for the duration of the install.
    pub elevated: bool,
    /// Run record and file events synchronously instead of deferring them.
    pub synchronous: bool,
    pub record_hooks: RecordHooks,
    pub file_hooks: FileHooks,
}

impl InstallContext {
    /// Context for one descriptor: elevated, synchronous, descriptor hooks.
    pub fn for_descriptor(descriptor: &dyn Descriptor) -> Self {
        Self {
            elevated: true,
            synchronous: true,
            record_hooks: descriptor.record_hooks(),
            file_hooks: descriptor.file_hooks(),
        }
    }
}

/// The external package installer.
pub trait PackageInstaller: Send + Sync {
    /// Apply the package at `path` against the host's stores.
    fn install_package(&self, path: &Path, context: &InstallContext) -> anyhow::Result<()>;
}

/// Reference installer that logs the install and succeeds.
///
/// Backs the standalone binary; real hosts plug their own
/// [`PackageInstaller`] in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstaller;

impl PackageInstaller for NoopInstaller {
    fn install_package(&self, path: &Path, context: &InstallContext) -> anyhow::Result<()> {
        info!(
            path = %path.display(),
            elevated = context.elevated,
            synchronous = context.synchronous,
            "no-op installer accepted package"
        );
        Ok(())
    }
}

/// Shared state behind [`ExecutionScope`]; one per loader.
#[derive(Debug, Default)]
pub struct ScopeState {
    active: AtomicBool,
}

/// Scoped execution context for one install attempt.
///
/// Holding the scope is what makes the attempt elevated and synchronous;
/// release happens on every exit path via `Drop`. The scope is not
/// reentrant, so installs are serialized should anything ever run them
/// concurrently.
#[derive(Debug)]
pub struct ExecutionScope<'a> {
    state: &'a ScopeState,
}

impl<'a> ExecutionScope<'a> {
    pub fn acquire(state: &'a ScopeState) -> anyhow::Result<Self> {
        if state
            .active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            anyhow::bail!("execution scope is already held by another install");
        }
        Ok(Self { state })
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::Release);
    }
}

/// Outcome of one install invocation, including its single retry.
#[derive(Debug)]
pub enum InvokeOutcome {
    Installed {
        /// Whether the install only succeeded on the second attempt.
        retried: bool,
    },
    /// Both attempts failed. Reported per descriptor, never fatal to the
    /// run.
    Failed(anyhow::Error),
}

/// Drive one install: acquire the scope, build the context, invoke the
/// installer. On failure the whole sequence runs once more.
pub fn install_with_retry(
    installer: &dyn PackageInstaller,
    scope: &ScopeState,
    descriptor: &dyn Descriptor,
    package: &Path,
) -> InvokeOutcome {
    let attempt = || -> anyhow::Result<()> {
        let _scope = ExecutionScope::acquire(scope)?;
        let context = InstallContext::for_descriptor(descriptor);
        installer.install_package(package, &context)
    };

    match attempt() {
        Ok(()) => InvokeOutcome::Installed { retried: false },
        Err(first) => {
            warn!(
                package = %descriptor.key(),
                "package installation failed, trying again: {first:#}"
            );
            match attempt() {
                Ok(()) => InvokeOutcome::Installed { retried: true },
                Err(second) => {
                    error!(
                        package = %descriptor.key(),
                        "package installation failed on retry: {second:#}"
                    );
                    InvokeOutcome::Failed(second)
                }
            }
        }
    }
}
