//! The orchestration run: discovery, admission, dependency-ordered drain
//! and the trigger that starts it all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::descriptor::{Descriptor, DescriptorRegistry};
use crate::install::{install_with_retry, InvokeOutcome, PackageInstaller, ScopeState};
use crate::precondition::{Decision, PreconditionEvaluator};
use crate::report::{
    AdmittedPackage, ExcludedPackage, FailedPackage, InstalledPackage, PlanReport, RunReport,
    SkippedPackage,
};
use crate::stage::PackageStager;
use crate::store::StoreProvider;

/// A descriptor may be requeued this many times with unresolved
/// dependencies; the next pop aborts the run.
pub const MAX_DEPENDENCY_ATTEMPTS: u32 = 10;

/// Fatal failures of a whole run. Everything else is isolated per
/// descriptor and lands in the [`RunReport`].
#[derive(Debug, Error)]
pub enum RunError {
    /// Descriptor discovery failed; the registration itself is malformed.
    #[error("descriptor discovery failed")]
    Discovery(#[source] anyhow::Error),

    /// A descriptor's dependencies never resolved. Either the dependency
    /// graph has a cycle, or a dependency is only satisfied by a fresh
    /// install of the same run, which never marks it resolved.
    #[error("unable to install {key}: dependencies still unresolved after {attempts} attempts")]
    DependenciesUnresolved { key: String, attempts: u32 },

    /// Another run is already in flight on this loader.
    #[error("an orchestration run is already in flight")]
    AlreadyRunning,

    /// The background run thread could not be spawned.
    #[error("failed to dispatch background run")]
    Dispatch(#[source] std::io::Error),
}

/// What a trigger did, depending on the configured run mode.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// Foreground run finished.
    Completed(RunReport),
    /// Run dispatched to a background thread, fire-and-forget.
    Dispatched,
    /// A run was already in flight; this trigger did nothing.
    AlreadyRunning,
}

struct LoaderInner {
    registry: DescriptorRegistry,
    stores: Arc<dyn StoreProvider>,
    installer: Arc<dyn PackageInstaller>,
    stager: PackageStager,
    scope: ScopeState,
    background: bool,
    in_flight: AtomicBool,
}

/// Result of the admission phase over every discovered descriptor.
struct Admission {
    /// Admitted descriptors in discovery order; the drain pops from the
    /// back, so installation runs in reverse.
    worklist: Vec<Box<dyn Descriptor>>,
    /// Keys whose evaluation decided a skip.
    resolved: HashSet<String>,
    skipped: Vec<SkippedPackage>,
    excluded: Vec<ExcludedPackage>,
}

/// Drives the whole orchestration: discovery, admission and the
/// dependency-ordered installation drain.
///
/// Cloning is cheap and clones share the same in-flight guard, so
/// overlapping triggers across clones are still refused.
#[derive(Clone)]
pub struct PackageLoader {
    inner: Arc<LoaderInner>,
}

impl PackageLoader {
    pub fn new(
        registry: DescriptorRegistry,
        stores: Arc<dyn StoreProvider>,
        installer: Arc<dyn PackageInstaller>,
        stager: PackageStager,
        background: bool,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                registry,
                stores,
                installer,
                stager,
                scope: ScopeState::default(),
                background,
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Block until no run is in flight, probing every `poll`.
    pub fn wait_until_idle(&self, poll: Duration) {
        while self.is_running() {
            std::thread::sleep(poll);
        }
    }

    /// Fire the run trigger, honoring the configured run mode.
    ///
    /// Foreground mode runs on the calling thread and returns the report.
    /// Background mode dispatches one detached thread and returns
    /// immediately; the report is logged, not returned. Overlapping
    /// triggers are refused, not queued.
    pub fn trigger(&self) -> Result<TriggerOutcome, RunError> {
        let Some(guard) = self.begin() else {
            warn!("orchestration run already in flight, ignoring trigger");
            return Ok(TriggerOutcome::AlreadyRunning);
        };

        if self.inner.background {
            let inner = Arc::clone(&self.inner);
            std::thread::Builder::new()
                .name("loadout-run".to_string())
                .spawn(move || {
                    let _guard = guard;
                    match inner.run() {
                        Ok(report) => info!(
                            installed = report.installed.len(),
                            skipped = report.skipped.len(),
                            excluded = report.excluded.len(),
                            failed = report.failed.len(),
                            "background run finished"
                        ),
                        Err(err) => {
                            let err = anyhow::Error::new(err);
                            error!("background run aborted: {err:#}");
                        }
                    }
                })
                .map_err(RunError::Dispatch)?;
            Ok(TriggerOutcome::Dispatched)
        } else {
            let _guard = guard;
            Ok(TriggerOutcome::Completed(self.inner.run()?))
        }
    }

    /// Run on the calling thread regardless of the configured mode.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let _guard = self.begin().ok_or(RunError::AlreadyRunning)?;
        self.inner.run()
    }

    /// Admission phase only: evaluate every descriptor without installing
    /// anything.
    pub fn plan(&self) -> Result<PlanReport, RunError> {
        let _guard = self.begin().ok_or(RunError::AlreadyRunning)?;
        self.inner.plan()
    }

    fn begin(&self) -> Option<RunGuard> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then(|| RunGuard {
                inner: Arc::clone(&self.inner),
            })
    }
}

/// Clears the in-flight flag when a run ends on any path.
struct RunGuard {
    inner: Arc<LoaderInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

impl LoaderInner {
    /// Evaluate every discovered descriptor in discovery order.
    fn admit(&self, descriptors: Vec<Box<dyn Descriptor>>) -> Admission {
        let evaluator = PreconditionEvaluator::new(self.stores.as_ref(), &self.stager);
        let mut admission = Admission {
            worklist: Vec::new(),
            resolved: HashSet::new(),
            skipped: Vec::new(),
            excluded: Vec::new(),
        };

        for descriptor in descriptors {
            let key = descriptor.key().to_string();
            match evaluator.should_install(descriptor.as_ref(), &mut admission.resolved) {
                Ok(Decision::Install) => {
                    info!(package = %key, "package admitted for installation");
                    admission.worklist.push(descriptor);
                }
                Ok(Decision::Skip { reasons }) => {
                    admission.skipped.push(SkippedPackage {
                        key,
                        reason: reasons
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; "),
                    });
                }
                Err(err) => {
                    error!(
                        package = %key,
                        "precondition evaluation failed, excluding package from this run: {err:#}"
                    );
                    admission.excluded.push(ExcludedPackage {
                        key,
                        error: format!("{err:#}"),
                    });
                }
            }
        }
        admission
    }

    fn run(&self) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let descriptors = self.registry.discover().map_err(RunError::Discovery)?;
        info!(count = descriptors.len(), "discovered descriptors");

        let Admission {
            mut worklist,
            resolved,
            skipped,
            mut excluded,
        } = self.admit(descriptors);

        let mut installed = Vec::new();
        let mut failed = Vec::new();
        let mut attempts: HashMap<String, u32> = HashMap::new();

        // Drain in LIFO order. A successful install does NOT mark its key
        // resolved: only evaluator skips do. A dependency satisfied solely
        // by a fresh install of this same run therefore never resolves and
        // runs into the attempt ceiling.
        while let Some(descriptor) = worklist.pop() {
            let key = descriptor.key().to_string();
            let ready = descriptor
                .dependencies()
                .iter()
                .all(|dep| resolved.contains(*dep));

            if !ready {
                let count = attempts.entry(key.clone()).or_insert(0);
                *count += 1;
                if *count > MAX_DEPENDENCY_ATTEMPTS {
                    let attempts = *count;
                    error!(
                        package = %key,
                        attempts,
                        "dependencies never resolved, aborting run"
                    );
                    return Err(RunError::DependenciesUnresolved { key, attempts });
                }
                info!(
                    package = %key,
                    attempt = *count,
                    "dependencies not yet resolved, requeueing"
                );
                worklist.push(descriptor);
                continue;
            }

            let staged = match self.stager.materialize(descriptor.as_ref()) {
                Ok(staged) => staged,
                Err(err) => {
                    error!(
                        package = %key,
                        "failed to materialize package, abandoning it for this run: {err:#}"
                    );
                    excluded.push(ExcludedPackage {
                        key,
                        error: format!("{err:#}"),
                    });
                    continue;
                }
            };

            info!(package = %key, path = %staged.path.display(), "installing package");
            match install_with_retry(
                self.installer.as_ref(),
                &self.scope,
                descriptor.as_ref(),
                &staged.path,
            ) {
                InvokeOutcome::Installed { retried } => {
                    info!(package = %key, "finished installing package");
                    installed.push(InstalledPackage {
                        key,
                        path: staged.path,
                        content_hash: staged.content_hash,
                        retried,
                    });
                }
                InvokeOutcome::Failed(err) => {
                    failed.push(FailedPackage {
                        key,
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            installed,
            skipped,
            excluded,
            failed,
        })
    }

    fn plan(&self) -> Result<PlanReport, RunError> {
        let descriptors = self.registry.discover().map_err(RunError::Discovery)?;
        let Admission {
            worklist,
            skipped,
            excluded,
            ..
        } = self.admit(descriptors);

        let admitted = worklist
            .iter()
            .map(|descriptor| AdmittedPackage {
                key: descriptor.key().to_string(),
                dependencies: descriptor
                    .dependencies()
                    .iter()
                    .map(|dep| dep.to_string())
                    .collect(),
                package: descriptor.package().to_string(),
            })
            .collect();

        Ok(PlanReport {
            admitted,
            skipped,
            excluded,
        })
    }
}
