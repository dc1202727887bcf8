//! Loadout Core Library
//!
//! Automatic package installation for content hosts: descriptors declare
//! packages plus the preconditions and dependencies under which they
//! apply, and a single trigger drives discovery, precondition evaluation
//! and dependency-ordered installation.

pub mod archive;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod install;
pub mod precondition;
pub mod report;
pub mod run;
pub mod stage;
pub mod store;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{DeclaredDescriptor, DeclaredRequirement, LoadoutConfig};

    // Descriptors
    pub use crate::descriptor::{
        config_unit, ConfigDescriptor, Descriptor, DescriptorFactory, DescriptorProvider,
        DescriptorRegistry, FileHooks, InstallMode, MergeMode, PackageSource, RecordHooks,
        Requirement, StaticUnit, CONFIG_UNIT,
    };

    // Stores
    pub use crate::store::{MemoryStore, MemoryStores, Record, RecordId, Store, StoreProvider};

    // Evaluation
    pub use crate::precondition::{Decision, PreconditionEvaluator, SkipReason};

    // Installation
    pub use crate::install::{
        ExecutionScope, InstallContext, NoopInstaller, PackageInstaller, ScopeState,
    };

    // Orchestration
    pub use crate::context::HostPaths;
    pub use crate::report::{PlanReport, RunReport};
    pub use crate::run::{PackageLoader, RunError, TriggerOutcome, MAX_DEPENDENCY_ATTEMPTS};
    pub use crate::stage::{MaterializedPackage, PackageStager};
}
