//! Host configuration: run switches, the discovery deny-list, the record
//! snapshot backing the in-memory stores and declaratively registered
//! descriptors, loaded from `loadout.toml`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration file schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadoutConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Record snapshot for the standalone binary's in-memory stores:
    /// store name -> record id -> field values.
    #[serde(default)]
    pub stores: BTreeMap<String, StoreSnapshot>,

    /// Descriptors declared directly in configuration. They register as
    /// the `config` unit alongside descriptors compiled into the host.
    #[serde(default, rename = "descriptor")]
    pub descriptors: Vec<DeclaredDescriptor>,
}

impl LoadoutConfig {
    /// Load configuration from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Dispatch runs as fire-and-forget background work instead of
    /// blocking the trigger.
    #[serde(default = "default_background")]
    pub background: bool,

    /// Override of the host data root; defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            background: default_background(),
            data_dir: None,
        }
    }
}

fn default_background() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Registration units excluded from descriptor discovery.
    #[serde(default)]
    pub deny_units: Vec<String>,
}

/// Records of one store, as declared in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub records: BTreeMap<String, BTreeMap<String, String>>,
}

/// One descriptor declared in configuration. Declared packages are always
/// file sources; embedded packages only exist for compiled-in descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredDescriptor {
    /// Descriptor key, also the dependency handle other descriptors use.
    pub key: String,

    /// Path of the package file to install.
    pub package: PathBuf,

    /// Keys that must be resolved before this descriptor installs.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Skip the descriptor when every record in its package archive
    /// already exists in its target store.
    #[serde(default)]
    pub skip_if_all_records_exist: bool,

    /// Stop requirement evaluation at the first disqualifier.
    #[serde(default = "default_true")]
    pub short_circuit_requirements: bool,

    #[serde(default, rename = "requirement")]
    pub requirements: Vec<DeclaredRequirement>,
}

/// One precondition of a declared descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredRequirement {
    /// Target store name.
    #[serde(default = "default_store")]
    pub store: String,

    /// Target record identifier.
    pub record: String,

    /// Expected field values. Absent means bare record existence already
    /// counts as installed.
    #[serde(default)]
    pub fields: Option<HashMap<String, String>>,
}

fn default_true() -> bool {
    true
}

fn default_store() -> String {
    "master".to_string()
}
