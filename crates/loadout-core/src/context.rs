//! Host path wiring: where the data root lives and what hangs off it.

use std::path::{Path, PathBuf};

use crate::config::LoadoutConfig;
use crate::stage::PackageStager;

/// Filesystem layout of the host data area.
#[derive(Debug, Clone)]
pub struct HostPaths {
    data_root: PathBuf,
}

impl HostPaths {
    /// Data root under the platform data directory.
    pub fn discover() -> anyhow::Result<Self> {
        let data_root = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join("loadout");
        Ok(Self { data_root })
    }

    /// Data root from configuration, falling back to [`Self::discover`].
    pub fn from_config(config: &LoadoutConfig) -> anyhow::Result<Self> {
        match &config.run.data_dir {
            Some(dir) => Ok(Self::with_data_root(dir.clone())),
            None => Self::discover(),
        }
    }

    pub fn with_data_root(data_root: PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Directory packages are staged into before installation.
    pub fn stage_dir(&self) -> PathBuf {
        self.data_root.join("packages").join("PackageAutoLoader")
    }

    pub fn stager(&self) -> PackageStager {
        PackageStager::new(self.stage_dir())
    }
}
