//! Descriptors declared in the host configuration file.

use crate::config::{DeclaredDescriptor, LoadoutConfig};
use crate::store::RecordId;

use super::registry::{DescriptorFactory, StaticUnit};
use super::{Descriptor, PackageSource, Requirement};

/// Name of the registry unit holding configuration-declared descriptors.
pub const CONFIG_UNIT: &str = "config";

/// Runtime form of a [`DeclaredDescriptor`].
#[derive(Debug, Clone)]
pub struct ConfigDescriptor {
    decl: DeclaredDescriptor,
}

impl ConfigDescriptor {
    pub fn new(decl: DeclaredDescriptor) -> anyhow::Result<Self> {
        if decl.key.trim().is_empty() {
            anyhow::bail!("declared descriptor has a blank key");
        }
        Ok(Self { decl })
    }
}

impl Descriptor for ConfigDescriptor {
    fn key(&self) -> &str {
        &self.decl.key
    }

    fn package(&self) -> PackageSource {
        PackageSource::File(self.decl.package.clone())
    }

    fn dependencies(&self) -> Vec<&str> {
        self.decl.dependencies.iter().map(String::as_str).collect()
    }

    fn short_circuit_requirements(&self) -> bool {
        self.decl.short_circuit_requirements
    }

    fn skip_if_all_records_exist(&self) -> bool {
        self.decl.skip_if_all_records_exist
    }

    fn requirements(&self) -> Vec<Requirement> {
        self.decl
            .requirements
            .iter()
            .map(|req| Requirement {
                store: req.store.clone(),
                record: RecordId::new(&req.record),
                required_fields: req.fields.clone(),
            })
            .collect()
    }
}

/// Build the `config` registry unit from a loaded configuration.
pub fn config_unit(config: &LoadoutConfig) -> StaticUnit {
    let factories = config
        .descriptors
        .iter()
        .map(|decl| {
            let type_name = if decl.key.trim().is_empty() {
                "<unnamed descriptor>".to_string()
            } else {
                decl.key.clone()
            };
            let decl = decl.clone();
            DescriptorFactory::new(type_name, move || {
                Ok(Box::new(ConfigDescriptor::new(decl.clone())?) as Box<dyn Descriptor>)
            })
        })
        .collect();
    StaticUnit::new(CONFIG_UNIT, factories)
}
