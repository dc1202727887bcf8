//! Explicit descriptor registration and discovery.
//!
//! Registration is grouped into units: each [`DescriptorProvider`] stands
//! in for one loaded code unit of the host and enumerates the descriptor
//! factories it ships. The deny-list excludes whole units by name, and a
//! unit that fails to enumerate is reported and skipped without touching
//! the descriptors of other units.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use super::Descriptor;

/// Constructs one descriptor instance per orchestration run.
#[derive(Clone)]
pub struct DescriptorFactory {
    type_name: String,
    construct: Arc<dyn Fn() -> anyhow::Result<Box<dyn Descriptor>> + Send + Sync>,
}

impl DescriptorFactory {
    pub fn new(
        type_name: impl Into<String>,
        construct: impl Fn() -> anyhow::Result<Box<dyn Descriptor>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            construct: Arc::new(construct),
        }
    }

    /// Factory for descriptors with a `Default` construction.
    pub fn of<D: Descriptor + Default + 'static>(type_name: impl Into<String>) -> Self {
        Self::new(type_name, || Ok(Box::new(D::default()) as Box<dyn Descriptor>))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn instantiate(&self) -> anyhow::Result<Box<dyn Descriptor>> {
        (self.construct)()
    }
}

impl fmt::Debug for DescriptorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorFactory")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// One registration unit: the explicit counterpart of a loaded code unit.
pub trait DescriptorProvider: Send + Sync {
    fn unit_name(&self) -> &str;

    /// Enumerate this unit's descriptor factories.
    ///
    /// `Err` models a partially loadable unit: discovery logs it and moves
    /// on to the remaining units.
    fn factories(&self) -> anyhow::Result<Vec<DescriptorFactory>>;
}

/// A fixed, named set of descriptor factories.
#[derive(Debug, Clone)]
pub struct StaticUnit {
    name: String,
    factories: Vec<DescriptorFactory>,
}

impl StaticUnit {
    pub fn new(name: impl Into<String>, factories: Vec<DescriptorFactory>) -> Self {
        Self {
            name: name.into(),
            factories,
        }
    }
}

impl DescriptorProvider for StaticUnit {
    fn unit_name(&self) -> &str {
        &self.name
    }

    fn factories(&self) -> anyhow::Result<Vec<DescriptorFactory>> {
        Ok(self.factories.clone())
    }
}

/// Registry of descriptor providers with a unit deny-list.
#[derive(Default)]
pub struct DescriptorRegistry {
    providers: Vec<Box<dyn DescriptorProvider>>,
    deny_units: HashSet<String>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<dyn DescriptorProvider>) {
        self.providers.push(provider);
    }

    /// Register a fixed set of factories as one unit.
    pub fn register_unit(&mut self, name: impl Into<String>, factories: Vec<DescriptorFactory>) {
        self.register(Box::new(StaticUnit::new(name, factories)));
    }

    /// Exclude a unit from discovery.
    pub fn deny(&mut self, unit: impl Into<String>) {
        self.deny_units.insert(unit.into());
    }

    pub fn deny_all<I, S>(&mut self, units: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for unit in units {
            self.deny(unit);
        }
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .map(|provider| provider.unit_name())
            .collect()
    }

    /// Construct one instance of every registered descriptor, in
    /// registration order.
    ///
    /// Deny-listed units are skipped and a unit whose enumeration fails is
    /// logged and skipped. A factory that fails to construct is fatal, as
    /// is a descriptor key registered twice: both indicate a malformed
    /// registration rather than a broken unit.
    pub fn discover(&self) -> anyhow::Result<Vec<Box<dyn Descriptor>>> {
        let mut descriptors: Vec<Box<dyn Descriptor>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for provider in &self.providers {
            let unit = provider.unit_name();
            if self.deny_units.contains(unit) {
                debug!(unit, "unit is deny-listed, skipping its descriptors");
                continue;
            }
            let factories = match provider.factories() {
                Ok(factories) => factories,
                Err(err) => {
                    warn!(unit, "unit failed to enumerate descriptors, skipping it: {err:#}");
                    continue;
                }
            };
            for factory in factories {
                let descriptor = factory.instantiate().with_context(|| {
                    format!(
                        "descriptor {} from unit {unit} could not be constructed",
                        factory.type_name()
                    )
                })?;
                if !seen.insert(descriptor.key().to_string()) {
                    anyhow::bail!(
                        "descriptor key '{}' registered more than once (unit {unit})",
                        descriptor.key()
                    );
                }
                descriptors.push(descriptor);
            }
        }
        Ok(descriptors)
    }
}

impl fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("units", &self.unit_names())
            .field("deny_units", &self.deny_units)
            .finish()
    }
}
