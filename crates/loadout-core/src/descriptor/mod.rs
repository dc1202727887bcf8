//! Install-unit descriptors: what a package is and when it applies.
//!
//! A descriptor binds a package (embedded bytes or a file on disk) to the
//! preconditions and dependencies under which it installs. Descriptors are
//! registered through the [`registry`] and constructed fresh for every
//! orchestration run.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::store::RecordId;

pub mod declared;
pub mod registry;

pub use declared::{config_unit, ConfigDescriptor, CONFIG_UNIT};
pub use registry::{DescriptorFactory, DescriptorProvider, DescriptorRegistry, StaticUnit};

/// Where a descriptor's package bytes come from.
#[derive(Debug, Clone)]
pub enum PackageSource {
    /// Package bytes shipped inside the host program, identified by a
    /// dot-separated package id such as `demo.content.zip`.
    Embedded {
        id: String,
        bytes: Cow<'static, [u8]>,
    },
    /// Package file already present on disk, used in place.
    File(PathBuf),
}

impl PackageSource {
    pub fn embedded(id: impl Into<String>, bytes: &'static [u8]) -> Self {
        Self::Embedded {
            id: id.into(),
            bytes: Cow::Borrowed(bytes),
        }
    }

    pub fn embedded_owned(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Embedded {
            id: id.into(),
            bytes: Cow::Owned(bytes),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded { id, .. } => write!(f, "embedded package {id}"),
            Self::File(path) => write!(f, "package file {}", path.display()),
        }
    }
}

/// One precondition: the state of a record in a named target store.
///
/// A requirement describes evidence of a PRIOR install. When the evidence
/// is found the descriptor is skipped; when a lookup step cannot even be
/// carried out (blank or unknown store) the descriptor is skipped as well,
/// since installing against an unreachable store cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Target store name. Blank disqualifies the descriptor outright.
    pub store: String,

    /// Target record identifier.
    pub record: RecordId,

    /// Expected field values. `None` means the record's bare existence
    /// already counts as installed; `Some` means the record only counts
    /// once every listed field matches.
    pub required_fields: Option<HashMap<String, String>>,
}

impl Requirement {
    /// Requirement against the default `master` store.
    pub fn new(record: impl Into<RecordId>) -> Self {
        Self::in_store("master", record)
    }

    pub fn in_store(store: impl Into<String>, record: impl Into<RecordId>) -> Self {
        Self {
            store: store.into(),
            record: record.into(),
            required_fields: None,
        }
    }

    /// Add an expected field value, creating the field map if absent.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_fields
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// How the installer treats records that already exist in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    #[default]
    Overwrite,
    Merge,
    Skip,
}

/// Merge policy applied when [`InstallMode::Merge`] is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    #[default]
    Undefined,
    Clear,
    Append,
    Merge,
}

/// Per-record install behavior handed to the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHooks {
    pub mode: InstallMode,
    pub merge: MergeMode,
}

/// Per-file install behavior handed to the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHooks {
    /// Overwrite files already present in the target.
    pub overwrite: bool,
}

impl Default for FileHooks {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

/// A registered install unit: one package plus the preconditions and
/// dependencies under which it applies.
///
/// The trait carries defaults for everything but identity, package and
/// requirements, so a minimal descriptor is three methods.
pub trait Descriptor: Send {
    /// Stable identity, also the dependency key other descriptors use.
    fn key(&self) -> &str;

    /// The package this descriptor installs.
    fn package(&self) -> PackageSource;

    /// Keys of descriptors that must be resolved before this one installs.
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// When true (the default) requirement evaluation stops at the first
    /// disqualifier; when false every requirement is evaluated and each
    /// disqualifier is reported. The admit/skip outcome is the same either
    /// way.
    fn short_circuit_requirements(&self) -> bool {
        true
    }

    /// Opt into the fast-path check that skips the whole descriptor when
    /// every record in its package archive already exists in its target
    /// store.
    fn skip_if_all_records_exist(&self) -> bool {
        false
    }

    /// Free-form predicate; returning false skips the descriptor.
    fn custom_requirement(&self) -> bool {
        true
    }

    /// Conjunctive precondition list, evaluated in order.
    fn requirements(&self) -> Vec<Requirement>;

    fn record_hooks(&self) -> RecordHooks {
        RecordHooks::default()
    }

    fn file_hooks(&self) -> FileHooks {
        FileHooks::default()
    }
}
