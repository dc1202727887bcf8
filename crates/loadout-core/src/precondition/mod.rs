//! Precondition evaluation: decide install vs. skip for one descriptor.
//!
//! A descriptor's requirements describe evidence of a prior install, so
//! finding that evidence skips the descriptor. Lookups that cannot even be
//! carried out (blank or unresolvable store) skip it as well: installing
//! against an unreachable store cannot succeed. Every skip marks the
//! descriptor's key resolved so dependents see it as satisfied; only a
//! failed evaluation leaves the key unmarked.

use std::collections::HashSet;
use std::fmt;

use anyhow::Context;
use tracing::info;

use crate::archive;
use crate::descriptor::{Descriptor, Requirement};
use crate::stage::PackageStager;
use crate::store::{RecordId, StoreProvider};

/// Outcome of evaluating one descriptor.
#[derive(Debug)]
pub enum Decision {
    /// All checks passed; the descriptor is admitted for installation.
    Install,
    /// The descriptor is skipped; its key has been marked resolved.
    Skip { reasons: Vec<SkipReason> },
}

/// Why a descriptor was disqualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Every record in the package archive already exists.
    AllRecordsExist,
    /// The descriptor's custom predicate returned false.
    CustomRequirement,
    /// A requirement names a blank store.
    BlankStore,
    /// A requirement's store cannot be resolved.
    StoreUnavailable { store: String },
    /// The required record exists and no field expectations were declared.
    RecordExists { store: String, record: RecordId },
    /// The required record exists and every expected field matches.
    RecordFieldsMatch { store: String, record: RecordId },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllRecordsExist => {
                write!(f, "every record in the package already exists")
            }
            Self::CustomRequirement => write!(f, "custom requirement returned false"),
            Self::BlankStore => write!(f, "a requirement names a blank store"),
            Self::StoreUnavailable { store } => {
                write!(f, "store {store} is not available")
            }
            Self::RecordExists { store, record } => {
                write!(f, "record {record} already exists in store {store}")
            }
            Self::RecordFieldsMatch { store, record } => {
                write!(
                    f,
                    "record {record} in store {store} already carries the expected fields"
                )
            }
        }
    }
}

/// Evaluates descriptors against the host's stores.
pub struct PreconditionEvaluator<'a> {
    stores: &'a dyn StoreProvider,
    stager: &'a PackageStager,
}

impl<'a> PreconditionEvaluator<'a> {
    pub fn new(stores: &'a dyn StoreProvider, stager: &'a PackageStager) -> Self {
        Self { stores, stager }
    }

    /// Decide whether `descriptor` should install.
    ///
    /// Checks run in a fixed order: the whole-archive fast path (when
    /// opted into), the custom predicate, then the requirement list. An
    /// `Err` excludes the descriptor from the run entirely: it is neither
    /// installed nor marked resolved.
    pub fn should_install(
        &self,
        descriptor: &dyn Descriptor,
        resolved: &mut HashSet<String>,
    ) -> anyhow::Result<Decision> {
        let key = descriptor.key();

        if descriptor.skip_if_all_records_exist() {
            info!(package = %key, "checking whether every packaged record already exists");
            if self.all_records_exist(descriptor)? {
                return Ok(self.skip(key, vec![SkipReason::AllRecordsExist], resolved));
            }
        }

        if !descriptor.custom_requirement() {
            return Ok(self.skip(key, vec![SkipReason::CustomRequirement], resolved));
        }

        let mut reasons = Vec::new();
        for requirement in descriptor.requirements() {
            if let Some(reason) = self.disqualifier(&requirement)? {
                reasons.push(reason);
                if descriptor.short_circuit_requirements() {
                    break;
                }
            }
        }

        if reasons.is_empty() {
            Ok(Decision::Install)
        } else {
            Ok(self.skip(key, reasons, resolved))
        }
    }

    fn skip(
        &self,
        key: &str,
        reasons: Vec<SkipReason>,
        resolved: &mut HashSet<String>,
    ) -> Decision {
        for reason in &reasons {
            info!(package = %key, %reason, "package will not be installed");
        }
        resolved.insert(key.to_string());
        Decision::Skip { reasons }
    }

    /// Fast path: true when every record referenced by the package archive
    /// resolves in its named store. Archive and store errors propagate.
    fn all_records_exist(&self, descriptor: &dyn Descriptor) -> anyhow::Result<bool> {
        let staged = self.stager.materialize(descriptor)?;
        let refs = archive::scan_package_records(&staged.path)?;
        for record_ref in &refs {
            let store = self.stores.resolve(&record_ref.store).with_context(|| {
                format!(
                    "store {} referenced by the package archive is not available",
                    record_ref.store
                )
            })?;
            if store.record(&record_ref.id)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The disqualifying signal of one requirement, if any.
    fn disqualifier(&self, requirement: &Requirement) -> anyhow::Result<Option<SkipReason>> {
        if requirement.store.trim().is_empty() {
            return Ok(Some(SkipReason::BlankStore));
        }
        let Some(store) = self.stores.resolve(&requirement.store) else {
            return Ok(Some(SkipReason::StoreUnavailable {
                store: requirement.store.clone(),
            }));
        };
        let Some(record) = store.record(&requirement.record)? else {
            // No evidence of a prior install; this requirement votes to
            // proceed.
            return Ok(None);
        };
        match &requirement.required_fields {
            None => Ok(Some(SkipReason::RecordExists {
                store: requirement.store.clone(),
                record: requirement.record.clone(),
            })),
            Some(fields) => {
                let all_match = fields
                    .iter()
                    .all(|(field, expected)| record.field(field) == Some(expected.as_str()));
                if all_match {
                    Ok(Some(SkipReason::RecordFieldsMatch {
                        store: requirement.store.clone(),
                        record: requirement.record.clone(),
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }
}
