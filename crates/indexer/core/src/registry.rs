//! The validator registry: which validators the indexer knows, and under which name.

use std::collections::BTreeMap;
use thiserror::Error;
use tm2_indexer_rpc::ValidatorInfo;
use tm2_indexer_types::Validator;
use tracing::{debug, info};

/// Immutable mapping between validator addresses and configured names.
///
/// Built once at startup from the on-chain validator set and the configured names, then shared
/// read-only by every worker. Iteration is ordered by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorRegistry {
    /// Validator address to name.
    names: BTreeMap<String, String>,
}

impl ValidatorRegistry {
    /// Resolves the active validator set against the configured names.
    ///
    /// `configured` maps a validator name to its address, as written in the configuration file.
    /// Every validator of `active_set` must have a configured name; configured validators that
    /// are not in the active set are ignored.
    pub fn resolve(
        configured: &BTreeMap<String, String>,
        active_set: &[ValidatorInfo],
    ) -> Result<Self, RegistryError> {
        if active_set.is_empty() {
            return Err(RegistryError::EmptyValidatorSet);
        }

        let mut by_address: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, address) in configured {
            if let Some(previous) = by_address.insert(address.as_str(), name.as_str()) {
                return Err(RegistryError::DuplicateAddress {
                    address: address.clone(),
                    names: (previous.to_string(), name.clone()),
                });
            }
        }

        let mut names = BTreeMap::new();
        for validator in active_set {
            let name = by_address
                .get(validator.address.as_str())
                .ok_or_else(|| RegistryError::UnknownValidator(validator.address.clone()))?;
            debug!(target: "indexer::registry", address = %validator.address, name, "Resolved validator");
            names.insert(validator.address.clone(), (*name).to_string());
        }

        info!(target: "indexer::registry", validators = names.len(), "Validator registry resolved");
        Ok(Self { names })
    }

    /// Returns the number of known validators.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no validator is known.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `true` if `address` belongs to a known validator.
    pub fn contains(&self, address: &str) -> bool {
        self.names.contains_key(address)
    }

    /// Returns the configured name of the validator at `address`.
    pub fn name(&self, address: &str) -> Option<&str> {
        self.names.get(address).map(String::as_str)
    }

    /// Iterates over the known addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Returns the known validators as storable records.
    pub fn validators(&self) -> Vec<Validator> {
        self.names.iter().map(|(address, name)| Validator::new(address, name)).collect()
    }
}

impl FromIterator<Validator> for ValidatorRegistry {
    fn from_iter<I: IntoIterator<Item = Validator>>(iter: I) -> Self {
        Self { names: iter.into_iter().map(|v| (v.address, v.name)).collect() }
    }
}

/// Errors raised while resolving the [`ValidatorRegistry`]. All of them are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An active validator has no configured name.
    #[error("unknown validator with address {0}")]
    UnknownValidator(String),

    /// Two configured names point to the same address.
    #[error("address {address} is configured under two names: {} and {}", names.0, names.1)]
    DuplicateAddress {
        /// The shared address.
        address: String,
        /// The conflicting names.
        names: (String, String),
    },

    /// The chain returned an empty validator set.
    #[error("the chain returned an empty validator set")]
    EmptyValidatorSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(address: &str) -> ValidatorInfo {
        ValidatorInfo { address: address.to_string(), pub_key: None, voting_power: 1 }
    }

    fn configured(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(n, a)| (n.to_string(), a.to_string())).collect()
    }

    #[test]
    fn test_resolve_full_coverage() {
        let names = configured(&[("alice", "g1alice"), ("bob", "g1bob"), ("retired", "g1old")]);
        let registry = ValidatorRegistry::resolve(&names, &[info("g1bob"), info("g1alice")]).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name("g1alice"), Some("alice"));
        assert!(!registry.contains("g1old"));
        assert_eq!(registry.addresses().collect::<Vec<_>>(), vec!["g1alice", "g1bob"]);
        assert_eq!(
            registry.validators(),
            vec![Validator::new("g1alice", "alice"), Validator::new("g1bob", "bob")]
        );
    }

    #[test]
    fn test_resolve_unknown_validator_is_fatal() {
        let names = configured(&[("alice", "g1alice")]);
        let err = ValidatorRegistry::resolve(&names, &[info("g1alice"), info("g1mallory")])
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownValidator("g1mallory".to_string()));
    }

    #[test]
    fn test_resolve_duplicate_address() {
        let names = configured(&[("alice", "g1alice"), ("alias", "g1alice")]);
        let err = ValidatorRegistry::resolve(&names, &[info("g1alice")]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAddress { .. }));
    }

    #[test]
    fn test_resolve_empty_set() {
        let names = configured(&[("alice", "g1alice")]);
        assert_eq!(
            ValidatorRegistry::resolve(&names, &[]).unwrap_err(),
            RegistryError::EmptyValidatorSet
        );
    }
}
