use serde::{Deserialize, Serialize};

/// A validator and its human readable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Validator {
    /// Bech32 address of the validator.
    pub address: String,
    /// Configured name (moniker) of the validator.
    pub name: String,
}

impl Validator {
    /// Creates a new [`Validator`].
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self { address: address.into(), name: name.into() }
    }
}
