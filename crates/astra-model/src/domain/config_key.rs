use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Dotted prefix identifying what a [`ConfigData`](crate::ConfigData) addresses.
///
/// The first segment names the subsystem (`nfiraos.ncc.trombone.move` belongs to `nfiraos`).
/// Prefixes double as state-store keys for published current state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigKey(String);

impl ConfigKey {
    pub fn new(prefix: impl Into<String>) -> Result<Self, ModelError> {
        let prefix = prefix.into();
        let valid = !prefix.is_empty()
            && !prefix.chars().any(char::is_whitespace)
            && prefix.split('.').all(|seg| !seg.is_empty());
        if !valid {
            return Err(ModelError::InvalidConfigKey(prefix));
        }
        Ok(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn subsystem(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConfigKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ConfigKey {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.0
    }
}
