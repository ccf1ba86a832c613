use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{ConfigKey, Parameter, Units, Value};

/// Ordered key to typed-value-with-units mapping addressed by a prefix.
///
/// Used both for submitted setup/observe payloads and for published current state.
/// Values are immutable: every builder method returns a new `ConfigData`.
/// Equality is structural over prefix, keys, values and units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    prefix: ConfigKey,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    items: IndexMap<String, Parameter>,
}

impl ConfigData {
    pub fn new(prefix: ConfigKey) -> Self {
        Self {
            prefix,
            items: IndexMap::new(),
        }
    }

    /// Returns a copy of `self` with `key` set; an existing key keeps its position.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>, units: Units) -> Self {
        self.items.insert(key.into(), Parameter::new(value, units));
        self
    }

    /// Returns a copy of `self` without `key`.
    #[must_use]
    pub fn without(mut self, key: &str) -> Self {
        self.items.shift_remove(key);
        self
    }

    /// Returns a new config holding `self`'s items overridden by `other`'s.
    ///
    /// The prefix of `self` is kept.
    pub fn merged(&self, other: &ConfigData) -> ConfigData {
        let mut items = self.items.clone();
        for (k, v) in &other.items {
            items.insert(k.clone(), v.clone());
        }
        ConfigData {
            prefix: self.prefix.clone(),
            items,
        }
    }

    pub fn prefix(&self) -> &ConfigKey {
        &self.prefix
    }

    pub fn subsystem(&self) -> &str {
        self.prefix.subsystem()
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.items.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.items.get(key).map(|p| &p.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether every item of `demand` is present in `self` with an equal value.
    ///
    /// Prefixes must be equal. Units are compared only when `with_units` is set.
    pub fn satisfies(&self, demand: &ConfigData, with_units: bool) -> bool {
        if self.prefix != demand.prefix {
            return false;
        }
        demand.items.iter().all(|(key, want)| match self.items.get(key) {
            Some(have) => have.value == want.value && (!with_units || have.units == want.units),
            None => false,
        })
    }
}

impl fmt::Display for ConfigData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.prefix)?;
        for (i, (k, v)) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str(")")
    }
}
