//! Synchronous command validation.
//!
//! Runs before a RunId is minted; a rejected command leaves no trace in any controller.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use astra_model::{Command, CommandKind, ConfigKey, Units, ValueKind};

use crate::ValidationError;

/// Shape of one parameter of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub kind: ValueKind,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    pub fn required(kind: ValueKind, units: Units) -> Self {
        Self {
            kind,
            units,
            required: true,
        }
    }

    pub fn optional(kind: ValueKind, units: Units) -> Self {
        Self {
            kind,
            units,
            required: false,
        }
    }
}

/// Commands accepted under one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSchema {
    pub prefix: ConfigKey,
    /// Accepted kinds; empty accepts both.
    #[serde(default)]
    pub kinds: Vec<CommandKind>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
}

impl CommandSchema {
    pub fn new(prefix: ConfigKey) -> Self {
        Self {
            prefix,
            kinds: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn only(mut self, kind: CommandKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn param(mut self, key: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(key.into(), spec);
        self
    }

    pub fn check(&self, command: &Command) -> Result<(), ValidationError> {
        let prefix = self.prefix.as_str();
        if !self.kinds.is_empty() && !self.kinds.contains(&command.kind) {
            return Err(ValidationError::kind_not_allowed(prefix, command.kind));
        }

        for (key, param) in command.config.iter() {
            let spec = self
                .params
                .get(key)
                .ok_or_else(|| ValidationError::UnknownKey {
                    prefix: prefix.to_string(),
                    key: key.to_string(),
                })?;
            let found = param.value.kind();
            if found != spec.kind {
                return Err(ValidationError::TypeMismatch {
                    key: key.to_string(),
                    expected: spec.kind,
                    found,
                });
            }
            if param.units != spec.units {
                return Err(ValidationError::UnitsMismatch {
                    key: key.to_string(),
                    expected: spec.units,
                    found: param.units,
                });
            }
        }

        if let Some((key, _)) = self
            .params
            .iter()
            .find(|(key, spec)| spec.required && !command.config.contains_key(key))
        {
            return Err(ValidationError::MissingKey {
                prefix: prefix.to_string(),
                key: key.clone(),
            });
        }
        Ok(())
    }
}

/// Every command one component accepts.
///
/// A permissive set accepts any command; a strict set only the prefixes it knows.
#[derive(Debug, Clone, Default)]
pub struct CommandSet {
    schemas: HashMap<ConfigKey, CommandSchema>,
    strict: bool,
}

impl CommandSet {
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn strict(schemas: impl IntoIterator<Item = CommandSchema>) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|s| (s.prefix.clone(), s))
                .collect(),
            strict: true,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn schema(&self, prefix: &ConfigKey) -> Option<&CommandSchema> {
        self.schemas.get(prefix)
    }

    pub fn validate(&self, command: &Command) -> Result<(), ValidationError> {
        match self.schemas.get(command.prefix()) {
            Some(schema) => schema.check(command),
            None if self.strict => Err(ValidationError::UnknownPrefix(
                command.prefix().to_string(),
            )),
            None => Ok(()),
        }
    }
}
