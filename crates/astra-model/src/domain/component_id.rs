use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Stable identity of a component: owning subsystem plus component name.
///
/// Rendered as `subsystem.name`. Only the first dot separates the two parts, so names may
/// themselves contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentId {
    subsystem: String,
    name: String,
}

impl ComponentId {
    pub fn new(subsystem: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            name: name.into(),
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subsystem, self.name)
    }
}

impl FromStr for ComponentId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((subsystem, name)) if !subsystem.is_empty() && !name.is_empty() => {
                Ok(Self::new(subsystem, name))
            }
            _ => Err(ModelError::InvalidComponentId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ComponentId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.to_string()
    }
}

/// The two concrete kinds of component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComponentKind {
    /// Coordinates subordinate components; no direct hardware access.
    Assembly,
    /// Hardware control driver; talks to one device and publishes its state.
    Hcd,
}

impl ComponentKind {
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentKind::Assembly => "assembly",
            ComponentKind::Hcd => "hcd",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl FromStr for ComponentKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assembly" => Ok(ComponentKind::Assembly),
            "hcd" => Ok(ComponentKind::Hcd),
            _ => Err(ModelError::UnknownKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for ComponentKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentKind> for String {
    fn from(kind: ComponentKind) -> Self {
        kind.kind().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_id_display_and_parse() {
        let id = ComponentId::new("nfiraos", "ncc.trombone");
        assert_eq!(id.to_string(), "nfiraos.ncc.trombone");

        let back: ComponentId = "nfiraos.ncc.trombone".parse().unwrap();
        assert_eq!(back, id);
        assert_eq!(back.subsystem(), "nfiraos");
        assert_eq!(back.name(), "ncc.trombone");
    }

    #[test]
    fn component_id_rejects_missing_parts() {
        assert!("trombone".parse::<ComponentId>().is_err());
        assert!(".trombone".parse::<ComponentId>().is_err());
        assert!("nfiraos.".parse::<ComponentId>().is_err());
    }

    #[test]
    fn component_id_serializes_as_string() {
        let id = ComponentId::new("tcs", "mount");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""tcs.mount""#);
        assert!(serde_json::from_str::<ComponentId>(r#""mount""#).is_err());
    }

    #[test]
    fn kind_parse_is_case_insensitive() {
        assert_eq!("HCD".parse::<ComponentKind>().unwrap(), ComponentKind::Hcd);
        assert_eq!(
            " assembly ".parse::<ComponentKind>().unwrap(),
            ComponentKind::Assembly
        );
        assert_eq!(
            "sequencer".parse::<ComponentKind>(),
            Err(ModelError::UnknownKind("sequencer".into()))
        );
    }

    #[test]
    fn kind_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ComponentKind::Hcd).unwrap();
        assert_eq!(json, r#""hcd""#);

        let err = serde_json::from_str::<ComponentKind>(r#""container""#).unwrap_err();
        assert!(err.to_string().contains("unknown component kind"));
    }
}
