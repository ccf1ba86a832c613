use serde::{Deserialize, Serialize};

use crate::ComponentId;

/// How a registered component can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceType {
    /// In-process command channel.
    Command,
    /// HTTP endpoint.
    Http,
    /// Raw TCP endpoint.
    Tcp,
}

impl Default for ServiceType {
    fn default() -> Self {
        ServiceType::Command
    }
}

/// A resolved network location of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: ComponentId,
    pub uri: String,
    pub service: ServiceType,
}

/// What a supervisor hands to the discovery service while its component is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: ComponentId,
    pub location: String,
    pub service: ServiceType,
}

impl Registration {
    pub fn new(id: ComponentId, location: impl Into<String>, service: ServiceType) -> Self {
        Self {
            id,
            location: location.into(),
            service,
        }
    }

    /// The location a client obtains when resolving this registration.
    pub fn to_location(&self) -> Location {
        Location {
            id: self.id.clone(),
            uri: self.location.clone(),
            service: self.service,
        }
    }
}
