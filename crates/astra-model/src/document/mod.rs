//! Container configuration document.
//!
//! A container is built from an ordered list of component descriptors. The document is
//! validated as a whole before any supervisor exists, so a malformed document never leaves
//! half a container running.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{ComponentId, ComponentKind, ConfigError, ServiceType, TimeoutMs};

/// What a supervisor does when its component fails while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "policy")]
pub enum RestartPolicy {
    /// Stay in `Error` until an external restart command.
    Never,
    /// Re-enter `Uninitialized` and replay initialize/startup.
    #[serde(rename_all = "camelCase")]
    OnError {
        /// Upper bound on automatic restarts; reset by an explicit restart.
        max_restarts: u32,
        /// Delay before each automatic restart.
        #[serde(default)]
        delay_ms: TimeoutMs,
    },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Never
    }
}

impl RestartPolicy {
    pub fn on_error(max_restarts: u32, delay_ms: TimeoutMs) -> Self {
        RestartPolicy::OnError {
            max_restarts,
            delay_ms,
        }
    }
}

/// One component entry of a container document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub id: ComponentId,
    pub kind: ComponentKind,
    /// Components this assembly coordinates. Always empty for HCDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subordinates: Vec<ComponentId>,
    #[serde(default)]
    pub restart: RestartPolicy,
    /// Maximum silence between heartbeats before the component counts as crashed.
    ///
    /// If `None`, heartbeat monitoring is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<TimeoutMs>,
    /// Location registered with discovery; derived from the host name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub service: ServiceType,
}

impl ComponentDescriptor {
    pub fn hcd(id: ComponentId) -> Self {
        Self::new(id, ComponentKind::Hcd, Vec::new())
    }

    pub fn assembly(id: ComponentId, subordinates: Vec<ComponentId>) -> Self {
        Self::new(id, ComponentKind::Assembly, subordinates)
    }

    fn new(id: ComponentId, kind: ComponentKind, subordinates: Vec<ComponentId>) -> Self {
        Self {
            id,
            kind,
            subordinates,
            restart: RestartPolicy::Never,
            heartbeat_ms: None,
            location: None,
            service: ServiceType::Command,
        }
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_heartbeat_ms(mut self, heartbeat_ms: TimeoutMs) -> Self {
        self.heartbeat_ms = Some(heartbeat_ms);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Configuration document a container is constructed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub name: String,
    pub components: Vec<ComponentDescriptor>,
}

// Wire shape with an untyped kind, so an unknown kind surfaces as its own error
// instead of a generic parse failure.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerDoc {
    name: String,
    #[serde(default)]
    components: Vec<DescriptorDoc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorDoc {
    id: ComponentId,
    kind: String,
    #[serde(default)]
    subordinates: Vec<ComponentId>,
    #[serde(default)]
    restart: RestartPolicy,
    #[serde(default)]
    heartbeat_ms: Option<TimeoutMs>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    service: ServiceType,
}

impl ContainerConfig {
    pub fn new(name: impl Into<String>, components: Vec<ComponentDescriptor>) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }

    /// Parse and validate a JSON container document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let doc: ContainerDoc =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut components = Vec::with_capacity(doc.components.len());
        for d in doc.components {
            let kind = d
                .kind
                .parse::<ComponentKind>()
                .map_err(|_| ConfigError::UnknownKind(d.kind.clone()))?;
            components.push(ComponentDescriptor {
                id: d.id,
                kind,
                subordinates: d.subordinates,
                restart: d.restart,
                heartbeat_ms: d.heartbeat_ms,
                location: d.location,
                service: d.service,
            });
        }

        let cfg = ContainerConfig {
            name: doc.name,
            components,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the document as a whole.
    ///
    /// Rejects: empty documents, duplicate ids, HCDs with subordinates, self references,
    /// dangling subordinate references, subordinate cycles and zero heartbeat periods.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.components.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashSet::new();
        for c in &self.components {
            if !seen.insert(&c.id) {
                return Err(ConfigError::DuplicateComponent(c.id.clone()));
            }
            if c.heartbeat_ms == Some(0) {
                return Err(ConfigError::InvalidSettings {
                    id: c.id.clone(),
                    reason: "heartbeatMs must be positive".into(),
                });
            }
        }

        for c in &self.components {
            if c.kind == ComponentKind::Hcd && !c.subordinates.is_empty() {
                return Err(ConfigError::HcdWithSubordinates(c.id.clone()));
            }
            for sub in &c.subordinates {
                if sub == &c.id {
                    return Err(ConfigError::SelfSubordinate(c.id.clone()));
                }
                if !seen.contains(sub) {
                    return Err(ConfigError::DanglingSubordinate {
                        owner: c.id.clone(),
                        missing: sub.clone(),
                    });
                }
            }
        }

        self.check_cycles()
    }

    pub fn get(&self, id: &ComponentId) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| &c.id == id)
    }

    fn check_cycles(&self) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let edges: HashMap<&ComponentId, &[ComponentId]> = self
            .components
            .iter()
            .map(|c| (&c.id, c.subordinates.as_slice()))
            .collect();
        let mut marks: HashMap<&ComponentId, Mark> = HashMap::new();

        fn visit<'a>(
            id: &'a ComponentId,
            edges: &HashMap<&'a ComponentId, &'a [ComponentId]>,
            marks: &mut HashMap<&'a ComponentId, Mark>,
        ) -> Result<(), ConfigError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(ConfigError::SubordinateCycle(id.clone())),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            for sub in edges.get(id).copied().unwrap_or_default() {
                visit(sub, edges, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for c in &self.components {
            visit(&c.id, &edges, &mut marks)?;
        }
        Ok(())
    }
}
