use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};

use astra_model::{ComponentId, Location, Registration};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("discovery rejected registration: {0}")]
    Rejected(String),
    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

/// Location registry a supervisor announces its component to.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    async fn register(&self, registration: Registration) -> Result<(), DiscoveryError>;

    async fn unregister(&self, id: &ComponentId) -> Result<(), DiscoveryError>;

    async fn resolve(&self, id: &ComponentId) -> Result<Option<Location>, DiscoveryError>;
}

/// Process-local registry.
#[derive(Default)]
pub struct InMemoryDiscovery {
    entries: RwLock<HashMap<ComponentId, Registration>>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, id: &ComponentId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Discovery for InMemoryDiscovery {
    async fn register(&self, registration: Registration) -> Result<(), DiscoveryError> {
        debug!(component = %registration.id, location = %registration.location, "registered");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registration.id.clone(), registration);
        Ok(())
    }

    async fn unregister(&self, id: &ComponentId) -> Result<(), DiscoveryError> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        trace!(component = %id, existed = removed.is_some(), "unregistered");
        Ok(())
    }

    async fn resolve(&self, id: &ComponentId) -> Result<Option<Location>, DiscoveryError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(id).map(Registration::to_location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_model::ServiceType;

    #[tokio::test]
    async fn register_resolve_unregister() {
        let discovery = InMemoryDiscovery::new();
        let id = ComponentId::new("tcs", "mount");

        assert_eq!(discovery.resolve(&id).await.unwrap(), None);

        discovery
            .register(Registration::new(id.clone(), "http://mount:9000", ServiceType::Http))
            .await
            .unwrap();
        let loc = discovery.resolve(&id).await.unwrap().unwrap();
        assert_eq!(loc.uri, "http://mount:9000");
        assert_eq!(loc.service, ServiceType::Http);

        discovery.unregister(&id).await.unwrap();
        assert!(!discovery.is_registered(&id));
        assert!(discovery.is_empty());
    }
}
