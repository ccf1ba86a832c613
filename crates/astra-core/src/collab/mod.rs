//! Narrow contracts of the external collaborators this core consumes.
//!
//! Both collaborators are injected as trait objects so they can be faked in tests;
//! in-memory implementations are provided for single-process deployments.

mod discovery;
pub use discovery::{Discovery, DiscoveryError, InMemoryDiscovery};

mod store;
pub use store::{InMemoryStateStore, StateStore, StateSubscription, StateUpdate, StoreError};
