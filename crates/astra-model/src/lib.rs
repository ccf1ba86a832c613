//! Shared data model for astra components.
//!
//! Everything exchanged between supervisors, controllers and collaborators lives here:
//! component identities, typed configuration payloads, lifecycle states, command statuses
//! and the container configuration document.

mod error;
pub use error::{ConfigError, ModelError};

mod domain;
pub use domain::*;

mod document;
pub use document::{ComponentDescriptor, ContainerConfig, RestartPolicy};
