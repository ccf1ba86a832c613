//! Discovery over HTTP.
//!
//! [`HttpDiscovery`] implements the core `Discovery` collaborator against a location service
//! speaking JSON.

mod config;
pub use config::DiscoverConfig;

mod errors;
pub use errors::DiscoverError;

mod wire;
pub use wire::{RegisterRequest, RegisterResponse};

mod client;
pub use client::HttpDiscovery;
