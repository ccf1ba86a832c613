//! Component lifecycle supervision.
//!
//! A [`Container`] owns one [`Supervisor`] per configured component. Each supervisor runs as
//! its own task, serializes lifecycle transitions for its component, drives the component's
//! [`LifecycleHandler`] and keeps the component registered with [`Discovery`] while it runs.

pub mod error;
pub use error::{CoreError, LifecycleError};

pub mod collab;
pub use collab::{
    Discovery, DiscoveryError, InMemoryDiscovery, InMemoryStateStore, StateStore,
    StateSubscription, StateUpdate, StoreError,
};

pub mod events;
pub use events::{EventBus, EventKind, LifecycleEvent, Subscribe};

pub mod handler;
pub use handler::{ComponentContext, HandlerFailure, HealthReporter, LifecycleHandler};

pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics};

pub mod router;
pub use router::{BuildContext, HandlerFactory, HandlerRouter};

pub mod supervisor;
pub use supervisor::{Supervisor, SupervisorHandle};

pub mod container;
pub use container::{AggregateStatus, ComponentStatus, Container, ContainerStatus};

mod system;
pub use system::{default_location, host_name};
