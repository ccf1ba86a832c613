//! Command dispatch and completion correlation.
//!
//! Commands enter a component through its [`CommandController`]. Assemblies fan commands out
//! to their subordinates through a [`DistributorController`]; HCDs execute them one at a time
//! against a [`HardwareDriver`]. Completion that the hardware cannot confirm is detected by a
//! [`StateMatcher`] watching published state. Every run is correlated by its `RunId`.

mod error;
pub use error::{CommandError, ValidationError};

mod config;
pub use config::{CommandContext, ControllerConfig};

pub mod validate;
pub use validate::{CommandSchema, CommandSet, ParamSpec};

mod status;
pub use status::{StatusHub, StatusStream};

mod controller;
pub use controller::{CommandController, ControllerDirectory, ControllerRef};

pub mod matcher;
pub use matcher::{DemandMatcher, MatchResult, MatcherHandle, StateMatcher};

pub mod distributor;
pub use distributor::{DistributorController, aggregate};

mod heartbeat;

pub mod hcd;
pub use hcd::{Completion, CurrentState, DriverError, HardwareDriver, HcdController, PeriodicHcdController};

pub mod assembly;
pub use assembly::{AssemblyBehavior, AssemblyController, ForwardAll, Plan};

pub mod lifecycle;
pub use lifecycle::{AssemblyFactory, AssemblyLifecycle, HcdFactory, HcdLifecycle};

pub mod prelude {
    pub use crate::{
        AssemblyFactory, CommandController, CommandError, Completion, ControllerDirectory,
        CurrentState, DemandMatcher, DriverError, HardwareDriver, HcdFactory,
    };
}
