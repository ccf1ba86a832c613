mod component_id;
pub use component_id::{ComponentId, ComponentKind};

mod location;
pub use location::{Location, Registration, ServiceType};

mod run_id;
pub use run_id::{ObsId, RunId};

mod units;
pub use units::Units;

mod value;
pub use value::{Parameter, Value, ValueKind};

mod config_key;
pub use config_key::ConfigKey;

mod config_data;
pub use config_data::ConfigData;

mod command;
pub use command::{Command, CommandKind};

mod lifecycle;
pub use lifecycle::{LifecycleCommand, LifecycleState};

mod command_status;
pub use command_status::{CommandStatus, Outcome};

/// Period or deadline value in milliseconds.
///
/// Used in configuration documents where an explicit time limit is required.
pub type TimeoutMs = u64;
