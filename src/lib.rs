pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::SyncConfig;

pub use crate::core::connector::{ActionDescriptor, ActionRegistry, Connector, RunOptions};
pub use crate::core::hooks::{EventBus, EventObserver, TracingObserver};
pub use crate::core::report::{ActionReport, FailureDetail, FatalError, RunStatus};
pub use crate::core::transform::{FieldMapping, Identity, Transform};
pub use domain::model::{ActionType, Event, EventKind, ReadMode, Record, Stage, WorkflowType};
pub use domain::parameters::{ParametersModel, ValidatedParameters};
pub use domain::schema::{DataType, FieldDescriptor, FieldSchema};
pub use utils::error::{Result, SyncError};
