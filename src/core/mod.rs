pub mod connector;
pub mod hooks;
pub mod read_action;
pub mod report;
pub mod transform;
pub mod write_action;

pub use crate::domain::model::{Event, EventKind, ReadMode, Record};
pub use crate::domain::ports::{DestinationWarehouse, SourceWarehouse, Warehouse};
pub use crate::utils::error::Result;
