// Domain layer: records, field schemas and warehouse ports. No I/O here.

pub mod model;
pub mod parameters;
pub mod ports;
pub mod schema;
