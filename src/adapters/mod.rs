// Adapters layer: concrete warehouses (http, jsonl, in-memory) and their
// construction from configuration.

pub mod http;
pub mod jsonl;
pub mod memory;

use crate::config::toml_config::{WarehouseConfig, WarehouseKind};
use crate::domain::ports::{DestinationWarehouse, SourceWarehouse};
use crate::domain::schema::FieldSchema;
use crate::utils::error::Result;
use crate::utils::validation::Section;
use std::sync::Arc;
use std::time::Duration;

pub use self::http::{HttpDestination, HttpSource};
pub use self::jsonl::{JsonlDestination, JsonlSource};
pub use self::memory::{MemoryDestination, MemorySource};

pub fn build_source(config: &WarehouseConfig) -> Result<Arc<dyn SourceWarehouse>> {
    let name = config.display_name("source");
    let readable = FieldSchema::new(config.fields.clone());

    let source: Arc<dyn SourceWarehouse> = match config.kind {
        WarehouseKind::Http => {
            let endpoint = Section("source").require("endpoint", &config.endpoint)?;
            let mut source = HttpSource::new(name, endpoint.clone())
                .with_headers(config.headers.clone())
                .with_read_parameters(FieldSchema::new(config.parameters.clone()))
                .with_readable_fields(readable);
            if let Some(page_size) = config.page_size {
                source = source.with_page_size(page_size);
            }
            if let Some(param) = &config.page_param {
                source = source.with_page_param(param.clone());
            }
            if let (Some(param), Some(field)) = (&config.cursor_param, &config.cursor_field) {
                source = source.with_incremental(param.clone(), field.clone());
            }
            if let Some(secs) = config.timeout_seconds {
                source = source.with_timeout(Duration::from_secs(secs));
            }
            Arc::new(source)
        }
        WarehouseKind::Jsonl => {
            let path = Section("source").require("path", &config.path)?;
            let mut source = JsonlSource::new(name, path).with_readable_fields(readable);
            if let Some(page_size) = config.page_size {
                source = source.with_page_size(page_size);
            }
            if let Some(field) = &config.cursor_field {
                source = source.with_cursor_field(field.clone());
            }
            Arc::new(source)
        }
    };
    Ok(source)
}

pub fn build_destination(config: &WarehouseConfig) -> Result<Arc<dyn DestinationWarehouse>> {
    let name = config.display_name("destination");

    let destination: Arc<dyn DestinationWarehouse> = match config.kind {
        WarehouseKind::Http => {
            let endpoint = Section("destination").require("endpoint", &config.endpoint)?;
            let mut destination = HttpDestination::new(name, endpoint.clone())
                .with_delivery(config.delivery_mode())
                .with_headers(config.headers.clone())
                .with_write_parameters(FieldSchema::new(config.parameters.clone()))
                .with_writable_fields(FieldSchema::new(config.fields.clone()));
            if let Some(secs) = config.timeout_seconds {
                destination = destination.with_timeout(Duration::from_secs(secs));
            }
            Arc::new(destination)
        }
        WarehouseKind::Jsonl => {
            let path = Section("destination").require("path", &config.path)?;
            Arc::new(JsonlDestination::new(name, path).with_delivery(config.delivery_mode()))
        }
    };
    Ok(destination)
}
