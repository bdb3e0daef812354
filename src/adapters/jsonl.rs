use crate::domain::model::Record;
use crate::domain::parameters::ValidatedParameters;
use crate::domain::ports::{
    ActionEndpoints, BatchOutcome, DeliveryMode, DestinationWarehouse, Page, PageRequest,
    SourceWarehouse, Warehouse, DEFAULT_PAGE_SIZE,
};
use crate::domain::schema::FieldSchema;
use crate::utils::error::WarehouseError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::io::SeekFrom;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

/// 讀取 JSON Lines 檔案，page token 為下一頁起始的位元組位置
///
/// 每頁從該位置 seek 後逐行讀取，不重新讀取整個檔案
pub struct JsonlSource {
    name: String,
    path: PathBuf,
    page_size: usize,
    cursor_field: Option<String>,
    readable_fields: FieldSchema,
}

impl JsonlSource {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
            cursor_field: None,
            readable_fields: FieldSchema::empty(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_cursor_field(mut self, field: impl Into<String>) -> Self {
        self.cursor_field = Some(field.into());
        self
    }

    pub fn with_readable_fields(mut self, schema: FieldSchema) -> Self {
        self.readable_fields = schema;
        self
    }

    fn after_cursor(&self, line: &Result<Value, WarehouseError>, cursor: Option<&str>) -> bool {
        let (Some(cursor), Some(field), Ok(value)) = (cursor, &self.cursor_field, line) else {
            return true;
        };
        match value.get(field) {
            Some(Value::String(s)) => s.as_str() > cursor,
            Some(Value::Number(n)) => match (n.as_f64(), cursor.parse::<f64>()) {
                (Some(lhs), Ok(rhs)) => lhs > rhs,
                _ => false,
            },
            _ => false,
        }
    }
}

impl Warehouse for JsonlSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        vec![ActionEndpoints::new(
            "read",
            "Reads one JSON object per line",
            format!("file://{}", self.path.display()),
        )]
    }
}

#[async_trait]
impl SourceWarehouse for JsonlSource {
    fn read_parameters(&self) -> FieldSchema {
        FieldSchema::empty()
    }

    fn readable_fields(&self) -> FieldSchema {
        self.readable_fields.clone()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn supports_incremental(&self) -> bool {
        self.cursor_field.is_some()
    }

    fn cursor_of(&self, record: &Record) -> Option<String> {
        match record.get(self.cursor_field.as_deref()?)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    async fn fetch_page(
        &self,
        _parameters: &ValidatedParameters,
        request: PageRequest,
    ) -> Result<Page, WarehouseError> {
        let offset: u64 = match request.page_token.as_deref() {
            None => 0,
            Some(token) => token
                .parse()
                .map_err(|_| WarehouseError::new(format!("invalid page token '{}'", token)))?,
        };

        let file = tokio::fs::File::open(&self.path).await?;
        let length = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset)).await?;

        let cursor = request.cursor.as_deref();
        let mut items = Vec::with_capacity(request.page_size);
        let mut position = offset;
        let mut line = String::new();
        while items.len() < request.page_size {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                break;
            }
            let line_start = position;
            position += read as u64;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(line.trim_end())
                .map_err(|e| WarehouseError::new(format!("byte {}: {}", line_start, e)));
            if self.after_cursor(&parsed, cursor) {
                items.push(parsed);
            }
        }

        let next_page_token = (position < length).then(|| position.to_string());
        Ok(Page {
            items,
            next_page_token,
        })
    }
}

/// 將資料附加到 JSON Lines 檔案
pub struct JsonlDestination {
    name: String,
    path: PathBuf,
    mode: DeliveryMode,
}

impl JsonlDestination {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            mode: DeliveryMode::PerRecord,
        }
    }

    pub fn with_delivery(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    async fn append(&self, records: &[Record]) -> Result<(), WarehouseError> {
        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| WarehouseError::new(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Warehouse for JsonlDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        vec![ActionEndpoints::new(
            "append",
            "Appends one JSON object per line",
            format!("file://{}", self.path.display()),
        )]
    }
}

#[async_trait]
impl DestinationWarehouse for JsonlDestination {
    fn write_parameters(&self) -> FieldSchema {
        FieldSchema::empty()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    async fn push_one(
        &self,
        _parameters: &ValidatedParameters,
        record: &Record,
    ) -> Result<(), WarehouseError> {
        self.append(std::slice::from_ref(record)).await
    }

    async fn push_batch(&self, _parameters: &ValidatedParameters, records: &[Record]) -> BatchOutcome {
        match self.append(records).await {
            Ok(()) => BatchOutcome::Accepted,
            Err(e) => BatchOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_source_pages_and_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.jsonl");
        std::fs::write(&path, "{\"id\":1}\nnot json\n\n{\"id\":3}\n").unwrap();

        let source = JsonlSource::new("profiles", &path).with_page_size(2);
        let params = ValidatedParameters::default();

        let first = source
            .fetch_page(&params, PageRequest { page_size: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.items[0].is_ok());
        assert!(first.items[1].is_err());
        // 兩行共 18 bytes
        assert_eq!(first.next_page_token.as_deref(), Some("18"));

        let second = source
            .fetch_page(
                &params,
                PageRequest {
                    page_size: 2,
                    page_token: first.next_page_token,
                    cursor: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_page_token.is_none());
    }

    #[test]
    fn test_missing_file_is_transport_error() {
        let source = JsonlSource::new("profiles", "/nonexistent/profiles.jsonl");
        let result = tokio_test::block_on(source.fetch_page(
            &ValidatedParameters::default(),
            PageRequest { page_size: 10, ..Default::default() },
        ));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_destination_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/jobs.jsonl");
        let destination = JsonlDestination::new("jobs", &path).with_delivery(DeliveryMode::Batch { size: 10 });
        let params = ValidatedParameters::default();

        let records = vec![
            Record::from_value(json!({"id": 1, "title": "Engineer"})).unwrap(),
            Record::from_value(json!({"id": 2, "title": "Designer"})).unwrap(),
        ];
        assert_eq!(destination.push_batch(&params, &records).await, BatchOutcome::Accepted);
        destination.push_one(&params, &records[0]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], r#"{"id":2,"title":"Designer"}"#);
    }
}
