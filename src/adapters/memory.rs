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
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// 數值優先比較，否則以字串比較
fn compare_cursor(value: &Value, cursor: &str) -> Option<CmpOrdering> {
    match value {
        Value::Number(n) => {
            let lhs = n.as_f64()?;
            let rhs = cursor.parse::<f64>().ok()?;
            lhs.partial_cmp(&rhs)
        }
        Value::String(s) => match (s.parse::<f64>(), cursor.parse::<f64>()) {
            (Ok(lhs), Ok(rhs)) => lhs.partial_cmp(&rhs),
            _ => Some(s.as_str().cmp(cursor)),
        },
        _ => None,
    }
}

fn render_cursor(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// In-memory source. Page tokens are offsets into the item list.
pub struct MemorySource {
    name: String,
    items: Vec<Value>,
    page_size: usize,
    cursor_field: Option<String>,
    read_parameters: FieldSchema,
    readable_fields: FieldSchema,
    fail_on_page: Option<usize>,
    repeat_first_token: bool,
    page_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            items,
            page_size: DEFAULT_PAGE_SIZE,
            cursor_field: None,
            read_parameters: FieldSchema::empty(),
            readable_fields: FieldSchema::empty(),
            fail_on_page: None,
            repeat_first_token: false,
            page_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 設定後支援增量讀取
    pub fn with_cursor_field(mut self, field: impl Into<String>) -> Self {
        self.cursor_field = Some(field.into());
        self
    }

    pub fn with_read_parameters(mut self, schema: FieldSchema) -> Self {
        self.read_parameters = schema;
        self
    }

    pub fn with_readable_fields(mut self, schema: FieldSchema) -> Self {
        self.readable_fields = schema;
        self
    }

    /// Simulates a transport failure on the given 1-based page call.
    pub fn fail_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    /// 模擬有問題的分頁：每一頁都回傳第一頁的下一頁 token
    pub fn repeat_first_token(mut self) -> Self {
        self.repeat_first_token = true;
        self
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn visible_items(&self, cursor: Option<&str>) -> Vec<&Value> {
        match (cursor, &self.cursor_field) {
            (Some(cursor), Some(field)) => self
                .items
                .iter()
                .filter(|item| {
                    item.get(field)
                        .and_then(|v| compare_cursor(v, cursor))
                        .is_some_and(|o| o == CmpOrdering::Greater)
                })
                .collect(),
            _ => self.items.iter().collect(),
        }
    }
}

impl Warehouse for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        vec![ActionEndpoints::new(
            "memory.read",
            "Reads records from an in-process list",
            "memory://",
        )]
    }
}

#[async_trait]
impl SourceWarehouse for MemorySource {
    fn read_parameters(&self) -> FieldSchema {
        self.read_parameters.clone()
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
        record.get(self.cursor_field.as_deref()?).and_then(render_cursor)
    }

    async fn fetch_page(
        &self,
        _parameters: &ValidatedParameters,
        request: PageRequest,
    ) -> Result<Page, WarehouseError> {
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_page == Some(call) {
            return Err(WarehouseError::new("connection reset by peer"));
        }

        let offset = match request.page_token.as_deref() {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| WarehouseError::new(format!("invalid page token '{}'", token)))?,
        };
        let visible = self.visible_items(request.cursor.as_deref());
        let end = (offset + request.page_size).min(visible.len());
        let items: Vec<Value> = visible
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();

        if end >= visible.len() {
            return Ok(Page::last(items));
        }
        let next = if self.repeat_first_token {
            request.page_size
        } else {
            end
        };
        Ok(Page::with_next(items, next.to_string()))
    }
}

type RejectFn = Box<dyn Fn(&Record) -> Option<String> + Send + Sync>;

/// In-memory destination that keeps every accepted record.
pub struct MemoryDestination {
    name: String,
    mode: DeliveryMode,
    write_parameters: FieldSchema,
    writable_fields: FieldSchema,
    reject: Option<RejectFn>,
    failing_batches: Vec<usize>,
    written: Mutex<Vec<Record>>,
    batch_sizes: Mutex<Vec<usize>>,
    push_calls: AtomicUsize,
}

impl MemoryDestination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: DeliveryMode::PerRecord,
            write_parameters: FieldSchema::empty(),
            writable_fields: FieldSchema::empty(),
            reject: None,
            failing_batches: Vec::new(),
            written: Mutex::new(Vec::new()),
            batch_sizes: Mutex::new(Vec::new()),
            push_calls: AtomicUsize::new(0),
        }
    }

    pub fn batched(name: impl Into<String>, size: usize) -> Self {
        Self {
            mode: DeliveryMode::Batch { size },
            ..Self::new(name)
        }
    }

    pub fn with_write_parameters(mut self, schema: FieldSchema) -> Self {
        self.write_parameters = schema;
        self
    }

    pub fn with_writable_fields(mut self, schema: FieldSchema) -> Self {
        self.writable_fields = schema;
        self
    }

    /// 回傳 `Some(原因)` 的資料會被拒絕
    pub fn reject_when<F>(mut self, reject: F) -> Self
    where
        F: Fn(&Record) -> Option<String> + Send + Sync + 'static,
    {
        self.reject = Some(Box::new(reject));
        self
    }

    /// The 0-based batch call that fails without per-item detail.
    pub fn fail_batch(mut self, batch: usize) -> Self {
        self.failing_batches.push(batch);
        self
    }

    pub fn written(&self) -> Vec<Record> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// 所有寫入呼叫次數（單筆與批次）
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    fn rejection(&self, record: &Record) -> Option<String> {
        self.reject.as_ref().and_then(|reject| reject(record))
    }

    fn store(&self, records: impl IntoIterator<Item = Record>) -> Result<(), WarehouseError> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| WarehouseError::new("memory destination poisoned"))?;
        written.extend(records);
        Ok(())
    }
}

impl Warehouse for MemoryDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        vec![ActionEndpoints::new(
            "memory.write",
            "Stores records in an in-process list",
            "memory://",
        )]
    }
}

#[async_trait]
impl DestinationWarehouse for MemoryDestination {
    fn write_parameters(&self) -> FieldSchema {
        self.write_parameters.clone()
    }

    fn writable_fields(&self) -> FieldSchema {
        self.writable_fields.clone()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    async fn push_one(
        &self,
        _parameters: &ValidatedParameters,
        record: &Record,
    ) -> Result<(), WarehouseError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.rejection(record) {
            return Err(WarehouseError::new(reason));
        }
        self.store([record.clone()])
    }

    async fn push_batch(&self, _parameters: &ValidatedParameters, records: &[Record]) -> BatchOutcome {
        let call = self.push_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(records.len());
        }
        if self.failing_batches.contains(&call) {
            return BatchOutcome::Failed(WarehouseError::new("gateway timeout"));
        }

        let outcomes: Vec<Result<(), WarehouseError>> = records
            .iter()
            .map(|r| match self.rejection(r) {
                Some(reason) => Err(WarehouseError::new(reason)),
                None => Ok(()),
            })
            .collect();
        let accepted = records
            .iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(record, _)| record.clone());
        if let Err(e) = self.store(accepted) {
            return BatchOutcome::Failed(e);
        }

        if outcomes.iter().all(Result::is_ok) {
            BatchOutcome::Accepted
        } else {
            BatchOutcome::PerItem(outcomes)
        }
    }
}
