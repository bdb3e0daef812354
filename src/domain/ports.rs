use crate::domain::model::Record;
use crate::domain::parameters::ValidatedParameters;
use crate::domain::schema::FieldSchema;
use crate::utils::error::WarehouseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// 倉庫底層使用的 API 操作說明，只供文件產生使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEndpoints {
    pub name: String,
    pub description: String,
    pub url: String,
}

impl ActionEndpoints {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
        }
    }
}

pub trait Warehouse: Send + Sync {
    fn name(&self) -> &str;

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    /// 增量讀取的游標；全量讀取時一律為 `None`
    pub cursor: Option<String>,
    /// `None` requests the first page.
    pub page_token: Option<String>,
    pub page_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Result<Value, WarehouseError>>,
    /// `None` means this is the last page.
    pub next_page_token: Option<String>,
}

impl Page {
    pub fn last(items: Vec<Value>) -> Self {
        Self {
            items: items.into_iter().map(Ok).collect(),
            next_page_token: None,
        }
    }

    pub fn with_next(items: Vec<Value>, token: impl Into<String>) -> Self {
        Self {
            items: items.into_iter().map(Ok).collect(),
            next_page_token: Some(token.into()),
        }
    }
}

#[async_trait]
pub trait SourceWarehouse: Warehouse {
    /// 讀取參數宣告
    fn read_parameters(&self) -> FieldSchema;

    /// Fields every read record is checked against.
    fn readable_fields(&self) -> FieldSchema {
        FieldSchema::empty()
    }

    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    fn supports_incremental(&self) -> bool {
        false
    }

    /// 由一筆資料算出下一次增量讀取的游標
    fn cursor_of(&self, _record: &Record) -> Option<String> {
        None
    }

    /// Fetches one page. An `Err` is a transport failure and ends the read.
    async fn fetch_page(
        &self,
        parameters: &ValidatedParameters,
        request: PageRequest,
    ) -> Result<Page, WarehouseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum DeliveryMode {
    PerRecord,
    Batch { size: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// 整批成功
    Accepted,
    /// 目的地回傳逐筆結果
    PerItem(Vec<Result<(), WarehouseError>>),
    /// 整批失敗且沒有逐筆資訊
    Failed(WarehouseError),
}

#[async_trait]
pub trait DestinationWarehouse: Warehouse {
    fn write_parameters(&self) -> FieldSchema;

    /// Fields every record is checked against before it is written.
    fn writable_fields(&self) -> FieldSchema {
        FieldSchema::empty()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::PerRecord
    }

    async fn push_one(
        &self,
        parameters: &ValidatedParameters,
        record: &Record,
    ) -> Result<(), WarehouseError>;

    async fn push_batch(&self, _parameters: &ValidatedParameters, _records: &[Record]) -> BatchOutcome {
        BatchOutcome::Failed(WarehouseError::new(format!(
            "destination '{}' does not support batch delivery",
            self.name()
        )))
    }
}
