use crate::core::connector::{RunOptions, DEFAULT_WINDOW_SIZE};
use crate::core::transform::FieldMapping;
use crate::domain::model::{ActionType, ReadMode, WorkflowType};
use crate::domain::ports::DeliveryMode;
use crate::domain::schema::FieldDescriptor;
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{Section, Validate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// 單一同步動作的 TOML 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub run: RunConfig,
    pub source: WarehouseConfig,
    pub destination: WarehouseConfig,
    #[serde(default)]
    pub transform: FieldMapping,
    #[serde(default)]
    pub read_parameters: Map<String, Value>,
    #[serde(default)]
    pub write_parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub action: String,
    pub description: Option<String>,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub read_mode: ReadMode,
    pub cursor: Option<String>,
    #[serde(default)]
    pub strict: bool,
    pub key_field: Option<String>,
    pub window_size: Option<usize>,
    pub write_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    #[default]
    PerRecord,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseKind {
    Http,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub kind: WarehouseKind,
    pub name: Option<String>,
    /// http
    pub endpoint: Option<String>,
    /// jsonl
    pub path: Option<String>,
    pub page_size: Option<usize>,
    /// 分頁參數名稱 (http)，預設 `page`
    pub page_param: Option<String>,
    #[serde(default)]
    pub delivery: Delivery,
    pub batch_size: Option<usize>,
    /// 增量讀取時傳遞游標的查詢參數 (http)
    pub cursor_param: Option<String>,
    pub cursor_field: Option<String>,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 參數宣告
    #[serde(default)]
    pub parameters: Vec<FieldDescriptor>,
    /// 資料欄位宣告
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

pub const DEFAULT_BATCH_SIZE: usize = 50;

impl WarehouseConfig {
    pub fn display_name(&self, fallback: &str) -> String {
        self.name.clone().unwrap_or_else(|| fallback.to_string())
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        match self.delivery {
            Delivery::PerRecord => DeliveryMode::PerRecord,
            Delivery::Batch => DeliveryMode::Batch {
                size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            },
        }
    }

    fn validate_section(&self, section: Section<'_>) -> Result<()> {
        match self.kind {
            WarehouseKind::Http => {
                section.endpoint("endpoint", section.require("endpoint", &self.endpoint)?)?;
            }
            WarehouseKind::Jsonl => section.file_path("path", section.require("path", &self.path)?)?,
        }

        section.at_least("page_size", self.page_size, 1)?;
        section.at_least("batch_size", self.batch_size, 1)?;
        if self.cursor_param.is_some() {
            section.require("cursor_field", &self.cursor_field)?;
        }
        Ok(())
    }
}

impl SyncConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        toml::from_str(&processed).map_err(|e| SyncError::config(format!("TOML parsing error: {}", e)))
    }

    /// 替換環境變數 (例如 ${API_KEY})；未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| SyncError::config(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });
        Ok(result.into_owned())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            read_mode: self.run.read_mode,
            cursor: self.run.cursor.clone(),
            strict: self.run.strict,
            window_size: self.run.window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
            write_concurrency: self.run.write_concurrency.unwrap_or(1),
            cancel: None,
        }
    }

    pub fn key_field(&self) -> &str {
        self.run.key_field.as_deref().unwrap_or("id")
    }
}

impl Validate for SyncConfig {
    fn validate(&self) -> Result<()> {
        let run = Section("run");
        run.non_blank("action", &self.run.action)?;
        run.at_least("window_size", self.run.window_size, 1)?;
        run.at_least("write_concurrency", self.run.write_concurrency, 1)?;
        self.source.validate_section(Section("source"))?;
        self.destination.validate_section(Section("destination"))?;
        Ok(())
    }
}
