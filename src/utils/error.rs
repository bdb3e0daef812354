use crate::domain::model::WorkflowType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 框架層級錯誤：設定載入、倉庫建構、CLI 使用
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Action '{name}' is already registered")]
    DuplicateAction { name: String },

    #[error("Action '{name}' is not registered")]
    ActionNotFound { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::ApiError(_) => ErrorCategory::Network,
            SyncError::IoError(_) => ErrorCategory::System,
            SyncError::SerializationError(_) => ErrorCategory::Data,
            SyncError::ConfigError { .. }
            | SyncError::MissingConfigError { .. }
            | SyncError::InvalidConfigValueError { .. }
            | SyncError::DuplicateAction { .. }
            | SyncError::ActionNotFound { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SyncError::ApiError(_) => "Could not reach the remote warehouse".to_string(),
            SyncError::IoError(e) => format!("File system error: {}", e),
            SyncError::SerializationError(_) => "Received malformed JSON data".to_string(),
            SyncError::ConfigError { message } => format!("Invalid configuration: {}", message),
            SyncError::MissingConfigError { field } => {
                format!("Required setting '{}' is missing", field)
            }
            SyncError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            SyncError::DuplicateAction { name } => {
                format!("Action '{}' is defined more than once", name)
            }
            SyncError::ActionNotFound { name } => format!("Unknown action '{}'", name),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check the endpoint URL, network access and credentials",
            ErrorCategory::System => "Check file paths and permissions",
            ErrorCategory::Data => "Inspect the warehouse response payload",
            ErrorCategory::Configuration => "Review the TOML configuration file",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// 單一欄位的驗證錯誤
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("unknown field '{field}'")]
    UnknownField { field: String },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::MissingField { field }
            | FieldError::TypeMismatch { field, .. }
            | FieldError::UnknownField { field } => field,
        }
    }
}

/// 執行前即可判定的致命錯誤，不會發出任何 I/O
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationError {
    #[error("read parameters: {error}")]
    ReadParameter { error: FieldError },

    #[error("write parameters: {error}")]
    WriteParameter { error: FieldError },

    #[error("incremental read mode requires a cursor")]
    MissingCursor,

    #[error("source '{source_name}' does not support incremental reads")]
    IncrementalNotSupported { source_name: String },

    #[error("action is a {declared} workflow and cannot be started as {requested}")]
    WorkflowMismatch {
        declared: WorkflowType,
        requested: WorkflowType,
    },
}

/// Failure reported by a warehouse implementation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct WarehouseError {
    pub message: String,
}

impl WarehouseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(e: reqwest::Error) -> Self {
        WarehouseError::new(e.to_string())
    }
}

impl From<std::io::Error> for WarehouseError {
    fn from(e: std::io::Error) -> Self {
        WarehouseError::new(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    /// 單筆資料格式錯誤，不影響後續讀取
    #[error("item #{index}: {message}")]
    Item {
        index: usize,
        record_key: Option<String>,
        message: String,
    },

    /// 傳輸層失敗，讀取串流就此結束
    #[error("source_unreachable: {message}")]
    SourceUnreachable { message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("item_failure: {message}")]
    Item { message: String },

    #[error("batch_failure: {message}")]
    Batch { message: String },
}

impl WriteError {
    pub fn reason(&self) -> &'static str {
        match self {
            WriteError::Item { .. } => "item_failure",
            WriteError::Batch { .. } => "batch_failure",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("observer failed: {message}")]
pub struct ObserverError {
    pub message: String,
}

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
