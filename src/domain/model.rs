use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 一筆資料：欄位名稱到值的有序對應
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只接受 JSON 物件
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self { data }),
            _ => None,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.data.remove(field)
    }

    /// Identifying key of the record, rendered as a string.
    pub fn key(&self, key_field: &str) -> Option<String> {
        match self.data.get(key_field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// 每次重新讀取整個來源
    #[default]
    Full,
    /// 只讀取游標之後的資料
    Incremental,
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::Full => write!(f, "full"),
            ReadMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// pull: 來源是遠端系統；push: 目的地是遠端系統
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[default]
    Pull,
    Push,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Pull => write!(f, "pull"),
            ActionType::Push => write!(f, "push"),
        }
    }
}

/// pull: 排程觸發，分頁讀取來源
/// catch: 由事件或 webhook 觸發，資料隨事件一起送達
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    #[default]
    Pull,
    Catch,
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowType::Pull => write!(f, "pull"),
            WorkflowType::Catch => write!(f, "catch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Format,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Read => write!(f, "read"),
            Stage::Format => write!(f, "format"),
            Stage::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ReadSuccess,
    ReadFailure,
    FormatSuccess,
    FormatFailure,
    WriteSuccess,
    WriteFailure,
}

impl EventKind {
    pub fn stage(&self) -> Stage {
        match self {
            EventKind::ReadSuccess | EventKind::ReadFailure => Stage::Read,
            EventKind::FormatSuccess | EventKind::FormatFailure => Stage::Format,
            EventKind::WriteSuccess | EventKind::WriteFailure => Stage::Write,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::ReadFailure | EventKind::FormatFailure | EventKind::WriteFailure
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::ReadSuccess => "read_success",
            EventKind::ReadFailure => "read_failure",
            EventKind::FormatSuccess => "format_success",
            EventKind::FormatFailure => "format_failure",
            EventKind::WriteSuccess => "write_success",
            EventKind::WriteFailure => "write_failure",
        };
        f.write_str(name)
    }
}

/// 單次執行中同步產生、同步消費的生命週期事件
///
/// `record` is `None` when the failure is not tied to a single item
/// (source unreachable).
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub kind: EventKind,
    pub sequence: Option<usize>,
    pub record: Option<&'a Record>,
    pub record_key: Option<&'a str>,
    pub error: Option<&'a str>,
}

impl<'a> Event<'a> {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            sequence: None,
            record: None,
            record_key: None,
            error: None,
        }
    }

    pub fn at(mut self, sequence: usize) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_record(mut self, record: &'a Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_key(mut self, key: Option<&'a str>) -> Self {
        self.record_key = key;
        self
    }

    pub fn with_error(mut self, error: &'a str) -> Self {
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_preserves_field_order() {
        let record = Record::from_value(json!({"z": 1, "a": 2, "m": 3})).unwrap();
        let fields: Vec<&String> = record.data.keys().collect();
        assert_eq!(fields, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_record_key_rendering() {
        let record = Record::new().with("id", 42).with("ref", "abc").with("none", Value::Null);
        assert_eq!(record.key("id").as_deref(), Some("42"));
        assert_eq!(record.key("ref").as_deref(), Some("abc"));
        assert_eq!(record.key("none"), None);
        assert_eq!(record.key("missing"), None);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Record::from_value(json!([1, 2])).is_none());
        assert!(Record::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_read_mode_serde() {
        let mode: ReadMode = serde_json::from_value(json!("incremental")).unwrap();
        assert_eq!(mode, ReadMode::Incremental);
        assert_eq!(ReadMode::default(), ReadMode::Full);
    }

    #[test]
    fn test_event_kind_stage() {
        assert_eq!(EventKind::FormatFailure.stage(), Stage::Format);
        assert!(EventKind::WriteFailure.is_failure());
        assert!(!EventKind::ReadSuccess.is_failure());
        assert_eq!(EventKind::WriteSuccess.to_string(), "write_success");
    }
}
