use crate::domain::model::Record;
use crate::utils::error::TransformError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 讀取與寫入之間的格式轉換
pub trait Transform: Send + Sync {
    fn apply(&self, record: Record) -> Result<Record, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(Record) -> Result<Record, TransformError> + Send + Sync,
{
    fn apply(&self, record: Record) -> Result<Record, TransformError> {
        self(record)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, record: Record) -> Result<Record, TransformError> {
        Ok(record)
    }
}

/// 以設定檔描述的欄位轉換
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// 原欄位名稱 -> 新欄位名稱
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
    /// Applied after renaming.
    #[serde(default)]
    pub keep_only_fields: Vec<String>,
    /// Must be present and non-empty after renaming.
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub trim_whitespace: bool,
}

impl FieldMapping {
    pub fn is_noop(&self) -> bool {
        self.field_mapping.is_empty()
            && self.keep_only_fields.is_empty()
            && self.required_fields.is_empty()
            && !self.trim_whitespace
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl Transform for FieldMapping {
    fn apply(&self, record: Record) -> Result<Record, TransformError> {
        let mut out = Record::new();

        for (key, value) in record.data {
            let key = self.field_mapping.get(&key).cloned().unwrap_or(key);
            let value = match value {
                Value::String(s) if self.trim_whitespace => Value::String(s.trim().to_string()),
                other => other,
            };
            out.insert(key, value);
        }

        if !self.keep_only_fields.is_empty() {
            out.data.retain(|k, _| self.keep_only_fields.contains(k));
        }

        let missing: Vec<&str> = self
            .required_fields
            .iter()
            .filter(|f| out.get(f).map_or(true, is_blank))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(TransformError::new(format!(
                "required fields missing or empty: {}",
                missing.join(", ")
            )));
        }

        Ok(out)
    }
}
