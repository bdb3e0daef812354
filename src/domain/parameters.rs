use crate::domain::schema::FieldSchema;
use crate::utils::error::FieldError;
use serde_json::{Map, Value};

/// 動作參數模型：宣告欄位 + 驗證模式
#[derive(Debug, Clone, Default)]
pub struct ParametersModel {
    schema: FieldSchema,
    strict: bool,
}

impl ParametersModel {
    pub fn new(schema: FieldSchema) -> Self {
        Self {
            schema,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Pure, total validation. Every violation across every field is
    /// returned, never only the first one.
    pub fn validate(&self, values: &Map<String, Value>) -> Result<ValidatedParameters, Vec<FieldError>> {
        self.schema
            .check_values(values, self.strict)
            .map(|values| ValidatedParameters { values })
    }
}

/// 通過驗證的參數，只能由 `ParametersModel::validate` 產生
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParameters {
    values: Map<String, Value>,
}

impl ValidatedParameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 轉成查詢參數；巢狀值以 JSON 字串傳遞
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}
