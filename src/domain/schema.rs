use crate::domain::model::Record;
use crate::utils::error::FieldError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 欄位資料型別，每個型別對應一個轉換函式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    List,
    Object,
    Any,
}

type Coercion = fn(&Value) -> Option<Value>;

impl DataType {
    fn coercion(self) -> Coercion {
        match self {
            DataType::String => coerce_string,
            DataType::Integer => coerce_integer,
            DataType::Number => coerce_number,
            DataType::Boolean => coerce_boolean,
            DataType::Date => coerce_date,
            DataType::List => coerce_list,
            DataType::Object => coerce_object,
            DataType::Any => |v| Some(v.clone()),
        }
    }

    /// `None` when the raw value cannot be represented as this type.
    pub fn coerce(self, raw: &Value) -> Option<Value> {
        (self.coercion())(raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::List => "list",
            DataType::Object => "object",
            DataType::Any => "any",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn coerce_string(raw: &Value) -> Option<Value> {
    match raw {
        Value::String(_) => Some(raw.clone()),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn coerce_integer(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Some(raw.clone());
            }
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then(|| Value::from(f as i64))
        }
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_number(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(_) => Some(raw.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(Value::from(i));
            }
            let f = trimmed.parse::<f64>().ok()?;
            serde_json::Number::from_f64(f).map(Value::Number)
        }
        _ => None,
    }
}

fn coerce_boolean(raw: &Value) -> Option<Value> {
    match raw {
        Value::Bool(_) => Some(raw.clone()),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "0" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

// RFC 3339 或 YYYY-MM-DD，統一輸出 RFC 3339 (UTC)
fn coerce_date(raw: &Value) -> Option<Value> {
    let s = raw.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        let utc = dt.with_timezone(&Utc);
        return Some(Value::String(utc.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let utc = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some(Value::String(utc.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
}

fn coerce_list(raw: &Value) -> Option<Value> {
    raw.is_array().then(|| raw.clone())
}

fn coerce_object(raw: &Value) -> Option<Value> {
    raw.is_object().then(|| raw.clone())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 檢查單一欄位；回傳轉換後的值，缺值且非必填時回傳 `Ok(None)`
    fn check(&self, raw: Option<&Value>) -> Result<Option<Value>, FieldError> {
        match raw {
            None | Some(Value::Null) if self.required => Err(FieldError::MissingField {
                field: self.name.clone(),
            }),
            None | Some(Value::Null) => Ok(None),
            Some(value) => match self.data_type.coerce(value) {
                Some(coerced) => Ok(Some(coerced)),
                None => Err(FieldError::TypeMismatch {
                    field: self.name.clone(),
                    expected: self.data_type.to_string(),
                    found: json_type_name(value).to_string(),
                }),
            },
        }
    }
}

/// 倉庫宣告的欄位集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates every declared field and collects all errors.
    ///
    /// Declared values are replaced by their coerced form. Undeclared values
    /// are kept as-is, or reported as `UnknownField` when `strict` is set.
    pub fn check_values(
        &self,
        values: &Map<String, Value>,
        strict: bool,
    ) -> Result<Map<String, Value>, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut checked = values.clone();

        for field in &self.fields {
            match field.check(values.get(&field.name)) {
                Ok(Some(coerced)) => {
                    checked.insert(field.name.clone(), coerced);
                }
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        if strict {
            for name in values.keys() {
                if self.get(name).is_none() {
                    errors.push(FieldError::UnknownField {
                        field: name.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(checked)
        } else {
            Err(errors)
        }
    }

    /// 在邊界檢查一筆資料（不啟用 strict，未宣告的欄位原樣保留）
    pub fn check_record(&self, record: Record) -> Result<Record, Vec<FieldError>> {
        if self.fields.is_empty() {
            return Ok(record);
        }
        self.check_values(&record.data, false).map(Record::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_coercions() {
        assert_eq!(DataType::String.coerce(&json!(12)), Some(json!("12")));
        assert_eq!(DataType::Integer.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(DataType::Integer.coerce(&json!(3.0)), Some(json!(3)));
        assert_eq!(DataType::Integer.coerce(&json!(3.5)), None);
        assert_eq!(DataType::Number.coerce(&json!("2.5")), Some(json!(2.5)));
        assert_eq!(DataType::Boolean.coerce(&json!("Yes")), Some(json!(true)));
        assert_eq!(DataType::Boolean.coerce(&json!("maybe")), None);
        assert_eq!(DataType::List.coerce(&json!({})), None);
        assert_eq!(DataType::Object.coerce(&json!({"a": 1})), Some(json!({"a": 1})));
        assert_eq!(DataType::Any.coerce(&json!(null)), Some(json!(null)));
    }

    #[test]
    fn test_date_coercion_normalizes_to_rfc3339() {
        assert_eq!(
            DataType::Date.coerce(&json!("2024-03-01")),
            Some(json!("2024-03-01T00:00:00Z"))
        );
        assert_eq!(
            DataType::Date.coerce(&json!("2024-03-01T10:00:00+02:00")),
            Some(json!("2024-03-01T08:00:00Z"))
        );
        assert_eq!(DataType::Date.coerce(&json!("01/03/2024")), None);
        assert_eq!(DataType::Date.coerce(&json!(20240301)), None);
    }

    #[test]
    fn test_check_values_collects_all_errors() {
        let schema = FieldSchema::new(vec![
            FieldDescriptor::required("api_key", DataType::String),
            FieldDescriptor::required("limit", DataType::Integer),
            FieldDescriptor::optional("active", DataType::Boolean),
        ]);

        let errors = schema
            .check_values(&values(json!({"limit": "many", "active": "nope"})), false)
            .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&FieldError::MissingField {
            field: "api_key".to_string()
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, FieldError::TypeMismatch { field, .. } if field == "limit")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, FieldError::TypeMismatch { field, .. } if field == "active")));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let schema = FieldSchema::new(vec![FieldDescriptor::required("api_key", DataType::String)]);
        let errors = schema
            .check_values(&values(json!({"api_key": null})), false)
            .unwrap_err();
        assert_eq!(
            errors,
            vec![FieldError::MissingField {
                field: "api_key".to_string()
            }]
        );
    }

    #[test]
    fn test_unknown_fields_only_rejected_in_strict_mode() {
        let schema = FieldSchema::new(vec![FieldDescriptor::optional("limit", DataType::Integer)]);
        let input = values(json!({"limit": 5, "extra": true}));

        let lenient = schema.check_values(&input, false).unwrap();
        assert_eq!(lenient.get("extra"), Some(&json!(true)));

        let errors = schema.check_values(&input, true).unwrap_err();
        assert_eq!(
            errors,
            vec![FieldError::UnknownField {
                field: "extra".to_string()
            }]
        );
    }

    #[test]
    fn test_check_record_coerces_declared_fields() {
        let schema = FieldSchema::new(vec![
            FieldDescriptor::required("id", DataType::Integer),
            FieldDescriptor::optional("created_at", DataType::Date),
        ]);
        let record = Record::from_value(json!({"id": "7", "created_at": "2024-01-02", "x": 1})).unwrap();
        let checked = schema.check_record(record).unwrap();
        assert_eq!(checked.get("id"), Some(&json!(7)));
        assert_eq!(checked.get("created_at"), Some(&json!("2024-01-02T00:00:00Z")));
        assert_eq!(checked.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_descriptor_deserializes_from_toml_shape() {
        let field: FieldDescriptor =
            serde_json::from_value(json!({"name": "board_key", "type": "string", "required": true}))
                .unwrap();
        assert_eq!(field, FieldDescriptor::required("board_key", DataType::String));
    }
}
