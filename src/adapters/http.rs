use crate::domain::model::Record;
use crate::domain::parameters::ValidatedParameters;
use crate::domain::ports::{
    ActionEndpoints, BatchOutcome, DeliveryMode, DestinationWarehouse, Page, PageRequest,
    SourceWarehouse, Warehouse, DEFAULT_PAGE_SIZE,
};
use crate::domain::schema::FieldSchema;
use crate::utils::error::WarehouseError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

fn apply_headers(mut request: RequestBuilder, headers: &HashMap<String, String>) -> RequestBuilder {
    for (key, value) in headers {
        request = request.header(key, value);
    }
    request
}

fn render_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 透過 GET 分頁讀取 JSON 的來源
///
/// Accepted response bodies:
/// - a JSON array: the next page number is requested while pages are full;
/// - `{"items": [...], "next_page": <token or null>}`: the token (page number or
///   opaque cursor) is sent back unchanged in the page query parameter.
pub struct HttpSource {
    name: String,
    endpoint: String,
    client: Client,
    page_size: usize,
    page_param: String,
    headers: HashMap<String, String>,
    cursor_param: Option<String>,
    cursor_field: Option<String>,
    read_parameters: FieldSchema,
    readable_fields: FieldSchema,
    timeout: Option<Duration>,
}

impl HttpSource {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: Client::new(),
            page_size: DEFAULT_PAGE_SIZE,
            page_param: "page".to_string(),
            headers: HashMap::new(),
            cursor_param: None,
            cursor_field: None,
            read_parameters: FieldSchema::empty(),
            readable_fields: FieldSchema::empty(),
            timeout: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 傳遞頁碼或分頁游標的查詢參數名稱，預設 `page`
    pub fn with_page_param(mut self, param: impl Into<String>) -> Self {
        self.page_param = param.into();
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// 增量讀取：游標以 `param` 查詢參數傳遞，下一個游標取自 `field`
    pub fn with_incremental(mut self, param: impl Into<String>, field: impl Into<String>) -> Self {
        self.cursor_param = Some(param.into());
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Warehouse for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        vec![ActionEndpoints::new(
            "GET",
            "Paginated listing of records",
            self.endpoint.clone(),
        )]
    }
}

#[async_trait]
impl SourceWarehouse for HttpSource {
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
        self.cursor_param.is_some()
    }

    fn cursor_of(&self, record: &Record) -> Option<String> {
        record.get(self.cursor_field.as_deref()?).and_then(render_token)
    }

    async fn fetch_page(
        &self,
        parameters: &ValidatedParameters,
        request: PageRequest,
    ) -> Result<Page, WarehouseError> {
        let page = request.page_token.unwrap_or_else(|| "1".to_string());

        let mut query = parameters.to_query_pairs();
        query.push((self.page_param.clone(), page.clone()));
        query.push(("page_size".to_string(), request.page_size.to_string()));
        if let (Some(param), Some(cursor)) = (&self.cursor_param, &request.cursor) {
            query.push((param.clone(), cursor.clone()));
        }

        let mut http = apply_headers(self.client.get(&self.endpoint), &self.headers).query(&query);
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }

        tracing::debug!("Making API request to: {} (page {})", self.endpoint, page);
        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WarehouseError::new(format!(
                "GET {} returned HTTP {}",
                self.endpoint, status
            )));
        }

        let body: Value = response.json().await?;
        match body {
            Value::Array(items) => {
                if items.len() < request.page_size {
                    return Ok(Page::last(items));
                }
                // 陣列回應沒有 next_page，只能以頁碼遞增
                let number: u64 = page.parse().map_err(|_| {
                    WarehouseError::new(format!(
                        "array response cannot follow non-numeric page token '{}'",
                        page
                    ))
                })?;
                Ok(Page::with_next(items, (number + 1).to_string()))
            }
            Value::Object(mut obj) => {
                let items = match obj.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(WarehouseError::new(
                            "response object has no 'items' array",
                        ))
                    }
                };
                Ok(match obj.get("next_page").and_then(render_token) {
                    Some(next) => Page::with_next(items, next),
                    None => Page::last(items),
                })
            }
            other => Err(WarehouseError::new(format!(
                "unexpected response body: {}",
                other
            ))),
        }
    }
}

/// POST 寫入的目的地
///
/// Batch mode posts a JSON array; a `{"results": [{"ok": bool, "error": ...}]}`
/// response body gives per-item detail.
pub struct HttpDestination {
    name: String,
    endpoint: String,
    client: Client,
    mode: DeliveryMode,
    headers: HashMap<String, String>,
    write_parameters: FieldSchema,
    writable_fields: FieldSchema,
    timeout: Option<Duration>,
}

impl HttpDestination {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: Client::new(),
            mode: DeliveryMode::PerRecord,
            headers: HashMap::new(),
            write_parameters: FieldSchema::empty(),
            writable_fields: FieldSchema::empty(),
            timeout: None,
        }
    }

    pub fn with_delivery(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_write_parameters(mut self, schema: FieldSchema) -> Self {
        self.write_parameters = schema;
        self
    }

    pub fn with_writable_fields(mut self, schema: FieldSchema) -> Self {
        self.writable_fields = schema;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn post(&self, parameters: &ValidatedParameters) -> RequestBuilder {
        let mut request = apply_headers(self.client.post(&self.endpoint), &self.headers)
            .query(&parameters.to_query_pairs());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request
    }
}

fn parse_item_results(body: &Value) -> Option<Vec<Result<(), WarehouseError>>> {
    let results = body.get("results")?.as_array()?;
    Some(
        results
            .iter()
            .map(|item| {
                if item.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                    Ok(())
                } else {
                    let message = item
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("rejected by destination");
                    Err(WarehouseError::new(message))
                }
            })
            .collect(),
    )
}

impl Warehouse for HttpDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<ActionEndpoints> {
        let description = match self.mode {
            DeliveryMode::PerRecord => "Creates one record per request".to_string(),
            DeliveryMode::Batch { size } => format!("Creates up to {} records per request", size),
        };
        vec![ActionEndpoints::new("POST", description, self.endpoint.clone())]
    }
}

#[async_trait]
impl DestinationWarehouse for HttpDestination {
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
        parameters: &ValidatedParameters,
        record: &Record,
    ) -> Result<(), WarehouseError> {
        let response = self.post(parameters).json(record).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(WarehouseError::new(format!("HTTP {}: {}", status, body.trim())))
    }

    async fn push_batch(&self, parameters: &ValidatedParameters, records: &[Record]) -> BatchOutcome {
        let response = match self.post(parameters).json(records).send().await {
            Ok(response) => response,
            Err(e) => return BatchOutcome::Failed(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            return BatchOutcome::Failed(WarehouseError::new(format!("HTTP {}", status)));
        }

        // 空白或非 JSON 的成功回應視為整批接受
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Value>(&body)
            .ok()
            .as_ref()
            .and_then(parse_item_results)
        {
            Some(items) => BatchOutcome::PerItem(items),
            None => BatchOutcome::Accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_item_results() {
        let body = json!({"results": [{"ok": true}, {"ok": false, "error": "duplicate"}, {}]});
        let items = parse_item_results(&body).unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err(WarehouseError::new("duplicate")));
        assert!(items[2].is_err());
        assert!(parse_item_results(&json!({"status": "ok"})).is_none());
    }

    #[test]
    fn test_render_token() {
        assert_eq!(render_token(&json!(3)), Some("3".to_string()));
        assert_eq!(render_token(&json!("abc")), Some("abc".to_string()));
        assert_eq!(render_token(&json!("")), None);
        assert_eq!(render_token(&json!(null)), None);
    }
}
