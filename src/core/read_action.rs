use crate::domain::model::{ReadMode, Record};
use crate::domain::parameters::ValidatedParameters;
use crate::domain::ports::{PageRequest, SourceWarehouse};
use crate::domain::schema::FieldSchema;
use crate::utils::error::{ReadError, WarehouseError};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// 從來源倉庫分頁讀取，逐筆隔離錯誤
pub struct ReadAction {
    source: Arc<dyn SourceWarehouse>,
    key_field: String,
}

/// 在讀取邊界把原始項目轉成 Record
struct ItemChecker {
    readable: FieldSchema,
    key_field: String,
}

struct PullState {
    source: Arc<dyn SourceWarehouse>,
    parameters: ValidatedParameters,
    checker: ItemChecker,
    cursor: Option<String>,
    page_size: usize,
    next_token: Option<String>,
    seen_tokens: HashSet<String>,
    buffer: VecDeque<Result<Value, WarehouseError>>,
    pages_fetched: usize,
    index: usize,
    exhausted: bool,
}

impl ItemChecker {
    fn convert(&self, index: usize, item: Result<Value, WarehouseError>) -> Result<Record, ReadError> {
        let value = item.map_err(|e| ReadError::Item {
            index,
            record_key: None,
            message: e.message,
        })?;

        let record = Record::from_value(value).ok_or_else(|| ReadError::Item {
            index,
            record_key: None,
            message: "expected a JSON object".to_string(),
        })?;

        let record_key = record.key(&self.key_field);
        self.readable.check_record(record).map_err(|errors| ReadError::Item {
            index,
            record_key,
            message: errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })
    }
}

impl PullState {
    /// Records the token of the next page. Returns `false` when reading must stop.
    fn advance(&mut self, token: Option<String>) -> bool {
        match token {
            None => false,
            Some(token) if self.seen_tokens.contains(&token) => {
                tracing::warn!(
                    "⚠️ Source '{}' returned already consumed page token '{}', stopping",
                    self.source.name(),
                    token
                );
                false
            }
            Some(token) => {
                self.seen_tokens.insert(token.clone());
                self.next_token = Some(token);
                true
            }
        }
    }
}

impl ReadAction {
    pub fn new(source: Arc<dyn SourceWarehouse>) -> Self {
        Self {
            source,
            key_field: "id".to_string(),
        }
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    fn checker(&self) -> ItemChecker {
        ItemChecker {
            readable: self.source.readable_fields(),
            key_field: self.key_field.clone(),
        }
    }

    /// 事件觸發時資料已隨事件送達：不呼叫來源，逐筆套用相同的讀取檢查
    pub fn from_payload(&self, items: Vec<Value>) -> BoxStream<'static, Result<Record, ReadError>> {
        let checker = self.checker();
        stream::iter(
            items
                .into_iter()
                .enumerate()
                .map(move |(index, item)| checker.convert(index, Ok(item))),
        )
        .boxed()
    }

    /// Lazy, forward-only pull.
    ///
    /// A transport failure yields a single `SourceUnreachable` item and ends
    /// the stream. The cursor is only forwarded in incremental mode.
    pub fn pull(
        &self,
        parameters: ValidatedParameters,
        read_mode: ReadMode,
        cursor: Option<String>,
    ) -> BoxStream<'static, Result<Record, ReadError>> {
        let cursor = match read_mode {
            ReadMode::Incremental => cursor,
            ReadMode::Full => {
                if cursor.is_some() {
                    tracing::debug!("Ignoring cursor for full read of '{}'", self.source.name());
                }
                None
            }
        };

        let state = PullState {
            source: self.source.clone(),
            parameters,
            checker: self.checker(),
            cursor,
            page_size: self.source.page_size().max(1),
            next_token: None,
            seen_tokens: HashSet::new(),
            buffer: VecDeque::new(),
            pages_fetched: 0,
            index: 0,
            exhausted: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    let index = state.index;
                    state.index += 1;
                    let result = state.checker.convert(index, item);
                    return Some((result, state));
                }

                if state.exhausted {
                    return None;
                }

                let request = PageRequest {
                    cursor: state.cursor.clone(),
                    page_token: state.next_token.take(),
                    page_size: state.page_size,
                };

                match state.source.fetch_page(&state.parameters, request).await {
                    Ok(page) => {
                        state.pages_fetched += 1;
                        tracing::debug!(
                            "📥 Page {} from '{}': {} items",
                            state.pages_fetched,
                            state.source.name(),
                            page.items.len()
                        );

                        if page.items.is_empty() {
                            state.exhausted = true;
                            continue;
                        }
                        state.exhausted = !state.advance(page.next_page_token);
                        state.buffer.extend(page.items);
                    }
                    Err(e) => {
                        tracing::error!("❌ Source '{}' unreachable: {}", state.source.name(), e);
                        state.exhausted = true;
                        return Some((
                            Err(ReadError::SourceUnreachable { message: e.message }),
                            state,
                        ));
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemorySource;
    use crate::domain::schema::{DataType, FieldDescriptor};
    use serde_json::json;

    async fn collect(action: &ReadAction, mode: ReadMode, cursor: Option<&str>) -> Vec<Result<Record, ReadError>> {
        action
            .pull(ValidatedParameters::default(), mode, cursor.map(str::to_string))
            .collect()
            .await
    }

    fn profiles(n: i64) -> Vec<Value> {
        (1..=n)
            .map(|i| json!({"id": i, "name": format!("P{}", i), "updated_at": format!("2024-01-{:02}", i)}))
            .collect()
    }

    #[tokio::test]
    async fn test_pages_are_exhausted_once() {
        let source = Arc::new(MemorySource::new("profiles", profiles(5)).with_page_size(2));
        let action = ReadAction::new(source.clone());

        let items = collect(&action, ReadMode::Full, None).await;
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(Result::is_ok));
        // 2 + 2 + 1
        assert_eq!(source.page_calls(), 3);
    }

    #[tokio::test]
    async fn test_full_read_is_repeatable() {
        let source = Arc::new(MemorySource::new("profiles", profiles(4)).with_page_size(3));
        let action = ReadAction::new(source);

        let first: Vec<Record> = collect(&action, ReadMode::Full, None)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let second: Vec<Record> = collect(&action, ReadMode::Full, None)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_full_mode_ignores_cursor() {
        let source = Arc::new(
            MemorySource::new("profiles", profiles(4)).with_cursor_field("updated_at"),
        );
        let action = ReadAction::new(source);
        let items = collect(&action, ReadMode::Full, Some("2024-01-02")).await;
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn test_incremental_mode_forwards_cursor() {
        let source = Arc::new(
            MemorySource::new("profiles", profiles(4)).with_cursor_field("updated_at"),
        );
        let action = ReadAction::new(source);
        let items = collect(&action, ReadMode::Incremental, Some("2024-01-02")).await;
        let ids: Vec<i64> = items
            .into_iter()
            .map(|r| r.unwrap().get("id").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_malformed_items_are_isolated() {
        let items = vec![json!({"id": 1}), json!("garbage"), json!({"id": "x"}), json!({"id": 4})];
        let source = Arc::new(
            MemorySource::new("profiles", items)
                .with_readable_fields(FieldSchema::new(vec![FieldDescriptor::required("id", DataType::Integer)])),
        );
        let action = ReadAction::new(source);

        let results = collect(&action, ReadMode::Full, None).await;
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(&results[1], Err(ReadError::Item { index: 1, .. })));
        assert!(matches!(
            &results[2],
            Err(ReadError::Item { index: 2, record_key: Some(key), .. }) if key == "x"
        ));
        assert!(results[3].is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_ends_stream() {
        let source = Arc::new(
            MemorySource::new("profiles", profiles(6))
                .with_page_size(2)
                .fail_on_page(2),
        );
        let action = ReadAction::new(source.clone());

        let results = collect(&action, ReadMode::Full, None).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(results[2], Err(ReadError::SourceUnreachable { .. })));
        assert_eq!(source.page_calls(), 2);
    }

    #[tokio::test]
    async fn test_payload_items_are_checked_without_paging() {
        let source = Arc::new(
            MemorySource::new("profiles", profiles(10))
                .with_readable_fields(FieldSchema::new(vec![FieldDescriptor::required("id", DataType::Integer)])),
        );
        let action = ReadAction::new(source.clone());

        let results: Vec<_> = action
            .from_payload(vec![json!({"id": "5"}), json!({"name": "no id"}), json!([1])])
            .collect()
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().get("id"), Some(&json!(5)));
        assert!(matches!(&results[1], Err(ReadError::Item { index: 1, .. })));
        assert!(matches!(&results[2], Err(ReadError::Item { index: 2, .. })));
        assert_eq!(source.page_calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_page_token_stops_reading() {
        let source = Arc::new(
            MemorySource::new("profiles", profiles(6))
                .with_page_size(2)
                .repeat_first_token(),
        );
        let action = ReadAction::new(source.clone());

        let results = collect(&action, ReadMode::Full, None).await;
        // page 1 (token "2"), page 2 answers token "2" again -> stop
        assert_eq!(results.len(), 4);
        assert_eq!(source.page_calls(), 2);
    }
}
