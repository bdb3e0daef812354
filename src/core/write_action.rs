use crate::domain::model::Record;
use crate::domain::parameters::ValidatedParameters;
use crate::domain::ports::{BatchOutcome, DeliveryMode, DestinationWarehouse};
use crate::utils::error::WriteError;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// 寫入目的地倉庫；輸出結果與輸入順序一一對應
pub struct WriteAction {
    destination: Arc<dyn DestinationWarehouse>,
    concurrency: usize,
}

impl WriteAction {
    pub fn new(destination: Arc<dyn DestinationWarehouse>) -> Self {
        Self {
            destination,
            concurrency: 1,
        }
    }

    /// Maximum overlapping submissions in per-record mode. Batches are always
    /// submitted one at a time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.destination.delivery_mode()
    }

    pub async fn push(
        &self,
        records: &[Record],
        parameters: &ValidatedParameters,
    ) -> Vec<Result<(), WriteError>> {
        match self.destination.delivery_mode() {
            DeliveryMode::PerRecord => self.push_each(records, parameters).await,
            DeliveryMode::Batch { size } => self.push_batches(records, parameters, size.max(1)).await,
        }
    }

    async fn push_each(
        &self,
        records: &[Record],
        parameters: &ValidatedParameters,
    ) -> Vec<Result<(), WriteError>> {
        let destination = self.destination.as_ref();
        // buffered() 保留輸入順序
        stream::iter(records)
            .map(|record| async move {
                destination
                    .push_one(parameters, record)
                    .await
                    .map_err(|e| WriteError::Item { message: e.message })
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn push_batches(
        &self,
        records: &[Record],
        parameters: &ValidatedParameters,
        size: usize,
    ) -> Vec<Result<(), WriteError>> {
        let mut results = Vec::with_capacity(records.len());

        for (batch_no, chunk) in records.chunks(size).enumerate() {
            let outcome = self.destination.push_batch(parameters, chunk).await;
            tracing::debug!(
                "📤 Batch {} to '{}' ({} records)",
                batch_no + 1,
                self.destination.name(),
                chunk.len()
            );

            match outcome {
                BatchOutcome::Accepted => results.extend(chunk.iter().map(|_| Ok(()))),
                BatchOutcome::PerItem(items) if items.len() == chunk.len() => {
                    results.extend(
                        items
                            .into_iter()
                            .map(|r| r.map_err(|e| WriteError::Item { message: e.message })),
                    );
                }
                BatchOutcome::PerItem(items) => {
                    let message = format!(
                        "destination returned {} results for {} records",
                        items.len(),
                        chunk.len()
                    );
                    tracing::warn!("⚠️ Batch {}: {}", batch_no + 1, message);
                    results.extend(chunk.iter().map(|_| {
                        Err(WriteError::Batch {
                            message: message.clone(),
                        })
                    }));
                }
                BatchOutcome::Failed(e) => {
                    tracing::warn!("⚠️ Batch {} failed: {}", batch_no + 1, e);
                    results.extend(chunk.iter().map(|_| {
                        Err(WriteError::Batch {
                            message: e.message.clone(),
                        })
                    }));
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDestination;
    use serde_json::json;

    fn records(n: i64) -> Vec<Record> {
        (1..=n).map(|i| Record::new().with("id", i)).collect()
    }

    #[tokio::test]
    async fn test_per_record_failures_are_isolated() {
        let destination = Arc::new(MemoryDestination::new("ats").reject_when(|r| {
            (r.get("id") == Some(&json!(2))).then(|| "duplicate".to_string())
        }));
        let action = WriteAction::new(destination.clone()).with_concurrency(4);

        let results = action.push(&records(4), &ValidatedParameters::default()).await;
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(WriteError::Item {
                message: "duplicate".to_string()
            })
        );
        assert!(results[2].is_ok() && results[3].is_ok());
        assert_eq!(destination.written().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_failure_marks_whole_batch() {
        let destination = Arc::new(MemoryDestination::batched("ats", 2).fail_batch(1));
        let action = WriteAction::new(destination.clone());

        let results = action.push(&records(5), &ValidatedParameters::default()).await;
        assert_eq!(results.len(), 5);
        assert!(results[0].is_ok() && results[1].is_ok());
        for result in &results[2..4] {
            assert_eq!(result.as_ref().unwrap_err().reason(), "batch_failure");
        }
        assert!(results[4].is_ok());
        assert_eq!(destination.batch_sizes(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_batch_per_item_detail_is_propagated() {
        let destination = Arc::new(MemoryDestination::batched("ats", 3).reject_when(|r| {
            (r.get("id") == Some(&json!(3))).then(|| "invalid email".to_string())
        }));
        let action = WriteAction::new(destination);

        let results = action.push(&records(4), &ValidatedParameters::default()).await;
        assert!(results[0].is_ok() && results[1].is_ok() && results[3].is_ok());
        assert_eq!(results[2].as_ref().unwrap_err().reason(), "item_failure");
    }

    /// 回傳筆數永遠少一筆的目的地
    struct ShortResults;

    impl crate::domain::ports::Warehouse for ShortResults {
        fn name(&self) -> &str {
            "short"
        }
    }

    #[async_trait::async_trait]
    impl DestinationWarehouse for ShortResults {
        fn write_parameters(&self) -> crate::domain::schema::FieldSchema {
            crate::domain::schema::FieldSchema::empty()
        }

        fn delivery_mode(&self) -> DeliveryMode {
            DeliveryMode::Batch { size: 3 }
        }

        async fn push_one(
            &self,
            _parameters: &ValidatedParameters,
            _record: &Record,
        ) -> Result<(), crate::utils::error::WarehouseError> {
            Ok(())
        }

        async fn push_batch(&self, _parameters: &ValidatedParameters, records: &[Record]) -> BatchOutcome {
            BatchOutcome::PerItem(records.iter().skip(1).map(|_| Ok(())).collect())
        }
    }

    #[tokio::test]
    async fn test_result_count_mismatch_fails_batch() {
        let action = WriteAction::new(Arc::new(ShortResults));
        let results = action.push(&records(3), &ValidatedParameters::default()).await;
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| r.as_ref().is_err_and(|e| e.reason() == "batch_failure")));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let action = WriteAction::new(Arc::new(MemoryDestination::batched("ats", 2)));
        assert!(action.push(&[], &ValidatedParameters::default()).await.is_empty());
    }
}
