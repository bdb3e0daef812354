use crate::domain::model::Event;
use crate::utils::error::ObserverError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// 事件觀察者；錯誤或 panic 都不會中斷執行
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &Event<'_>) -> Result<(), ObserverError>;
}

impl<F> EventObserver for F
where
    F: Fn(&Event<'_>) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_event(&self, event: &Event<'_>) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Ordered list of observers, invoked synchronously in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn EventObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn EventObserver>) {
        self.observers.push(observer);
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.register(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&self, event: &Event<'_>) {
        for (position, observer) in self.observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("⚠️ Observer #{} failed on {}: {}", position, event.kind, e);
                }
                Err(_) => {
                    tracing::warn!("⚠️ Observer #{} panicked on {}", position, event.kind);
                }
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// 將事件轉送到 tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, event: &Event<'_>) -> Result<(), ObserverError> {
        let key = event.record_key.unwrap_or("-");
        match event.error {
            Some(error) => tracing::warn!(
                kind = %event.kind,
                sequence = ?event.sequence,
                record_key = key,
                "❌ {}",
                error
            ),
            None => tracing::debug!(
                kind = %event.kind,
                sequence = ?event.sequence,
                record_key = key,
                "✅ event"
            ),
        }
        Ok(())
    }
}
