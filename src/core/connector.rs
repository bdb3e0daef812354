use crate::core::hooks::EventBus;
use crate::core::read_action::ReadAction;
use crate::core::report::{ActionReport, FatalError};
use crate::core::transform::{Identity, Transform};
use crate::core::write_action::WriteAction;
use crate::domain::model::{ActionType, Event, EventKind, ReadMode, Record, Stage, WorkflowType};
use crate::domain::parameters::{ParametersModel, ValidatedParameters};
use crate::domain::ports::{DeliveryMode, DestinationWarehouse, SourceWarehouse};
use crate::domain::schema::FieldSchema;
use crate::utils::error::{ConfigurationError, ReadError, Result, SyncError};
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WINDOW_SIZE: usize = 500;

/// 一個具名動作：(來源倉庫, 目的地倉庫, 轉換)
#[derive(Clone)]
pub struct ActionDescriptor {
    name: String,
    action_type: ActionType,
    workflow_type: WorkflowType,
    description: Option<String>,
    key_field: String,
    source: Arc<dyn SourceWarehouse>,
    destination: Arc<dyn DestinationWarehouse>,
    transform: Arc<dyn Transform>,
}

impl ActionDescriptor {
    pub fn new(
        name: impl Into<String>,
        action_type: ActionType,
        source: Arc<dyn SourceWarehouse>,
        destination: Arc<dyn DestinationWarehouse>,
    ) -> Self {
        Self {
            name: name.into(),
            action_type,
            workflow_type: WorkflowType::Pull,
            description: None,
            key_field: "id".to_string(),
            source,
            destination,
            transform: Arc::new(Identity),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = transform;
        self
    }

    /// Catch actions are started with `Connector::catch` and never page the source.
    pub fn with_workflow_type(mut self, workflow_type: WorkflowType) -> Self {
        self.workflow_type = workflow_type;
        self
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.workflow_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn source(&self) -> &Arc<dyn SourceWarehouse> {
        &self.source
    }

    pub fn destination(&self) -> &Arc<dyn DestinationWarehouse> {
        &self.destination
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("action_type", &self.action_type)
            .field("workflow_type", &self.workflow_type)
            .field("source", &self.source.name())
            .field("destination", &self.destination.name())
            .field("key_field", &self.key_field)
            .finish()
    }
}

/// 啟動時建立一次，之後唯讀
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<ActionDescriptor>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: ActionDescriptor) -> Result<()> {
        if self.actions.contains_key(action.name()) {
            return Err(SyncError::DuplicateAction {
                name: action.name().to_string(),
            });
        }
        tracing::debug!("Registered action '{}'", action.name());
        self.actions
            .insert(action.name().to_string(), Arc::new(action));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub read_mode: ReadMode,
    pub cursor: Option<String>,
    pub strict: bool,
    /// 每個寫入視窗的筆數上限，批次模式會對齊批次大小
    pub window_size: usize,
    pub write_concurrency: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Full,
            cursor: None,
            strict: false,
            window_size: DEFAULT_WINDOW_SIZE,
            write_concurrency: 1,
            cancel: None,
        }
    }
}

impl RunOptions {
    pub fn incremental(cursor: Option<String>) -> Self {
        Self {
            read_mode: ReadMode::Incremental,
            cursor,
            ..Default::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// 記錄尚未寫入的資料與其來源序號
struct Window {
    keys: Vec<(usize, Option<String>)>,
    records: Vec<Record>,
}

impl Window {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            records: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, sequence: usize, key: Option<String>, record: Record) {
        self.keys.push((sequence, key));
        self.records.push(record);
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.records.clear();
    }
}

fn window_size_for(requested: usize, mode: DeliveryMode) -> usize {
    let requested = requested.max(1);
    match mode {
        DeliveryMode::PerRecord => requested,
        DeliveryMode::Batch { size } => {
            let size = size.max(1);
            requested.div_ceil(size) * size
        }
    }
}

/// Drives read → transform → write for registered actions.
pub struct Connector {
    registry: ActionRegistry,
    events: EventBus,
}

impl Connector {
    pub fn new(registry: ActionRegistry, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn run_by_name(
        &self,
        name: &str,
        read_payload: &Map<String, Value>,
        write_payload: &Map<String, Value>,
        options: RunOptions,
    ) -> Result<ActionReport> {
        let action = self.find(name)?;
        Ok(self.run(&action, read_payload, write_payload, options).await)
    }

    pub async fn catch_by_name(
        &self,
        name: &str,
        event_payload: Vec<Value>,
        write_payload: &Map<String, Value>,
        options: RunOptions,
    ) -> Result<ActionReport> {
        let action = self.find(name)?;
        Ok(self.catch(&action, event_payload, write_payload, options).await)
    }

    fn find(&self, name: &str) -> Result<Arc<ActionDescriptor>> {
        self.registry.get(name).ok_or_else(|| SyncError::ActionNotFound {
            name: name.to_string(),
        })
    }

    /// 驗證參數並執行一次同步；永遠回傳報告而不是錯誤
    pub async fn run(
        &self,
        action: &ActionDescriptor,
        read_payload: &Map<String, Value>,
        write_payload: &Map<String, Value>,
        options: RunOptions,
    ) -> ActionReport {
        tracing::info!(
            "🚀 Running {} action '{}': {} -> {} ({} read)",
            action.action_type,
            action.name,
            action.source.name(),
            action.destination.name(),
            options.read_mode
        );

        let (read_parameters, write_parameters) = match validate_run(
            action,
            WorkflowType::Pull,
            Some(read_payload),
            write_payload,
            &options,
        ) {
            Ok(parameters) => parameters,
            Err(errors) => return rejected(action, errors),
        };

        let records = ReadAction::new(action.source.clone())
            .with_key_field(&action.key_field)
            .pull(read_parameters, options.read_mode, options.cursor.clone());
        self.drive(action, records, write_parameters, &options).await
    }

    /// Runs a catch workflow: the records arrive with the triggering event
    /// and go through the same checks, transform and write path as a pull.
    pub async fn catch(
        &self,
        action: &ActionDescriptor,
        event_payload: Vec<Value>,
        write_payload: &Map<String, Value>,
        options: RunOptions,
    ) -> ActionReport {
        tracing::info!(
            "📨 Catching {} records for action '{}' -> {}",
            event_payload.len(),
            action.name,
            action.destination.name()
        );

        let (_, write_parameters) =
            match validate_run(action, WorkflowType::Catch, None, write_payload, &options) {
                Ok(parameters) => parameters,
                Err(errors) => return rejected(action, errors),
            };

        let records = ReadAction::new(action.source.clone())
            .with_key_field(&action.key_field)
            .from_payload(event_payload);
        self.drive(action, records, write_parameters, &options).await
    }

    async fn drive(
        &self,
        action: &ActionDescriptor,
        mut records: BoxStream<'static, std::result::Result<Record, ReadError>>,
        write_parameters: ValidatedParameters,
        options: &RunOptions,
    ) -> ActionReport {
        let started = Instant::now();
        let mut run = Run {
            action,
            events: &self.events,
            write: WriteAction::new(action.destination.clone())
                .with_concurrency(options.write_concurrency),
            write_parameters,
            writable: action.destination.writable_fields(),
            report: ActionReport::new(&action.name),
        };
        let window_size = window_size_for(options.window_size, run.write.delivery_mode());
        let mut window = Window::with_capacity(window_size);
        let mut last_cursor = None;
        let mut sequence = 0;

        loop {
            // 取消後不再讀取，已轉換的資料在下方寫出
            if options.is_cancelled() {
                tracing::warn!("⏹️ Action '{}' cancelled after {} records", action.name, sequence);
                run.report.cancelled = true;
                break;
            }

            let Some(item) = records.next().await else {
                break;
            };
            let current = sequence;
            sequence += 1;

            match item {
                Ok(record) => {
                    if let Some(cursor) = action.source.cursor_of(&record) {
                        last_cursor = Some(cursor);
                    }
                    run.read_succeeded(current, record, &mut window);
                    if window.len() >= window_size {
                        run.flush(&mut window).await;
                    }
                }
                Err(ReadError::Item {
                    record_key,
                    message,
                    ..
                }) => run.fail(Stage::Read, current, record_key, message, None),
                Err(ReadError::SourceUnreachable { message }) => {
                    run.events.emit(&Event::new(EventKind::ReadFailure).with_error(&message));
                    run.report.fatal = Some(FatalError::SourceUnreachable { message });
                    break;
                }
            }
        }

        run.flush(&mut window).await;

        let mut report = run.report;
        // 寫入失敗在視窗寫出時才加入，依讀取序號排回原順序
        report.failures.sort_by_key(|failure| failure.sequence);
        if action.source.supports_incremental() {
            report.next_cursor = last_cursor.or_else(|| match options.read_mode {
                ReadMode::Incremental => options.cursor.clone(),
                ReadMode::Full => None,
            });
        }

        tracing::info!(
            "📊 Action '{}' finished in {:?}: read {}/{}, format {}/{}, write {}/{} (ok/failed)",
            action.name,
            started.elapsed(),
            report.read_success,
            report.read_failure,
            report.format_success,
            report.format_failure,
            report.write_success,
            report.write_failure
        );
        report
    }
}

fn rejected(action: &ActionDescriptor, errors: Vec<ConfigurationError>) -> ActionReport {
    tracing::error!(
        "❌ Action '{}' rejected: {} configuration error(s)",
        action.name,
        errors.len()
    );
    ActionReport::configuration_failure(&action.name, errors)
}

/// `read_payload` is `None` for catch runs, which never call the source.
fn validate_run(
    action: &ActionDescriptor,
    requested: WorkflowType,
    read_payload: Option<&Map<String, Value>>,
    write_payload: &Map<String, Value>,
    options: &RunOptions,
) -> std::result::Result<(ValidatedParameters, ValidatedParameters), Vec<ConfigurationError>> {
    let mut errors = Vec::new();

    if action.workflow_type != requested {
        errors.push(ConfigurationError::WorkflowMismatch {
            declared: action.workflow_type,
            requested,
        });
    }

    let read = match read_payload {
        Some(payload) => ParametersModel::new(action.source.read_parameters())
            .strict(options.strict)
            .validate(payload)
            .map_err(|field_errors| {
                errors.extend(
                    field_errors
                        .into_iter()
                        .map(|error| ConfigurationError::ReadParameter { error }),
                )
            })
            .ok(),
        None => Some(ValidatedParameters::default()),
    };

    let write = ParametersModel::new(action.destination.write_parameters())
        .strict(options.strict)
        .validate(write_payload)
        .map_err(|field_errors| {
            errors.extend(
                field_errors
                    .into_iter()
                    .map(|error| ConfigurationError::WriteParameter { error }),
            )
        })
        .ok();

    if read_payload.is_some() && options.read_mode == ReadMode::Incremental {
        if !action.source.supports_incremental() {
            errors.push(ConfigurationError::IncrementalNotSupported {
                source_name: action.source.name().to_string(),
            });
        }
        if options.cursor.as_deref().map_or(true, |c| c.trim().is_empty()) {
            errors.push(ConfigurationError::MissingCursor);
        }
    }

    match (read, write) {
        (Some(read), Some(write)) if errors.is_empty() => Ok((read, write)),
        _ => Err(errors),
    }
}

/// 單次執行的可變狀態，不與其他執行共用
struct Run<'a> {
    action: &'a ActionDescriptor,
    events: &'a EventBus,
    write: WriteAction,
    write_parameters: ValidatedParameters,
    writable: FieldSchema,
    report: ActionReport,
}

impl Run<'_> {
    fn succeed(&mut self, kind: EventKind, sequence: usize, record: &Record, key: Option<&str>) {
        self.report.count(kind);
        self.events.emit(
            &Event::new(kind)
                .at(sequence)
                .with_record(record)
                .with_key(key),
        );
    }

    fn fail(
        &mut self,
        stage: Stage,
        sequence: usize,
        key: Option<String>,
        message: String,
        record: Option<&Record>,
    ) {
        let kind = match stage {
            Stage::Read => EventKind::ReadFailure,
            Stage::Format => EventKind::FormatFailure,
            Stage::Write => EventKind::WriteFailure,
        };
        self.report.count(kind);

        let mut event = Event::new(kind)
            .at(sequence)
            .with_key(key.as_deref())
            .with_error(&message);
        if let Some(record) = record {
            event = event.with_record(record);
        }
        self.events.emit(&event);

        self.report.push_failure(stage, sequence, key, message);
    }

    fn read_succeeded(&mut self, sequence: usize, record: Record, window: &mut Window) {
        let key = record.key(&self.action.key_field);
        self.succeed(EventKind::ReadSuccess, sequence, &record, key.as_deref());

        // 轉換會取得資料所有權；有觀察者時保留讀到的版本給 format_failure 事件
        let as_read = (!self.events.is_empty()).then(|| record.clone());
        let formatted = self
            .action
            .transform
            .apply(record)
            .map_err(|e| e.to_string())
            .and_then(|record| {
                self.writable.check_record(record).map_err(|errors| {
                    errors
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                })
            });

        match formatted {
            Ok(record) => {
                self.succeed(EventKind::FormatSuccess, sequence, &record, key.as_deref());
                window.push(sequence, key, record);
            }
            Err(message) => self.fail(Stage::Format, sequence, key, message, as_read.as_ref()),
        }
    }

    async fn flush(&mut self, window: &mut Window) {
        if window.is_empty() {
            return;
        }
        tracing::debug!("📤 Writing window of {} records", window.len());

        let results = self.write.push(&window.records, &self.write_parameters).await;
        debug_assert_eq!(results.len(), window.len());

        for (((sequence, key), record), result) in window
            .keys
            .drain(..)
            .zip(window.records.iter())
            .zip(results)
        {
            match result {
                Ok(()) => self.succeed(EventKind::WriteSuccess, sequence, record, key.as_deref()),
                Err(e) => self.fail(Stage::Write, sequence, key, e.to_string(), Some(record)),
            }
        }
        window.clear();
    }
}
