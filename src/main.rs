use clap::Parser;
use std::sync::Arc;
use warehouse_sync::adapters::{build_destination, build_source};
use warehouse_sync::utils::error::ErrorSeverity;
use serde_json::Value;
use warehouse_sync::utils::logger::{self, LogFormat};
use warehouse_sync::utils::monitor::RunMonitor;
use warehouse_sync::utils::validation::Validate;
use warehouse_sync::{
    ActionDescriptor, ActionRegistry, CliConfig, Connector, EventBus, RunStatus, SyncConfig,
    SyncError, TracingObserver, WorkflowType,
};

fn exit_with(e: &SyncError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let code = match e.severity() {
        ErrorSeverity::Critical => 3,
        _ => 1,
    };
    std::process::exit(code);
}

fn build_action(config: &SyncConfig) -> Result<ActionDescriptor, SyncError> {
    let source = build_source(&config.source)?;
    let destination = build_destination(&config.destination)?;

    let mut action = ActionDescriptor::new(
        config.run.action.clone(),
        config.run.action_type,
        source,
        destination,
    )
    .with_key_field(config.key_field())
    .with_workflow_type(config.run.workflow_type);
    if !config.transform.is_noop() {
        action = action.with_transform(Arc::new(config.transform.clone()));
    }
    if let Some(description) = &config.run.description {
        action = action.with_description(description.clone());
    }
    Ok(action)
}

/// catch 工作流程的事件資料：單一物件或物件陣列
fn load_event(path: Option<&str>) -> Result<Vec<Value>, SyncError> {
    let path = path.ok_or_else(|| SyncError::MissingConfigError {
        field: "--event".to_string(),
    })?;
    let content = std::fs::read_to_string(path)?;
    Ok(match serde_json::from_str(&content)? {
        Value::Array(items) => items,
        single => vec![single],
    })
}

fn describe(action: &ActionDescriptor) {
    println!(
        "Action: {} ({}, {})",
        action.name(),
        action.action_type(),
        action.workflow_type()
    );
    if let Some(description) = action.description() {
        println!("  {}", description);
    }
    for (role, endpoints) in [
        ("source", action.source().endpoints()),
        ("destination", action.destination().endpoints()),
    ] {
        println!("{}:", role);
        for endpoint in endpoints {
            println!("  {} {} - {}", endpoint.name, endpoint.url, endpoint.description);
        }
    }
}

fn display_plan(config: &SyncConfig) {
    tracing::info!("📋 Plan for action '{}'", config.run.action);
    tracing::info!("  Source: {:?} {}", config.source.kind, config.source.display_name("source"));
    tracing::info!(
        "  Destination: {:?} {} ({:?})",
        config.destination.kind,
        config.destination.display_name("destination"),
        config.destination.delivery_mode()
    );
    tracing::info!("  Workflow: {}", config.run.workflow_type);
    tracing::info!("  Read mode: {}", config.run.read_mode);
    if let Some(cursor) = &config.run.cursor {
        tracing::info!("  Cursor: {}", cursor);
    }
    if !config.transform.is_noop() {
        tracing::info!("  Transform: {:?}", config.transform);
    }
}

#[tokio::main]
async fn main() {
    let args = CliConfig::parse();

    logger::init_logger(args.verbose, LogFormat::from_flag(args.json_logs));

    tracing::info!("🚀 Starting warehouse-sync");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = SyncConfig::from_file(&args.config).unwrap_or_else(|e| exit_with(&e));
    if let Some(cursor) = &args.cursor {
        config.run.cursor = Some(cursor.clone());
        tracing::info!("🔧 Cursor overridden to: {}", cursor);
    }
    if let Err(e) = config.validate() {
        exit_with(&e);
    }
    tracing::info!("✅ Configuration loaded and validated successfully");

    let action = build_action(&config).unwrap_or_else(|e| exit_with(&e));

    if args.describe {
        describe(&action);
        return;
    }

    display_plan(&config);
    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No warehouse will be contacted");
        return;
    }

    let mut events = EventBus::new().with_observer(Arc::new(TracingObserver));
    let monitor = args.monitor.then(|| Arc::new(RunMonitor::default()));
    if let Some(monitor) = &monitor {
        events.register(monitor.clone());
    }

    let mut registry = ActionRegistry::new();
    let action_name = action.name().to_string();
    if let Err(e) = registry.register(action) {
        exit_with(&e);
    }
    let connector = Connector::new(registry, events);

    let report = match config.run.workflow_type {
        WorkflowType::Pull => {
            connector
                .run_by_name(
                    &action_name,
                    &config.read_parameters,
                    &config.write_parameters,
                    config.run_options(),
                )
                .await
        }
        WorkflowType::Catch => {
            let items = load_event(args.event.as_deref()).unwrap_or_else(|e| exit_with(&e));
            tracing::info!("📨 Event payload with {} item(s)", items.len());
            connector
                .catch_by_name(&action_name, items, &config.write_parameters, config.run_options())
                .await
        }
    }
    .unwrap_or_else(|e| exit_with(&e));

    if let Some(monitor) = &monitor {
        monitor.log_stats("Run completed");
    }

    match report.to_json_pretty() {
        Ok(json) => println!("{}", json),
        Err(e) => exit_with(&SyncError::from(e)),
    }

    let code = match report.status() {
        RunStatus::Success => 0,
        RunStatus::SuccessWithFailures => 2,
        RunStatus::Fatal => 1,
    };
    if code > 0 {
        std::process::exit(code);
    }
}
