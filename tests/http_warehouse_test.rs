use httpmock::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use warehouse_sync::adapters::http::{HttpDestination, HttpSource};
use warehouse_sync::adapters::memory::MemoryDestination;
use warehouse_sync::domain::ports::DeliveryMode;
use warehouse_sync::{
    ActionDescriptor, ActionRegistry, ActionType, Connector, DataType, EventBus, FatalError,
    FieldDescriptor, FieldSchema, RunOptions, Stage,
};

fn connector_with(action: ActionDescriptor) -> Connector {
    let mut registry = ActionRegistry::new();
    registry.register(action).unwrap();
    Connector::new(registry, EventBus::new())
}

/// 分頁讀取：物件格式回應，直到 next_page 為 null
#[tokio::test]
async fn test_http_source_follows_next_page_tokens() {
    let server = MockServer::start();

    let page_one = server.mock(|when, then| {
        when.method(GET)
            .path("/profiles")
            .query_param("page", "1")
            .query_param("board_key", "b-1");
        then.status(200).json_body(json!({
            "items": [{"id": 1, "name": "Ada"}, {"id": 2, "name": "Grace"}],
            "next_page": 2
        }));
    });
    let page_two = server.mock(|when, then| {
        when.method(GET).path("/profiles").query_param("page", "2");
        then.status(200).json_body(json!({
            "items": [{"id": 3, "name": "Linus"}],
            "next_page": null
        }));
    });

    let source = HttpSource::new("talent-api", server.url("/profiles"))
        .with_page_size(2)
        .with_read_parameters(FieldSchema::new(vec![FieldDescriptor::required(
            "board_key",
            DataType::String,
        )]));
    let destination = Arc::new(MemoryDestination::new("ats"));
    let action = ActionDescriptor::new("profiles", ActionType::Pull, Arc::new(source), destination.clone());
    let connector = connector_with(action);

    let read_payload = json!({"board_key": "b-1"});
    let report = connector
        .run_by_name(
            "profiles",
            read_payload.as_object().unwrap(),
            &Map::new(),
            RunOptions::default(),
        )
        .await
        .unwrap();

    page_one.assert();
    page_two.assert();
    assert_eq!(report.read_success, 3);
    assert_eq!(report.write_success, 3);
    let names: Vec<String> = destination
        .written()
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str).unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Ada", "Grace", "Linus"]);
}

#[tokio::test]
async fn test_http_source_sends_opaque_page_cursor_back() {
    let server = MockServer::start();

    let first = server.mock(|when, then| {
        when.method(GET).path("/jobs").query_param("after", "1");
        then.status(200).json_body(json!({
            "items": [{"id": "j1"}],
            "next_page": "cursor-abc"
        }));
    });
    let second = server.mock(|when, then| {
        when.method(GET).path("/jobs").query_param("after", "cursor-abc");
        then.status(200).json_body(json!({
            "items": [{"id": "j2"}],
            "next_page": null
        }));
    });

    let source = HttpSource::new("jobs-api", server.url("/jobs")).with_page_param("after");
    let destination = Arc::new(MemoryDestination::new("board"));
    let action = ActionDescriptor::new("jobs", ActionType::Pull, Arc::new(source), destination.clone());
    let connector = connector_with(action);

    let report = connector
        .run_by_name("jobs", &Map::new(), &Map::new(), RunOptions::default())
        .await
        .unwrap();

    first.assert();
    second.assert();
    assert!(report.fatal.is_none());
    assert_eq!(report.read_success, 2);
    assert_eq!(destination.written().len(), 2);
}

#[tokio::test]
async fn test_http_source_incremental_cursor_and_array_pages() {
    let server = MockServer::start();

    let listing = server.mock(|when, then| {
        when.method(GET)
            .path("/jobs")
            .query_param("updated_since", "2024-01-01T00:00:00Z")
            .query_param("page", "1");
        then.status(200).json_body(json!([
            {"id": "j1", "updated_at": "2024-01-05T00:00:00Z"},
            {"id": "j2", "updated_at": "2024-01-07T00:00:00Z"}
        ]));
    });

    let source = HttpSource::new("jobs-api", server.url("/jobs"))
        .with_page_size(10)
        .with_incremental("updated_since", "updated_at");
    let action = ActionDescriptor::new(
        "jobs",
        ActionType::Pull,
        Arc::new(source),
        Arc::new(MemoryDestination::new("board")),
    );
    let connector = connector_with(action);

    let report = connector
        .run_by_name(
            "jobs",
            &Map::new(),
            &Map::new(),
            RunOptions::incremental(Some("2024-01-01T00:00:00Z".to_string())),
        )
        .await
        .unwrap();

    // 回應不足一頁，不會再請求下一頁
    listing.assert_hits(1);
    assert_eq!(report.read_success, 2);
    assert_eq!(report.next_cursor.as_deref(), Some("2024-01-07T00:00:00Z"));
}

#[tokio::test]
async fn test_http_source_server_error_is_source_unreachable() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(GET).path("/profiles");
        then.status(503);
    });

    let action = ActionDescriptor::new(
        "profiles",
        ActionType::Pull,
        Arc::new(HttpSource::new("talent-api", server.url("/profiles"))),
        Arc::new(MemoryDestination::new("ats")),
    );
    let connector = connector_with(action);

    let report = connector
        .run_by_name("profiles", &Map::new(), &Map::new(), RunOptions::default())
        .await
        .unwrap();

    failing.assert();
    assert!(matches!(report.fatal, Some(FatalError::SourceUnreachable { .. })));
    assert_eq!(report.read_success + report.read_failure, 0);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_http_destination_per_record_rejections() {
    let server = MockServer::start();
    let accepted = server.mock(|when, then| {
        when.method(POST).path("/candidates").json_body(json!({"id": 1, "email": "a@x.io"}));
        then.status(201);
    });
    let rejected = server.mock(|when, then| {
        when.method(POST).path("/candidates").json_body(json!({"id": 2, "email": "broken"}));
        then.status(422).body("invalid email");
    });

    let source = warehouse_sync::adapters::memory::MemorySource::new(
        "profiles",
        vec![json!({"id": 1, "email": "a@x.io"}), json!({"id": 2, "email": "broken"})],
    );
    let destination = HttpDestination::new("ats", server.url("/candidates"));
    let action = ActionDescriptor::new("push", ActionType::Push, Arc::new(source), Arc::new(destination));
    let connector = connector_with(action);

    let report = connector
        .run_by_name("push", &Map::new(), &Map::new(), RunOptions::default())
        .await
        .unwrap();

    accepted.assert();
    rejected.assert();
    assert_eq!(report.write_success, 1);
    assert_eq!(report.write_failure, 1);
    let failure = report.failures_at(Stage::Write).next().unwrap();
    assert_eq!(failure.record_key.as_deref(), Some("2"));
    assert!(failure.error_message.contains("invalid email"));
}

#[tokio::test]
async fn test_http_destination_batch_detail_and_failure() {
    let server = MockServer::start();
    let first_batch = server.mock(|when, then| {
        when.method(POST)
            .path("/jobs/bulk")
            .json_body(json!([{"id": 1}, {"id": 2}]));
        then.status(200).json_body(json!({
            "results": [{"ok": true}, {"ok": false, "error": "duplicate reference"}]
        }));
    });
    let second_batch = server.mock(|when, then| {
        when.method(POST).path("/jobs/bulk").json_body(json!([{"id": 3}]));
        then.status(500);
    });

    let source = warehouse_sync::adapters::memory::MemorySource::new(
        "jobs",
        vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})],
    );
    let destination = HttpDestination::new("board", server.url("/jobs/bulk"))
        .with_delivery(DeliveryMode::Batch { size: 2 });
    let action = ActionDescriptor::new("jobs", ActionType::Push, Arc::new(source), Arc::new(destination));
    let connector = connector_with(action);

    let report = connector
        .run_by_name("jobs", &Map::new(), &Map::new(), RunOptions::default())
        .await
        .unwrap();

    first_batch.assert();
    second_batch.assert();
    assert_eq!(report.write_success, 1);
    assert_eq!(report.write_failure, 2);

    let failures: Vec<_> = report.failures_at(Stage::Write).collect();
    assert_eq!(failures[0].record_key.as_deref(), Some("2"));
    assert!(failures[0].error_message.starts_with("item_failure"));
    assert_eq!(failures[1].record_key.as_deref(), Some("3"));
    assert!(failures[1].error_message.starts_with("batch_failure"));
}
