//! End-to-end pipeline tests: config → build → executable artifacts,
//! all against the in-memory store.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use engine::{
    build_schema, BuildStage, ContainerSource, EngineConfig, ProgressEvent, RetryConfig,
    SchemaBuild, TypeSystemConfig,
};
use store::{Document, DocumentStore, MemoryConnector, MemoryStore, StoreError};

fn doc(value: Value) -> Document {
    value.as_object().expect("object literal").clone()
}

fn config(containers: Vec<ContainerSource>) -> EngineConfig {
    EngineConfig {
        connection_string: Some("AccountEndpoint=https://db.example.com;AccountKey=secret".into()),
        endpoint: None,
        credential: None,
        database: "app".into(),
        containers,
        type_system: TypeSystemConfig::default(),
        retry: RetryConfig { base_delay_ms: 1, max_delay_ms: 20, ..RetryConfig::default() },
    }
}

async fn store_with(
    name: &str,
    partition_key_path: &str,
    documents: Vec<Value>,
) -> (Arc<MemoryStore>, Arc<MemoryConnector>) {
    let store = Arc::new(MemoryStore::new());
    let container = store.add_container(name, partition_key_path);
    container.seed_all(documents.into_iter().map(doc)).await;
    let connector = Arc::new(MemoryConnector::new(store.clone()));
    (store, connector)
}

#[tokio::test]
async fn test_mixed_types_widen_to_string() {
    let (_, connector) = store_with(
        "items",
        "/id",
        vec![json!({"id": "1", "value": "text"}), json!({"id": "2", "value": 123})],
    )
    .await;
    let config = config(vec![ContainerSource::new("items").with_type_name("Mixed")]);

    let artifacts = build_schema(config, connector).await.unwrap();
    assert!(artifacts.sdl.contains("value: String!"), "sdl: {}", artifacts.sdl);
    assert_eq!(artifacts.bindings[0].schema.stats.conflicts_resolved, 1);
}

#[tokio::test]
async fn test_optional_field_by_threshold() {
    let mut documents = Vec::new();
    for i in 0..10 {
        if i < 3 {
            documents.push(json!({"id": i.to_string(), "email": "a@b.c"}));
        } else {
            documents.push(json!({"id": i.to_string()}));
        }
    }
    let (_, connector) = store_with("users", "/id", documents).await;
    let config = config(vec![ContainerSource::new("users").with_type_name("User")]);

    let artifacts = build_schema(config, connector).await.unwrap();
    assert!(artifacts.sdl.contains("email: String\n"), "sdl: {}", artifacts.sdl);
    assert!(!artifacts.sdl.contains("email: String!"));
}

#[tokio::test]
async fn test_nested_type_extraction() {
    let (_, connector) = store_with(
        "users",
        "/id",
        vec![
            json!({"id": "1", "profile": {"bio": "x"}}),
            json!({"id": "2", "profile": {"bio": "y"}}),
        ],
    )
    .await;
    let config = config(vec![ContainerSource::new("users").with_type_name("User")]);

    let artifacts = build_schema(config, connector).await.unwrap();
    assert!(artifacts.sdl.contains("type UserProfile {\n  bio: String!\n}"));
    assert!(artifacts.sdl.contains("profile: UserProfile!"));

    // Nested projection resolves through the executable schema.
    let response = artifacts
        .schema
        .execute(r#"{ user(id: "1") { data { profile { bio } } } }"#)
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["user"]["data"]["profile"]["bio"], json!("x"));
}

#[tokio::test]
async fn test_partition_sampling_fairness_via_build() {
    let mut documents = Vec::new();
    for i in 0..1000 {
        documents.push(json!({
            "id": i.to_string(),
            "partition": format!("p{}", i % 5),
        }));
    }
    let (_, connector) = store_with("events", "/partition", documents).await;
    let source = ContainerSource::new("events")
        .with_type_name("Event")
        .with_sample_size(50);

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let artifacts = SchemaBuild::new(config(vec![source]), connector)
        .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)))
        .build()
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let complete = events
        .iter()
        .find(|e| e.stage == BuildStage::SamplingComplete)
        .expect("sampling completed");
    let metadata = complete.metadata.as_ref().unwrap();
    assert_eq!(metadata["partitionsCovered"], json!(5));
    assert_eq!(metadata["documents"], json!(50));
    assert_eq!(artifacts.bindings[0].partition_key_path, "/partition");
}

#[tokio::test]
async fn test_pagination_round_trip() {
    let documents = (0..5).map(|i| json!({"id": i.to_string(), "n": i})).collect();
    let (_, connector) = store_with("things", "/id", documents).await;
    let config = config(vec![ContainerSource::new("things").with_type_name("Thing")]);
    let artifacts = build_schema(config, connector).await.unwrap();

    let mut token: Option<String> = None;
    let mut pages: Vec<usize> = Vec::new();
    let mut has_more: Vec<bool> = Vec::new();
    let mut ids: Vec<String> = Vec::new();
    loop {
        let mut args = serde_json::Map::new();
        args.insert("limit".into(), json!(2));
        if let Some(t) = &token {
            args.insert("continuationToken".into(), json!(t));
        }
        let page = artifacts.resolvers.call("Query", "things", args).await.unwrap();
        let items = page["items"].as_array().unwrap();
        pages.push(items.len());
        has_more.push(page["hasMore"].as_bool().unwrap());
        for item in items {
            ids.push(item["id"].as_str().unwrap().to_string());
        }
        match page["continuationToken"].as_str() {
            Some(t) => token = Some(t.to_string()),
            None => break,
        }
    }
    assert_eq!(pages, vec![2, 2, 1]);
    assert_eq!(has_more, vec![true, true, false]);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5, "pages overlap or drop documents");
}

#[tokio::test]
async fn test_etag_conditional_read() {
    let (_, connector) =
        store_with("users", "/id", vec![json!({"id": "1", "name": "x"})]).await;
    let config = config(vec![ContainerSource::new("users").with_type_name("User")]);
    let artifacts = build_schema(config, connector).await.unwrap();

    let first = artifacts
        .resolvers
        .call("Query", "user", doc(json!({"id": "1"})))
        .await
        .unwrap();
    let etag = first["etag"].as_str().unwrap().to_string();
    assert!(!etag.is_empty());

    let err = artifacts
        .resolvers
        .call("Query", "user", doc(json!({"id": "1", "ifNoneMatch": etag})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "precondition-failed");

    let other = artifacts
        .resolvers
        .call("Query", "user", doc(json!({"id": "1", "ifNoneMatch": "other"})))
        .await
        .unwrap();
    assert_eq!(other["data"]["name"], json!("x"));
    assert_eq!(other["etag"], json!(etag));
}

#[tokio::test]
async fn test_rate_limit_retry_waits_and_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let container = store.add_container("users", "/id");
    container.seed(doc(json!({"id": "1", "name": "x"}))).await;
    let connector = Arc::new(MemoryConnector::new(store.clone()));
    let config = config(vec![ContainerSource::new("users").with_type_name("User")]);
    let artifacts = build_schema(config, connector).await.unwrap();

    container
        .fail_next_on(
            "point_read",
            StoreError::RateLimited { retry_after: Some(std::time::Duration::from_millis(10)) },
        )
        .await;
    let start = std::time::Instant::now();
    let result = artifacts
        .resolvers
        .call("Query", "user", doc(json!({"id": "1"})))
        .await
        .unwrap();
    assert_eq!(result["data"]["id"], json!("1"));
    assert!(start.elapsed() >= std::time::Duration::from_millis(10));
}

#[tokio::test]
async fn test_filter_injection_rejected() {
    let (_, connector) =
        store_with("users", "/id", vec![json!({"id": "1", "name": "x"})]).await;
    let config = config(vec![ContainerSource::new("users").with_type_name("User")]);
    let artifacts = build_schema(config, connector).await.unwrap();

    let err = artifacts
        .resolvers
        .call(
            "Query",
            "users",
            doc(json!({"where": {"name; DROP TABLE": {"eq": "x"}}})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "bad-filter");
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_releases_once() {
    let (store, connector) =
        store_with("users", "/id", vec![json!({"id": "1"})]).await;
    let config = config(vec![ContainerSource::new("users").with_type_name("User")]);
    let artifacts = build_schema(config, connector).await.unwrap();

    assert!(!store.is_disposed());
    artifacts.dispose();
    artifacts.dispose();
    let handle = artifacts.dispose_handle();
    handle.dispose();
    assert!(store.is_disposed());
    assert!(handle.is_disposed());
}

#[tokio::test]
async fn test_invalid_config_fails_before_connecting() {
    let (_, connector) = store_with("users", "/id", vec![json!({"id": "1"})]).await;
    let mut bad = config(vec![ContainerSource::new("users")]);
    bad.endpoint = Some("https://db.example.com".into()); // both auth modes
    bad.credential = Some("key".into());
    let err = build_schema(bad, connector.clone()).await.unwrap_err();
    assert_eq!(err.kind(), "configuration");
    assert!(connector.last_settings().is_none(), "connect must not run");
}

#[tokio::test]
async fn test_empty_container_fails_inference() {
    let store = Arc::new(MemoryStore::new());
    store.add_container("empty", "/id");
    let connector = Arc::new(MemoryConnector::new(store));
    let config = config(vec![ContainerSource::new("empty").with_type_name("Nothing")]);
    let err = build_schema(config, connector).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn test_unknown_container_is_configuration_error() {
    let (_, connector) = store_with("users", "/id", vec![json!({"id": "1"})]).await;
    let config = config(vec![ContainerSource::new("missing")]);
    let err = build_schema(config, connector).await.unwrap_err();
    assert_eq!(err.kind(), "configuration");
}

#[tokio::test]
async fn test_multi_container_build_unifies_roots() {
    let store = Arc::new(MemoryStore::new());
    let users = store.add_container("users", "/id");
    users.seed(doc(json!({"id": "1", "name": "a"}))).await;
    let orders = store.add_container("orders", "/customer");
    orders
        .seed(doc(json!({"id": "o1", "customer": "1", "total": 10.5})))
        .await;
    let connector = Arc::new(MemoryConnector::new(store));
    let config = config(vec![
        ContainerSource::new("users"),
        ContainerSource::new("orders"),
    ]);

    let artifacts = build_schema(config, connector).await.unwrap();
    // Derived type names: users → User, orders → Order.
    assert!(artifacts.sdl.contains("type User {"));
    assert!(artifacts.sdl.contains("type Order {"));
    assert_eq!(artifacts.sdl.matches("type Query {").count(), 1);
    assert_eq!(artifacts.containers.len(), 2);

    // Order list requires its own partition key path in SQL.
    let result = artifacts
        .resolvers
        .call("Query", "orders", doc(json!({"partitionKey": "1"})))
        .await
        .unwrap();
    assert_eq!(result["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sdl_is_deterministic_across_builds() {
    let documents = vec![
        json!({"id": "1", "name": "a", "tags": ["x"], "meta": {"k": 1}}),
        json!({"id": "2", "name": "b"}),
    ];
    let (_, c1) = store_with("users", "/id", documents.clone()).await;
    let (_, c2) = store_with("users", "/id", documents).await;
    let first = build_schema(config(vec![ContainerSource::new("users")]), c1)
        .await
        .unwrap();
    let second = build_schema(config(vec![ContainerSource::new("users")]), c2)
        .await
        .unwrap();
    assert_eq!(first.sdl, second.sdl);
}

#[tokio::test]
async fn test_full_crud_through_executable_schema() {
    let (_, connector) = store_with(
        "tasks",
        "/id",
        vec![json!({"id": "1", "title": "seed", "done": false})],
    )
    .await;
    let config = config(vec![ContainerSource::new("tasks").with_type_name("Task")]);
    let artifacts = build_schema(config, connector).await.unwrap();
    let schema = &artifacts.schema;

    let create = schema
        .execute(r#"mutation { createTask(input: {title: "write tests", done: false}) { data { id title } etag } }"#)
        .await;
    assert!(create.errors.is_empty(), "{:?}", create.errors);
    let created = create.data.into_json().unwrap();
    let id = created["createTask"]["data"]["id"].as_str().unwrap().to_string();

    let update = schema
        .execute(format!(
            r#"mutation {{ updateTask(id: "{id}", input: {{done: true}}) {{ data {{ title done }} }} }}"#
        ))
        .await;
    assert!(update.errors.is_empty(), "{:?}", update.errors);
    let updated = update.data.into_json().unwrap();
    assert_eq!(updated["updateTask"]["data"]["done"], json!(true));
    assert_eq!(updated["updateTask"]["data"]["title"], json!("write tests"));

    let delete = schema
        .execute(format!(r#"mutation {{ deleteTask(id: "{id}") {{ id }} }}"#))
        .await;
    assert!(delete.errors.is_empty(), "{:?}", delete.errors);

    let read = schema
        .execute(format!(r#"{{ task(id: "{id}") {{ data {{ id }} etag }} }}"#))
        .await;
    assert!(read.errors.is_empty(), "{:?}", read.errors);
    let read = read.data.into_json().unwrap();
    assert_eq!(read["task"]["data"], json!(null));
}

#[tokio::test]
async fn test_schema_strategy_surfaces_variants() {
    let mut documents = Vec::new();
    for i in 0..20 {
        documents.push(json!({"id": format!("a{i}"), "name": "x"}));
    }
    for i in 0..2 {
        documents.push(json!({"id": format!("b{i}"), "name": "x", "extra": 1}));
    }
    let (_, connector) = store_with("items", "/id", documents).await;
    let mut source = ContainerSource::new("items").with_type_name("Item");
    source.sampling.strategy = engine::SampleStrategyKind::Schema;

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let artifacts = SchemaBuild::new(config(vec![source]), connector)
        .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)))
        .build()
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let complete = events
        .iter()
        .find(|e| e.stage == BuildStage::SamplingComplete)
        .expect("sampling completed");
    assert_eq!(complete.metadata.as_ref().unwrap()["schemaVariants"], json!(2));
    // The rare shape survived into the inferred type.
    assert!(artifacts.sdl.contains("extra: Float"));
}

#[tokio::test]
async fn test_operation_toggles_through_build() {
    let (_, connector) =
        store_with("users", "/id", vec![json!({"id": "1", "name": "x"})]).await;
    let mut source = ContainerSource::new("users").with_type_name("User");
    source.operations = engine::OperationsConfig {
        include: Some(vec![engine::OperationKind::Create, engine::OperationKind::Delete]),
        exclude: Vec::new(),
    };
    let artifacts = build_schema(config(vec![source]), connector).await.unwrap();

    assert!(artifacts.sdl.contains("createUser"));
    assert!(artifacts.sdl.contains("deleteUser"));
    assert!(!artifacts.sdl.contains("upsertUser"));
    assert!(artifacts.resolvers.get("Mutation", "createUser").is_some());
    assert!(artifacts.resolvers.get("Mutation", "upsertUser").is_none());
    assert!(artifacts.resolvers.get("Mutation", "incrementUser").is_none());
}

#[tokio::test]
async fn test_require_partition_key_through_build() {
    let (_, connector) = store_with(
        "events",
        "/tenant",
        vec![json!({"id": "1", "tenant": "t1", "kind": "login"})],
    )
    .await;
    let mut source = ContainerSource::new("events").with_type_name("Event");
    source.require_partition_key_on_queries = true;
    let artifacts = build_schema(config(vec![source]), connector).await.unwrap();

    let err = artifacts
        .resolvers
        .call("Query", "events", doc(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let ok = artifacts
        .resolvers
        .call("Query", "events", doc(json!({"partitionKey": "t1"})))
        .await
        .unwrap();
    assert_eq!(ok["items"].as_array().unwrap().len(), 1);

    // Point reads on a non-/id container also demand the partition key.
    let err = artifacts
        .resolvers
        .call("Query", "event", doc(json!({"id": "1"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn test_progress_stages_arrive_in_order() {
    let (_, connector) =
        store_with("users", "/id", vec![json!({"id": "1", "name": "x"})]).await;
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    SchemaBuild::new(config(vec![ContainerSource::new("users")]), connector)
        .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)))
        .build()
        .await
        .unwrap();

    let stages: Vec<BuildStage> = events.lock().unwrap().iter().map(|e| e.stage).collect();
    let position = |stage: BuildStage| {
        stages
            .iter()
            .position(|s| *s == stage)
            .unwrap_or_else(|| panic!("{stage:?} missing from {stages:?}"))
    };
    assert!(position(BuildStage::SamplingStarted) < position(BuildStage::SamplingComplete));
    assert!(position(BuildStage::SamplingComplete) < position(BuildStage::InferenceStarted));
    assert!(position(BuildStage::InferenceStarted) < position(BuildStage::InferenceComplete));
    assert!(position(BuildStage::InferenceComplete) < position(BuildStage::SdlGenerationStarted));
    assert!(
        position(BuildStage::SdlGenerationStarted) < position(BuildStage::SdlGenerationComplete)
    );
}

#[tokio::test]
async fn test_connector_observes_loopback_flag() {
    let (_, connector) =
        store_with("users", "/id", vec![json!({"id": "1"})]).await;
    let mut cfg = config(vec![ContainerSource::new("users")]);
    cfg.connection_string =
        Some("AccountEndpoint=https://localhost:8081;AccountKey=secret".into());
    build_schema(cfg, connector.clone()).await.unwrap();

    let settings = connector.last_settings().expect("connected");
    assert!(settings.accept_invalid_certs);
    assert_eq!(settings.database, "app");
}
