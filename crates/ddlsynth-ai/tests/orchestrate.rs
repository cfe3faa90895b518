use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ddlsynth_ai::{
    AiOrchestrator, CancellationToken, CompletionClient, CompletionError, CompletionRequest,
    NoopSink, OrchestratorError, ProgressEvent, ProgressSink, RowSource,
};
use ddlsynth_core::{ColumnDef, ForeignKey, Schema, TableDef, Value};
use ddlsynth_generate::{DeterministicGenerator, GenerationConfig};

/// Replays canned responses in order; falls back to prose once exhausted.
struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Ok("I cannot help with that.".to_string()))
    }
}

struct SlowClient;

#[async_trait]
impl CompletionClient for SlowClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("[]".to_string())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
    cancel_on_complete: Option<CancellationToken>,
}

impl RecordingSink {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn emit(&self, event: ProgressEvent) {
        if let (ProgressEvent::TableCompleted { .. }, Some(token)) =
            (&event, &self.cancel_on_complete)
        {
            token.cancel();
        }
        self.events.lock().expect("events lock").push(event);
    }
}

fn authors_and_books() -> Schema {
    let mut authors = TableDef::new("authors");
    authors
        .columns
        .insert("id".to_string(), ColumnDef::new("INT", false));
    authors
        .columns
        .insert("name".to_string(), ColumnDef::new("TEXT", false));
    authors.primary_key = vec!["id".to_string()];

    let mut books = TableDef::new("books");
    books
        .columns
        .insert("id".to_string(), ColumnDef::new("INT", false));
    books
        .columns
        .insert("author_id".to_string(), ColumnDef::new("INT", true));
    books.primary_key = vec!["id".to_string()];
    books.foreign_keys.push(ForeignKey {
        columns: vec!["author_id".to_string()],
        reference_table: "authors".to_string(),
        reference_columns: vec!["id".to_string()],
    });

    let mut schema = Schema::default();
    schema.tables.insert("authors".to_string(), authors);
    schema.tables.insert("books".to_string(), books);
    schema
}

fn config(rows: u64) -> GenerationConfig {
    GenerationConfig {
        seed: Some(1),
        num_records: Some(rows),
        ..GenerationConfig::default()
    }
}

#[tokio::test]
async fn unparsable_responses_fall_back_to_deterministic_rows() {
    let schema = authors_and_books();
    let client = ScriptedClient::new(Vec::new());
    let orchestrator = AiOrchestrator::new(Some(client.clone() as Arc<dyn CompletionClient>));

    let outcome = orchestrator
        .run(&schema, &config(3), &NoopSink, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(outcome.dataset["authors"].len(), 3);
    assert_eq!(outcome.dataset["books"].len(), 3);
    assert_eq!(outcome.meta.table_sources["authors"], RowSource::Fallback);
    assert_eq!(outcome.meta.table_sources["books"], RowSource::Fallback);
    assert_eq!(outcome.meta.ai_errors.len(), 4);
    assert!(outcome.meta.validation.passed());

    let requests = client.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].temperature, None);
    assert_eq!(requests[1].temperature, Some(0.35));
    assert!(!requests[0].prompt.contains("Return ONLY"));
    assert!(requests[1].prompt.contains("Return ONLY"));
}

#[tokio::test]
async fn ai_rows_are_projected_and_reconciled() {
    let schema = authors_and_books();
    let client = ScriptedClient::new(vec![
        Ok("```json\n[{\"id\": 1, \"name\": \"Ada\"}, {\"id\": 2, \"name\": \"Bob\"},]\n```"
            .to_string()),
        Ok(r#"{"books": [{"id": 1, "author_id": 99}, {"id": 2, "author_id": 2, "isbn": "x"}]}"#
            .to_string()),
    ]);
    let orchestrator = AiOrchestrator::new(Some(client.clone() as Arc<dyn CompletionClient>));

    let outcome = orchestrator
        .run(&schema, &config(2), &NoopSink, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(outcome.meta.table_sources["authors"], RowSource::Ai);
    assert_eq!(outcome.meta.table_sources["books"], RowSource::Ai);
    assert!(outcome.meta.ai_errors.is_empty());
    assert_eq!(outcome.dataset["authors"][0]["name"], Value::from("Ada"));

    let author_ids: HashSet<String> = outcome.dataset["authors"]
        .iter()
        .map(|row| row["id"].key())
        .collect();
    for book in &outcome.dataset["books"] {
        assert!(author_ids.contains(&book["author_id"].key()));
        assert!(!book.contains_key("isbn"));
    }
    assert_eq!(outcome.dataset["books"][1]["author_id"], Value::Int(2));
    assert!(outcome.meta.validation.passed());
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn cancel_after_first_table_stops_generation() {
    let schema = authors_and_books();
    let client = ScriptedClient::new(vec![Ok(
        r#"[{"id": 1, "name": "Ada"}]"#.to_string()
    )]);
    let orchestrator = AiOrchestrator::new(Some(client.clone() as Arc<dyn CompletionClient>));
    let token = CancellationToken::new();
    let sink = RecordingSink {
        cancel_on_complete: Some(token.clone()),
        ..RecordingSink::default()
    };

    let result = orchestrator.run(&schema, &config(1), &sink, &token).await;

    assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    assert_eq!(client.requests().len(), 1);
    let started: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::TableStarted { table, .. } => Some(table),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["authors"]);
}

#[tokio::test]
async fn offline_cancel_skips_remaining_tables() {
    let schema = authors_and_books();
    let token = CancellationToken::new();
    let sink = RecordingSink {
        cancel_on_complete: Some(token.clone()),
        ..RecordingSink::default()
    };

    let result = AiOrchestrator::disabled()
        .run(&schema, &config(3), &sink, &token)
        .await;

    assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    let touched: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::TableStarted { table, .. } => Some(table),
            ProgressEvent::RowsChunk { table, .. } => Some(table),
            _ => None,
        })
        .collect();
    assert!(touched.iter().all(|table| table == "authors"), "{touched:?}");
    assert!(!touched.is_empty());
}

#[tokio::test]
async fn slow_completions_time_out() {
    let schema = authors_and_books();
    let orchestrator = AiOrchestrator::new(Some(Arc::new(SlowClient) as Arc<dyn CompletionClient>))
        .with_table_timeout(Duration::from_millis(20));
    let config = GenerationConfig {
        max_retries: 0,
        ..config(2)
    };

    let outcome = orchestrator
        .run(&schema, &config, &NoopSink, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(outcome.meta.ai_errors.len(), 2);
    assert!(outcome.meta.ai_errors[0].message.contains("timed out"));
    assert_eq!(outcome.dataset["authors"].len(), 2);
}

#[tokio::test]
async fn disabled_ai_matches_deterministic_generator() {
    let schema = authors_and_books();
    let config = config(4);

    let outcome = AiOrchestrator::disabled()
        .run(&schema, &config, &NoopSink, &CancellationToken::new())
        .await
        .expect("run");
    let expected = DeterministicGenerator::new(config.clone())
        .generate(&schema)
        .expect("generate");

    assert_eq!(outcome.dataset, expected.dataset);
    assert_eq!(outcome.meta.seed, 1);
    assert_eq!(outcome.meta.table_sources["books"], RowSource::Deterministic);
    assert!(outcome.meta.validation.passed());
    assert!(outcome.meta.generation.is_none());

    let described = AiOrchestrator::disabled()
        .run(
            &schema,
            &GenerationConfig {
                with_meta: true,
                ..config.clone()
            },
            &NoopSink,
            &CancellationToken::new(),
        )
        .await
        .expect("run with meta");
    let expected_meta = DeterministicGenerator::new(GenerationConfig {
        with_meta: true,
        ..config
    })
    .generate(&schema)
    .expect("generate with meta")
    .meta;
    assert_eq!(described.meta.generation, Some(expected_meta));
}

#[tokio::test]
async fn rows_are_delivered_in_chunks() {
    let schema = authors_and_books();
    let config = GenerationConfig {
        chunk_size: 2,
        with_meta: true,
        ..config(5)
    };
    let sink = RecordingSink::default();

    let outcome = AiOrchestrator::disabled()
        .run(&schema, &config, &sink, &CancellationToken::new())
        .await
        .expect("run");

    let delivered: Vec<usize> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::RowsChunk {
                table, delivered, ..
            } if table == "authors" => Some(delivered),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec![2, 4, 5]);

    let ratios: Vec<f64> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::Progress { ratio } => Some(ratio),
            _ => None,
        })
        .collect();
    assert_eq!(ratios, vec![0.5, 1.0]);
    assert!(outcome.meta.generation.is_some());
}

#[tokio::test]
async fn repair_runs_after_ai_generation() {
    let schema = authors_and_books();
    let client = ScriptedClient::new(vec![
        Ok(r#"[{"id": 1, "name": "A"}, {"id": 1, "name": "B"}]"#.to_string()),
        Ok(r#"[{"id": 1, "author_id": 1}]"#.to_string()),
    ]);
    let config = GenerationConfig {
        integrity_repair: true,
        ..config(2)
    };

    let outcome = AiOrchestrator::new(Some(client as Arc<dyn CompletionClient>))
        .run(&schema, &config, &NoopSink, &CancellationToken::new())
        .await
        .expect("run");

    let audit = outcome.meta.repair.expect("repair audit");
    assert_eq!(audit.pk_rewrites.get("authors.id"), Some(&2));
    assert!(outcome.meta.repair_failure.is_none());
    assert!(outcome.meta.validation.passed());
}
