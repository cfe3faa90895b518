use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ddlsynth_ai::{
    AiOrchestrator, CancellationToken, CompletionClient, CompletionError, CompletionRequest,
    NoopSink,
};
use ddlsynth_generate::GenerationConfig;
use ddlsynth_parse::{ParseError, SchemaParser};

const LIBRARY_DDL: &str = r#"
-- library catalogue
CREATE TABLE authors (
  id SERIAL PRIMARY KEY,
  name VARCHAR(100) NOT NULL,
  bio TEXT
);

CREATE TABLE books (
  id SERIAL PRIMARY KEY,
  title VARCHAR(200) NOT NULL,
  author_id INTEGER NOT NULL REFERENCES authors(id),
  price NUMERIC(8,2) CHECK (price >= 0)
);
"#;

const MYSQL_DDL: &str = r#"
CREATE TABLE `users` (
  `id` INT NOT NULL AUTO_INCREMENT,
  `email` VARCHAR(255) NOT NULL COMMENT 'login',
  `role` ENUM('admin','member') DEFAULT 'member',
  `created` DATETIME,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB AUTO_INCREMENT=10 DEFAULT CHARSET=utf8mb4;
"#;

struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    calls: Mutex<usize>,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        *self.calls.lock().expect("calls lock") += 1;
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Ok("Sorry, I can't do that.".to_string()))
    }
}

#[test]
fn postgres_ddl_parses_without_warnings() {
    let schema = SchemaParser::new().parse_offline(LIBRARY_DDL).expect("schema");

    assert_eq!(schema.table_names(), vec!["authors", "books"]);
    assert!(schema.meta.parse_warnings.is_empty(), "{:?}", schema.meta.parse_warnings);
    assert!(schema.meta.fingerprint.is_some());

    let authors = &schema.tables["authors"];
    assert_eq!(authors.primary_key, vec!["id"]);
    assert!(!authors.columns["id"].nullable);
    assert!(!authors.columns["name"].nullable);
    assert!(authors.columns["bio"].nullable);

    let books = &schema.tables["books"];
    assert_eq!(books.foreign_keys.len(), 1);
    assert_eq!(books.foreign_keys[0].label(), "author_id -> authors(id)");
    assert_eq!(books.checks.len(), 1);
    assert_eq!(books.checks[0].column.as_deref(), Some("price"));
    assert_eq!(books.checks[0].expression, "price >= 0");
}

#[test]
fn mysql_ddl_is_normalized() {
    let schema = SchemaParser::new().parse_offline(MYSQL_DDL).expect("schema");

    let users = &schema.tables["users"];
    let columns: Vec<&str> = users.columns.keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["id", "email", "role", "created"]);
    assert_eq!(users.primary_key, vec!["id"]);
    assert_eq!(users.columns["id"].default.as_deref(), Some("serial"));
    assert!(!users.columns["email"].nullable);
    assert_eq!(users.columns["role"].data_type, "TEXT");
    assert_eq!(users.columns["role"].default.as_deref(), Some("member"));
    assert_eq!(schema.meta.enums["users.role"], vec!["admin", "member"]);
    assert_eq!(users.columns["created"].data_type, "TIMESTAMP");
}

#[test]
fn unparsable_statement_is_salvaged() {
    let schema = SchemaParser::new()
        .parse_offline("CREATE TABLE odd (id INT PRIMARY KEY, name TEXT NOT NULL ~~ junk);")
        .expect("schema");

    let odd = &schema.tables["odd"];
    assert_eq!(odd.primary_key, vec!["id"]);
    assert!(!odd.columns["name"].nullable);
    assert_eq!(schema.meta.parse_warnings, vec!["odd: recovered by pattern salvage"]);
}

#[test]
fn columns_named_identity_survive_normalization() {
    let schema = SchemaParser::new()
        .parse_offline(
            "CREATE TABLE people (id INT IDENTITY(1,1) PRIMARY KEY, identity_number VARCHAR(20) NOT NULL);",
        )
        .expect("schema");

    let people = &schema.tables["people"];
    let columns: Vec<&str> = people.columns.keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["id", "identity_number"]);
    assert_eq!(people.columns["id"].default.as_deref(), Some("serial"));
    assert!(!people.columns["identity_number"].nullable);
}

#[test]
fn dangling_foreign_keys_are_dropped_with_a_warning() {
    let schema = SchemaParser::new()
        .parse_offline("CREATE TABLE a (id INT PRIMARY KEY, b_id INT REFERENCES missing(id));")
        .expect("schema");

    assert!(schema.tables["a"].foreign_keys.is_empty());
    assert_eq!(
        schema.meta.parse_warnings,
        vec!["a: dropped foreign key to unknown table 'missing'"]
    );
}

#[tokio::test]
async fn zero_tables_without_a_service_is_an_error() {
    let result = SchemaParser::new().parse("users have an id and a name").await;
    assert!(matches!(result, Err(ParseError::NoTables)));
}

#[tokio::test]
async fn completion_fallback_recovers_tables() {
    let client = ScriptedClient::new(vec![Ok(r#"Here you go:
```json
{"tables": [
  {"name": "users", "columns": [{"name": "id", "type": "INT", "nullable": false}], "primaryKey": ["id"]},
  {"name": "posts", "columns": {"id": "INT", "user_id": "INT"}, "primary_key": "id",
   "foreignKeys": [{"columns": ["user_id"], "referenceTable": "users"}]}
]}
```"#
        .to_string())]);
    let parser = SchemaParser::new().with_client(client.clone() as Arc<dyn CompletionClient>);

    let schema = parser.parse("users(id), posts(id, user_id -> users)").await.expect("schema");

    assert_eq!(client.calls(), 1);
    assert_eq!(schema.table_names(), vec!["users", "posts"]);
    assert_eq!(schema.tables["posts"].foreign_keys[0].label(), "user_id -> users(id)");
    assert_eq!(schema.meta.parse_warnings, vec!["schema recovered by completion fallback"]);
}

#[tokio::test]
async fn unusable_fallback_answer_is_no_tables() {
    let client = ScriptedClient::new(vec![Err(CompletionError::Disabled)]);
    let parser = SchemaParser::new().with_client(client.clone() as Arc<dyn CompletionClient>);
    assert!(matches!(parser.parse("nothing").await, Err(ParseError::NoTables)));

    let parser = SchemaParser::new().with_client(ScriptedClient::new(Vec::new()) as Arc<dyn CompletionClient>);
    assert!(matches!(parser.parse("nothing").await, Err(ParseError::NoTables)));
}

#[tokio::test]
async fn local_recovery_never_calls_the_service() {
    let client = ScriptedClient::new(Vec::new());
    let parser = SchemaParser::new().with_client(client.clone() as Arc<dyn CompletionClient>);

    parser.parse(LIBRARY_DDL).await.expect("schema");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn enhancement_attaches_value_hints() {
    let client = ScriptedClient::new(vec![Ok(
        r#"{"books.price": {"min": 5, "max": 80, "examples": [12.5]}, "books.isbn": {"min": 1}}"#
            .to_string(),
    )]);
    let parser = SchemaParser::new()
        .with_client(client as Arc<dyn CompletionClient>)
        .with_enhancement(true);

    let schema = parser.parse(LIBRARY_DDL).await.expect("schema");
    assert_eq!(schema.meta.value_hints.len(), 1);
    assert_eq!(schema.meta.value_hints["books.price"].max, Some(80.0));
}

#[tokio::test]
async fn failed_enhancement_is_only_a_warning() {
    let client = ScriptedClient::new(vec![Err(CompletionError::Timeout(10))]);
    let parser = SchemaParser::new()
        .with_client(client as Arc<dyn CompletionClient>)
        .with_enhancement(true);

    let schema = parser.parse(LIBRARY_DDL).await.expect("schema");
    assert!(schema.meta.value_hints.is_empty());
    assert_eq!(schema.meta.parse_warnings.len(), 1);
    assert!(schema.meta.parse_warnings[0].starts_with("enhancement failed"));
}

#[tokio::test]
async fn parsed_schema_generates_a_valid_dataset() {
    let schema = SchemaParser::new().parse_offline(LIBRARY_DDL).expect("schema");
    let config = GenerationConfig {
        seed: Some(1),
        num_records: Some(3),
        ..GenerationConfig::default()
    };

    let outcome = AiOrchestrator::disabled()
        .run(&schema, &config, &NoopSink, &CancellationToken::new())
        .await
        .expect("outcome");

    assert_eq!(outcome.dataset["authors"].len(), 3);
    assert_eq!(outcome.dataset["books"].len(), 3);
    assert!(outcome.meta.validation.passed());
    assert_eq!(outcome.meta.validation.summary.total_violations(), 0);
}

#[tokio::test]
async fn short_and_non_ascii_text_columns_generate_cleanly() {
    let schema = SchemaParser::new()
        .parse_offline(
            "CREATE TABLE café (id INT PRIMARY KEY, nom VARCHAR(4));\nCREATE TABLE countries (code CHAR(2) PRIMARY KEY, name VARCHAR(40) NOT NULL);",
        )
        .expect("schema");
    let config = GenerationConfig {
        seed: Some(11),
        num_records: Some(3),
        ..GenerationConfig::default()
    };

    let outcome = AiOrchestrator::disabled()
        .run(&schema, &config, &NoopSink, &CancellationToken::new())
        .await
        .expect("outcome");

    assert_eq!(outcome.dataset["café"].len(), 3);
    assert_eq!(outcome.dataset["countries"].len(), 3);
    assert_eq!(outcome.meta.validation.summary.pk_duplicates, 0);
    assert!(outcome.meta.validation.passed());
}
