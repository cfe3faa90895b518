use std::sync::Arc;
use std::time::{Duration, Instant};

use ddlsynth_core::{Dataset, Row, Schema, TableDef, Value, dependency_order};
use ddlsynth_eval::{ValidationReport, Validator};
use ddlsynth_generate::foreign::reconcile_foreign_keys;
use ddlsynth_generate::{
    DeterministicGenerator, GenerationConfig, GenerationMeta, IntegrityRepairer, Lcg,
    RepairAudit,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::client::CompletionClient;
use crate::errors::{CompletionError, OrchestratorError};
use crate::events::{ProgressEvent, ProgressSink, RowSource};
use crate::prompt::table_request;
use crate::response::{parse_response, records_for_table};

pub const DEFAULT_TABLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TEMPERATURE: f32 = 0.7;
const RETRY_TEMPERATURE_SCALE: f32 = 0.5;

/// A failed completion attempt for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiError {
    pub table: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub message: String,
}

/// Diagnostics attached to a generated dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMeta {
    pub seed: u64,
    pub table_sources: IndexMap<String, RowSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_errors: Vec<AiError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairAudit>,
    /// Set when the integrity repairer failed; the dataset is left as generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_failure: Option<String>,
    pub validation: ValidationReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationMeta>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub dataset: Dataset,
    pub meta: OutcomeMeta,
}

/// Per-table generation loop over an optional completion service.
///
/// Without a client the whole dataset comes from the deterministic
/// generator. Either way the result goes through the same enum fill,
/// repair and validation tail.
#[derive(Clone)]
pub struct AiOrchestrator {
    client: Option<Arc<dyn CompletionClient>>,
    table_timeout: Duration,
}

impl AiOrchestrator {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self {
            client,
            table_timeout: DEFAULT_TABLE_TIMEOUT,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_table_timeout(mut self, timeout: Duration) -> Self {
        self.table_timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn run(
        &self,
        schema: &Schema,
        config: &GenerationConfig,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, OrchestratorError> {
        config.validate()?;
        let start = Instant::now();
        let order = dependency_order(schema);
        let generator = DeterministicGenerator::new(config.clone());
        let mut meta = OutcomeMeta::default();

        info!(
            tables = order.len(),
            ai = self.client.is_some(),
            "dataset generation started"
        );

        let mut dataset = match &self.client {
            Some(client) => {
                self.generate_with_ai(
                    client.as_ref(),
                    schema,
                    config,
                    &generator,
                    &order,
                    sink,
                    cancel,
                    &mut meta,
                )
                .await?
            }
            None => {
                self.generate_offline(schema, config, &generator, &order, sink, cancel, &mut meta)
                    .await?
            }
        };

        if config.integrity_repair {
            match IntegrityRepairer::new().repair(schema, &mut dataset) {
                Ok(audit) => meta.repair = Some(audit),
                Err(err) => {
                    warn!(error = %err, "integrity repair failed");
                    meta.repair_failure = Some(err.to_string());
                }
            }
        }

        let validation = Validator::default().validate(schema, &dataset);
        if !validation.passed() {
            warn!(
                violations = validation.summary.total_violations(),
                pk_duplicates = validation.summary.pk_duplicates,
                fk_violations = validation.summary.fk_violations,
                not_null_violations = validation.summary.not_null_violations,
                "generated dataset failed validation"
            );
        }
        meta.validation = validation;

        info!(
            tables = dataset.len(),
            rows = dataset.values().map(Vec::len).sum::<usize>(),
            ai_errors = meta.ai_errors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "dataset generation completed"
        );

        Ok(GenerationOutcome { dataset, meta })
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_offline(
        &self,
        schema: &Schema,
        config: &GenerationConfig,
        generator: &DeterministicGenerator,
        order: &[String],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        meta: &mut OutcomeMeta,
    ) -> Result<Dataset, OrchestratorError> {
        let (mut rng, seed) = generator.rng();
        meta.seed = seed;
        let mut dataset = Dataset::new();

        for (index, table_name) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(table = %table_name, "generation cancelled");
                return Err(OrchestratorError::Cancelled);
            }
            sink.emit(ProgressEvent::TableStarted {
                table: table_name.clone(),
                index,
                total: order.len(),
            })
            .await;
            let rows = generator.generate_table(schema, table_name, &dataset, &mut rng)?;
            deliver(table_name, &rows, config, sink).await;
            finish_table(table_name, rows.len(), RowSource::Deterministic, index, order.len(), sink)
                .await;
            meta.table_sources
                .insert(table_name.clone(), RowSource::Deterministic);
            dataset.insert(table_name.clone(), rows);
        }

        // Same stream and post-pass as `DeterministicGenerator::generate`.
        let reassigned = reconcile_foreign_keys(schema, &mut dataset, order, &mut rng);
        if config.with_meta {
            meta.generation = Some(generator.describe(schema, &dataset, order, seed, &reassigned));
        }
        Ok(dataset)
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_with_ai(
        &self,
        client: &dyn CompletionClient,
        schema: &Schema,
        config: &GenerationConfig,
        generator: &DeterministicGenerator,
        order: &[String],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        meta: &mut OutcomeMeta,
    ) -> Result<Dataset, OrchestratorError> {
        let (mut rng, seed) = generator.rng();
        meta.seed = seed;
        let mut dataset = Dataset::new();

        for (index, table_name) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(table = %table_name, "generation cancelled");
                return Err(OrchestratorError::Cancelled);
            }
            let Some(table) = schema.table(table_name) else {
                continue;
            };
            sink.emit(ProgressEvent::TableStarted {
                table: table_name.clone(),
                index,
                total: order.len(),
            })
            .await;

            let requested = config.rows_for(table_name);
            let (rows, source) = if requested == 0 {
                (Vec::new(), RowSource::Ai)
            } else {
                let rows = self
                    .request_rows(client, schema, table, config, cancel, &mut meta.ai_errors)
                    .await?;
                if rows.is_empty() {
                    fallback_rows(generator, schema, table, requested, &dataset, &mut rng)
                } else {
                    (rows, RowSource::Ai)
                }
            };

            deliver(table_name, &rows, config, sink).await;
            finish_table(table_name, rows.len(), source, index, order.len(), sink).await;
            meta.table_sources.insert(table_name.clone(), source);
            dataset.insert(table_name.clone(), rows);
        }

        fill_enum_nulls(schema, &mut dataset);
        let reassigned = reconcile_foreign_keys(schema, &mut dataset, order, &mut rng);
        if config.with_meta {
            meta.generation = Some(generator.describe(schema, &dataset, order, seed, &reassigned));
        }
        Ok(dataset)
    }

    /// Ask the service for rows, retrying with a cooler temperature.
    ///
    /// Returns an empty list when every attempt failed; each failure is
    /// appended to `errors`.
    async fn request_rows(
        &self,
        client: &dyn CompletionClient,
        schema: &Schema,
        table: &TableDef,
        config: &GenerationConfig,
        cancel: &CancellationToken,
        errors: &mut Vec<AiError>,
    ) -> Result<Vec<Row>, OrchestratorError> {
        let attempts = config.max_retries + 1;
        let mut temperature = config.temperature;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            let request = table_request(schema, table, config, temperature, attempt > 1);
            if config.debug {
                debug!(table = %table.name, attempt, prompt = %request.prompt, "completion prompt");
            }

            let failure = match tokio::time::timeout(self.table_timeout, client.complete(request))
                .await
            {
                Err(_) => CompletionError::Timeout(self.table_timeout.as_millis() as u64).to_string(),
                Ok(Err(err)) => err.to_string(),
                Ok(Ok(text)) => {
                    if config.debug {
                        debug!(table = %table.name, attempt, response = %text, "completion response");
                    }
                    match parse_response(&text, &table.name) {
                        Ok(shape) => {
                            let rows = records_for_table(shape, table);
                            if !rows.is_empty() {
                                debug!(table = %table.name, attempt, rows = rows.len(), "completion parsed");
                                return Ok(rows);
                            }
                            "response contained no usable rows".to_string()
                        }
                        Err(err) => err.to_string(),
                    }
                }
            };

            warn!(table = %table.name, attempt, error = %failure, "completion attempt failed");
            errors.push(AiError {
                table: table.name.clone(),
                attempt,
                message: failure,
            });
            temperature = Some(temperature.unwrap_or(DEFAULT_TEMPERATURE) * RETRY_TEMPERATURE_SCALE);
        }

        Ok(Vec::new())
    }
}

fn fallback_rows(
    generator: &DeterministicGenerator,
    schema: &Schema,
    table: &TableDef,
    requested: u64,
    dataset: &Dataset,
    rng: &mut Lcg,
) -> (Vec<Row>, RowSource) {
    warn!(table = %table.name, "falling back to deterministic rows");
    match generator.generate_table(schema, &table.name, dataset, rng) {
        Ok(rows) if !rows.is_empty() => (rows, RowSource::Fallback),
        Ok(_) => (minimal_rows(table, requested), RowSource::Minimal),
        Err(err) => {
            warn!(table = %table.name, error = %err, "deterministic fallback failed");
            (minimal_rows(table, requested), RowSource::Minimal)
        }
    }
}

/// Sequential placeholder rows used when every other source came back empty.
fn minimal_rows(table: &TableDef, rows: u64) -> Vec<Row> {
    (0..rows)
        .map(|idx| {
            table
                .columns
                .iter()
                .map(|(name, column)| {
                    let value = if column.is_numeric() {
                        Value::Int(idx as i64 + 1)
                    } else {
                        Value::Text(format!("{name}_{}", idx + 1))
                    };
                    (name.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Replace nulls in enum-declared columns, cycling through the enumeration.
fn fill_enum_nulls(schema: &Schema, dataset: &mut Dataset) {
    for (table_name, table) in &schema.tables {
        let Some(rows) = dataset.get_mut(table_name) else {
            continue;
        };
        for (column_name, column) in &table.columns {
            let key = format!("{table_name}.{column_name}");
            let Some(values) = column
                .enumeration()
                .or_else(|| schema.meta.enums.get(&key).map(Vec::as_slice))
                .filter(|values| !values.is_empty())
            else {
                continue;
            };
            for (idx, row) in rows.iter_mut().enumerate() {
                let missing = row.get(column_name).is_none_or(Value::is_null);
                if missing {
                    row.insert(column_name.clone(), Value::Text(values[idx % values.len()].clone()));
                }
            }
        }
    }
}

async fn deliver(table: &str, rows: &[Row], config: &GenerationConfig, sink: &dyn ProgressSink) {
    let total = rows.len();
    let mut delivered = 0usize;
    for chunk in rows.chunks(config.chunk_size.max(1)) {
        delivered += chunk.len();
        sink.emit(ProgressEvent::RowsChunk {
            table: table.to_string(),
            rows: chunk.to_vec(),
            delivered,
            total,
        })
        .await;
        if config.chunk_delay_ms > 0 && delivered < total {
            tokio::time::sleep(Duration::from_millis(config.chunk_delay_ms)).await;
        }
    }
}

async fn finish_table(
    table: &str,
    rows: usize,
    source: RowSource,
    index: usize,
    total: usize,
    sink: &dyn ProgressSink,
) {
    info!(table = %table, rows, source = ?source, "table generated");
    sink.emit(ProgressEvent::TableCompleted {
        table: table.to_string(),
        rows,
        source,
    })
    .await;
    sink.emit(ProgressEvent::Progress {
        ratio: (index + 1) as f64 / total.max(1) as f64,
    })
    .await;
}
