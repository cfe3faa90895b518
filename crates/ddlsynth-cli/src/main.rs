mod logging;
mod runs;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use ddlsynth_ai::AiOrchestrator;
use ddlsynth_core::{
    Dataset, Error as CoreError, Schema, build_fk_graph_report, schema_json_schema, validate_schema,
};
use ddlsynth_eval::{EvalError, ValidateOptions, Validator, render_report};
use ddlsynth_generate::{GenerationConfig, GenerationError, IntegrityRepairer};
use ddlsynth_jobs::{Job, JobError, JobId, JobManager, JobRequest, JobStatus};
use ddlsynth_parse::{ParseError, SchemaParser, schema_from_json};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use runs::{RunContext, start_run, write_bytes_atomic, write_json_atomic};
use settings::{SettingsError, load_or_create_settings};

#[derive(Debug, Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("job error: {0}")]
    Job(#[from] JobError),
    #[error("validation error: {0}")]
    Eval(#[from] EvalError),
    #[error("job {id} ended {status:?}: {message}")]
    JobFailed {
        id: JobId,
        status: JobStatus,
        message: String,
    },
    #[error("logging error: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "ddlsynth", version, about = "Synthetic datasets from SQL DDL")]
struct Cli {
    /// Service settings file; created with defaults when missing.
    #[arg(long, global = true, default_value = "ddlsynth.toml")]
    settings: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recover a schema from DDL and print it as JSON.
    Parse(ParseArgs),
    /// Generate a dataset through the job pipeline.
    Generate(GenerateArgs),
    /// Validate a dataset against a schema.
    Validate(ValidateArgs),
    /// Print the JSON Schema of the `schema.json` contract.
    Contract,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// DDL file.
    ddl: PathBuf,
    /// Write the schema here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Use the completion service even if settings disable it.
    #[arg(long, default_value_t = false)]
    ai: bool,
    /// Annotate value hints through the completion service.
    #[arg(long, default_value_t = false)]
    enhance: bool,
    /// Fail when the recovered schema is internally inconsistent.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// DDL file.
    ddl: PathBuf,
    /// GenerationConfig JSON (camelCase); flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Rows per table.
    #[arg(long)]
    rows: Option<u64>,
    /// Run the integrity repairer before validation.
    #[arg(long, default_value_t = false)]
    repair: bool,
    /// Attach per-column generation profiles.
    #[arg(long, default_value_t = false)]
    with_meta: bool,
    /// Use the completion service even if settings disable it.
    #[arg(long, default_value_t = false)]
    ai: bool,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Status polling interval in milliseconds.
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Schema JSON, or DDL when the extension is `.sql` or `.ddl`.
    schema: PathBuf,
    /// Dataset JSON: `{ "table": [rows] }`.
    dataset: PathBuf,
    /// Write the markdown report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Repair the dataset before validating it.
    #[arg(long, default_value_t = false)]
    repair: bool,
    /// Exit with an error when violations remain.
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Maximum violation examples listed in the report.
    #[arg(long, default_value_t = 20)]
    max_examples: usize,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Parse(args) => run_parse(&cli.settings, args).await,
        Command::Generate(args) => run_generate(&cli.settings, args).await,
        Command::Validate(args) => run_validate(args),
        Command::Contract => {
            println!("{}", serde_json::to_string_pretty(&schema_json_schema())?);
            Ok(())
        }
    }
}

async fn run_parse(settings_path: &Path, args: ParseArgs) -> Result<(), CliError> {
    logging::init_logging(None)?;
    let settings = load_or_create_settings(settings_path)?;
    let ddl = std::fs::read_to_string(&args.ddl)?;

    let mut parser = SchemaParser::new().with_enhancement(args.enhance);
    if let Some(client) = settings.completion_client(args.ai || args.enhance)? {
        parser = parser.with_client(client);
    }
    let schema = parser.parse(&ddl).await?;
    for warning in &schema.meta.parse_warnings {
        tracing::warn!(%warning, "parse warning");
    }
    if args.strict {
        validate_schema(&schema)?;
    }

    let graph = build_fk_graph_report(&schema);
    info!(
        event = "schema_recovered",
        tables = graph.summary.nodes,
        foreign_keys = graph.summary.edges,
        order = %graph.order.join(", ")
    );
    if !graph.cycle.is_empty() {
        tracing::warn!(cycle = %graph.cycle.join(", "), "foreign key cycle");
    }

    match args.out {
        Some(path) => {
            write_json_atomic(&path, &schema)?;
            info!(event = "schema_written", path = %path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&schema)?),
    }
    Ok(())
}

async fn run_generate(settings_path: &Path, args: GenerateArgs) -> Result<(), CliError> {
    let settings = load_or_create_settings(settings_path)?;
    let ddl = std::fs::read_to_string(&args.ddl)?;

    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<GenerationConfig>(&std::fs::read_to_string(path)?)?,
        None => GenerationConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.rows.is_some() {
        config.num_records = args.rows;
    }
    config.integrity_repair |= args.repair;
    config.with_meta |= args.with_meta;
    config.validate()?;

    let ai_enabled = settings.llm.enabled || args.ai;
    let run_id = Uuid::new_v4().to_string();
    let paths = start_run(&RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        run_dir: args.run_dir.clone(),
        ddl_path: args.ddl.clone(),
        ai_enabled,
        config: config.clone(),
    })?;
    logging::init_logging(Some(&paths.logs_path))?;
    info!(event = "run_started", run_id = %run_id, ai = ai_enabled);

    let client = settings.completion_client(args.ai)?;
    let mut parser = SchemaParser::new();
    if let Some(client) = &client {
        parser = parser.with_client(Arc::clone(client));
    }
    let orchestrator = AiOrchestrator::new(client).with_table_timeout(settings.table_timeout());
    let manager = Arc::new(JobManager::new(parser, orchestrator, settings.job_settings()));

    let id = manager.start(JobRequest { ddl, config }).await?;
    info!(event = "job_started", job = %id);
    let job = wait_for_job(&manager, id, Duration::from_millis(args.poll_ms.max(10))).await?;

    let Some(result) = job.result.filter(|_| job.status == JobStatus::Completed) else {
        return Err(CliError::JobFailed {
            id,
            status: job.status,
            message: job.error.unwrap_or_else(|| "no result".to_string()),
        });
    };

    write_json_atomic(&paths.schema_path, &result.schema)?;
    write_json_atomic(&paths.dataset_path, &result.dataset)?;
    write_json_atomic(&paths.meta_path, &result.meta)?;
    write_bytes_atomic(&paths.report_path, render_report(&result.meta.validation).as_bytes())?;

    info!(
        event = "run_finished",
        tables = result.dataset.len(),
        rows = result.meta.validation.summary.rows,
        violations = result.meta.validation.summary.total_violations(),
        ai_errors = result.meta.ai_errors.len()
    );
    println!("{}", paths.root.display());
    Ok(())
}

async fn wait_for_job(manager: &JobManager, id: JobId, interval: Duration) -> Result<Job, CliError> {
    let mut reported = -1.0;
    loop {
        let job = manager.status(id).await?;
        if job.progress > reported {
            reported = job.progress;
            info!(
                job = %id,
                status = ?job.status,
                progress = %format!("{:.0}%", job.progress * 100.0),
                "job progress"
            );
        }
        if job.status.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(interval).await;
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    logging::init_logging(None)?;
    let schema = load_schema(&args.schema)?;
    let mut dataset: Dataset = serde_json::from_str(&std::fs::read_to_string(&args.dataset)?)?;

    if args.repair {
        let audit = IntegrityRepairer::new().repair(&schema, &mut dataset)?;
        info!(event = "dataset_repaired", changes = audit.total_changes());
    }

    let report = Validator::new(ValidateOptions {
        max_examples: args.max_examples,
    })
    .validate(&schema, &dataset);
    let rendered = render_report(&report);

    match &args.out {
        Some(path) => {
            write_bytes_atomic(path, rendered.as_bytes())?;
            info!(event = "report_written", path = %path.display());
        }
        None => println!("{rendered}"),
    }

    if args.strict {
        report.ensure_passed()?;
    }
    Ok(())
}

fn load_schema(path: &Path) -> Result<Schema, CliError> {
    let text = std::fs::read_to_string(path)?;
    let is_ddl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql") || ext.eq_ignore_ascii_case("ddl"));
    let schema = if is_ddl {
        SchemaParser::new().parse_offline(&text)?
    } else {
        schema_from_json(&text)?
    };
    Ok(schema)
}
