//! CLI command definitions for imagen-forge.
//!
//! Each stage subcommand builds its configuration and backend first, so a
//! bad option or missing credential aborts before any unit is touched, then
//! runs one sweep over the dataset.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;

use crate::backend::{CommandBackend, GenerationBackend, OpenAiImagesBackend, TextBackend};
use crate::dataset::{EvaluationPolicy, DEFAULT_EVALUATOR};
use crate::error::ConfigError;
use crate::llm::{LiteLlmClient, DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::pipeline::{
    collect_status, parse_task_list, EvaluateStage, GenerateStage, ObjectsStage, RefineStage,
    Stage, SweepConfig, SweepDriver, SweepSummary, DEFAULT_GENERATION_DELAY_SECS,
    DEFAULT_TEXT_DELAY_SECS,
};

/// Image benchmark pipeline: refine prompts, extract objects, generate and rate candidates.
#[derive(Parser)]
#[command(name = "imagen-forge")]
#[command(about = "Resumable prompt refinement, image generation and evaluation sweeps")]
#[command(version)]
#[command(
    long_about = "imagen-forge sweeps a benchmark dataset laid out as <root>/<TASK>/<TASK>_<TOPIC>_<n>/.\n\nEvery stage skips work that is already stored, so a sweep can be re-run at any time to pick up new or previously failed units.\n\nExample usage:\n  imagen-forge refine --root ./bench\n  imagen-forge generate --root ./bench --backend gpt --kind openai-images\n  imagen-forge evaluate --root ./bench --tasks TIE,SRIE"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Rewrite each prompt into a clearer, more specific `prompt_refined`.
    Refine(TextStageArgs),

    /// List the visual elements each output image must contain.
    Objects(TextStageArgs),

    /// Generate one output image per unit with a named backend.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Rate every generated candidate on the four-criterion rubric.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Report completion counts per stage without calling any backend.
    Status(StatusArgs),
}

/// Dataset selection shared by all subcommands.
#[derive(clap::Args, Debug, Clone)]
pub struct SweepArgs {
    /// Dataset root containing one directory per task category.
    #[arg(short = 'r', long, env = "IMAGEN_FORGE_ROOT")]
    pub root: PathBuf,

    /// Comma-separated task categories to visit (default: all).
    #[arg(short = 't', long)]
    pub tasks: Option<String>,

    /// Seconds to wait after each saved result (0 disables the pause).
    #[arg(long)]
    pub delay_secs: Option<u64>,
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(clap::Args, Debug, Clone)]
pub struct LlmArgs {
    /// API key (falls back to LITELLM_API_KEY).
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the chat completions API.
    #[arg(long, env = "LITELLM_API_BASE", default_value = DEFAULT_API_BASE)]
    pub base_url: String,

    /// Model identifier.
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Total attempts per request for transient transport failures.
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,
}

/// Arguments for `refine` and `objects`.
#[derive(Parser, Debug)]
pub struct TextStageArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Kind of generation backend.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Chat completions model that answers with images.
    Chat,
    /// OpenAI Images API (generations / edits).
    OpenaiImages,
    /// Local inference program.
    Command,
}

/// Arguments for `imagen-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Backend name; output goes to model_output/<backend>.<ext>.
    #[arg(short = 'b', long)]
    pub backend: String,

    /// How to reach the backend.
    #[arg(short = 'k', long, value_enum, default_value = "chat")]
    pub kind: BackendKind,

    /// Program to run for `--kind command`.
    #[arg(long, required_if_eq("kind", "command"))]
    pub command: Option<String>,

    /// Extra argument passed to the program before the generated ones (repeatable).
    #[arg(long = "command-arg", allow_hyphen_values = true)]
    pub command_args: Vec<String>,

    /// Timeout in seconds for `--kind command`.
    #[arg(long, default_value = "600")]
    pub command_timeout_secs: u64,

    /// API key for `--kind openai-images`.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Model for `--kind openai-images`.
    #[arg(long, default_value = crate::backend::openai_images::DEFAULT_IMAGE_MODEL)]
    pub image_model: String,

    /// Output size for `--kind openai-images`, e.g. 1024x1024.
    #[arg(long)]
    pub size: Option<String>,

    /// Frame the prompt with the task definition and visual domain.
    #[arg(long)]
    pub wrap_prompt: bool,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Arguments for `imagen-forge evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    #[command(flatten)]
    pub llm: LlmArgs,

    /// Evaluator name; results go to <evaluator>_result.json.
    #[arg(short = 'e', long, default_value = DEFAULT_EVALUATOR)]
    pub evaluator: String,

    /// Backends treated as already rated on editing tasks (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "uno")]
    pub skip_on_edit: Vec<String>,
}

/// Arguments for `imagen-forge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Generation backend to report on (repeatable).
    #[arg(short = 'b', long = "backend")]
    pub backends: Vec<String>,

    #[arg(short = 'e', long, default_value = DEFAULT_EVALUATOR)]
    pub evaluator: String,

    #[arg(long, value_delimiter = ',', default_value = "uno")]
    pub skip_on_edit: Vec<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Refine(args) => {
            let config = sweep_config(&args.sweep, DEFAULT_TEXT_DELAY_SECS)?;
            let backend: Arc<dyn TextBackend> = Arc::new(build_llm_client(&args.llm)?);
            run_stage(config, &RefineStage::new(backend)).await;
        }
        Commands::Objects(args) => {
            let config = sweep_config(&args.sweep, DEFAULT_TEXT_DELAY_SECS)?;
            let backend: Arc<dyn TextBackend> = Arc::new(build_llm_client(&args.llm)?);
            run_stage(config, &ObjectsStage::new(backend)).await;
        }
        Commands::Generate(args) => {
            let config = sweep_config(&args.sweep, DEFAULT_GENERATION_DELAY_SECS)?;
            let backend = build_generation_backend(&args)?;
            let stage = GenerateStage::new(backend).with_wrapped_prompt(args.wrap_prompt);
            run_stage(config, &stage).await;
        }
        Commands::Evaluate(args) => {
            let config = sweep_config(&args.sweep, DEFAULT_TEXT_DELAY_SECS)?;
            let backend: Arc<dyn TextBackend> = Arc::new(build_llm_client(&args.llm)?);
            let policy = evaluation_policy(&args.evaluator, &args.skip_on_edit);
            run_stage(config, &EvaluateStage::new(backend, policy)).await;
        }
        Commands::Status(args) => {
            let config = sweep_config(&args.sweep, 0)?;
            let policy = evaluation_policy(&args.evaluator, &args.skip_on_edit);
            let report = collect_status(&config, &policy, &args.backends);
            println!("{}", report);
        }
    }
    Ok(())
}

async fn run_stage(config: SweepConfig, stage: &dyn Stage) -> SweepSummary {
    let summary = SweepDriver::new(config).run(stage).await;
    info!(stage = stage.name(), "{}", summary);
    summary
}

/// Builds and validates the sweep configuration.
fn sweep_config(args: &SweepArgs, default_delay_secs: u64) -> Result<SweepConfig, ConfigError> {
    let mut config = SweepConfig::new(&args.root).with_delay(Duration::from_secs(
        args.delay_secs.unwrap_or(default_delay_secs),
    ));
    if let Some(ref tasks) = args.tasks {
        config = config.with_tasks(parse_task_list(tasks)?);
    }
    config.validate()?;
    Ok(config)
}

fn evaluation_policy(evaluator: &str, skip_on_edit: &[String]) -> EvaluationPolicy {
    let skip = skip_on_edit
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    EvaluationPolicy::new(evaluator).with_skip_on_edit(skip)
}

fn build_llm_client(args: &LlmArgs) -> anyhow::Result<LiteLlmClient> {
    let resolved_api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("LITELLM_API_KEY").ok())
        .filter(|k| !k.trim().is_empty());

    let Some(key) = resolved_api_key else {
        anyhow::bail!(
            "No API key configured. Please provide --api-key or set OPENROUTER_API_KEY/LITELLM_API_KEY env var."
        );
    };

    info!(model = %args.model, base_url = %args.base_url, "Using chat completions backend");
    let client = LiteLlmClient::new(
        args.base_url.clone(),
        Some(key),
        args.model.clone(),
        Duration::from_secs(args.timeout_secs),
    )?
    .with_max_attempts(args.max_attempts);
    Ok(client)
}

/// A backend name becomes a file stem inside `model_output/`.
fn validate_backend_name(name: &str) -> Result<(), ConfigError> {
    let message = if name.trim().is_empty() {
        "backend name cannot be empty"
    } else if name.contains(['/', '\\']) || name == "." || name == ".." {
        "backend name cannot contain path separators or be '.'/'..'"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidValue {
        key: "backend".to_string(),
        message: message.to_string(),
    })
}

fn build_generation_backend(args: &GenerateArgs) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    validate_backend_name(&args.backend)?;

    let backend: Arc<dyn GenerationBackend> = match args.kind {
        BackendKind::Chat => {
            Arc::new(build_llm_client(&args.llm)?.with_backend_name(args.backend.clone()))
        }
        BackendKind::OpenaiImages => {
            let key = args.openai_api_key.clone().ok_or_else(|| {
                ConfigError::MissingEnvVar("OPENAI_API_KEY (or --openai-api-key)".to_string())
            })?;
            let mut images = OpenAiImagesBackend::new(
                args.backend.clone(),
                key,
                Duration::from_secs(args.llm.timeout_secs),
            )?
            .with_model(args.image_model.clone());
            if let Some(ref size) = args.size {
                images = images.with_size(size.clone());
            }
            Arc::new(images)
        }
        BackendKind::Command => {
            let program = args.command.clone().ok_or_else(|| ConfigError::InvalidValue {
                key: "command".to_string(),
                message: "--command is required for --kind command".to_string(),
            })?;
            Arc::new(
                CommandBackend::new(args.backend.clone(), program)
                    .with_args(args.command_args.clone())
                    .with_timeout(Duration::from_secs(args.command_timeout_secs)),
            )
        }
    };

    info!(backend = backend.name(), kind = ?args.kind, "Using generation backend");
    Ok(backend)
}
