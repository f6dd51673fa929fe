//! metaeval: generate model responses for meta-evaluation datasets.
//! Entry point for the command line binary.

mod config;
mod selector;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use metaeval_data::{load_dataset, write_responses, ResponseFile};
use metaeval_llm::ModelFamily;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "metaeval", version)]
#[command(about = "Generate responses from OpenAI, Anthropic, Google or local models for evaluation datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one response per dataset instance
    Generate(GenerateArgs),

    /// Check dataset files against the dataset schema
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Dataset JSON file
    #[arg(long)]
    dataset: PathBuf,

    /// Where to write the responses
    #[arg(short, long)]
    output: PathBuf,

    /// Path to configuration file
    #[arg(short, long, env = "METAEVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Model identifier (overrides run.model)
    #[arg(short, long)]
    model: Option<String>,

    /// Backend family, bypassing identifier matching (openai, anthropic, google, local)
    #[arg(long)]
    family: Option<ModelFamily>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    max_new_tokens: Option<u32>,

    #[arg(long)]
    system_prompt: Option<String>,

    /// Instance field holding the prompt text
    #[arg(long, default_value = "prompt")]
    prompt_field: String,
}

impl GenerateArgs {
    fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.run.model = Some(model.clone());
        }
        if let Some(family) = self.family {
            config.run.family = Some(family);
        }
        if let Some(batch_size) = self.batch_size {
            config.run.batch_size = batch_size;
        }
        if let Some(max_new_tokens) = self.max_new_tokens {
            config.run.max_new_tokens = max_new_tokens;
        }
        if let Some(system_prompt) = &self.system_prompt {
            config.run.system_prompt = Some(system_prompt.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("metaeval=info,warn")),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!("Could not read .env: {e}");
        }
    }

    match Cli::parse().command {
        Command::Generate(args) => generate(args).await.map(|()| ExitCode::SUCCESS),
        Command::Validate { files } => Ok(validate(&files)),
    }
}

async fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    info!("metaeval {}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);

    let dataset = load_dataset(&args.dataset)
        .with_context(|| format!("loading dataset {}", args.dataset.display()))?;
    let prompts = dataset.prompts(&args.prompt_field)?;

    let backend = selector::select_backend(&config).await?;
    let responses = backend
        .generate_responses(&prompts, config.run.batch_size, config.run.system_prompt.as_deref())
        .await?;

    let file = ResponseFile::new(
        backend.model_id(),
        config.run.system_prompt.clone(),
        backend.max_new_tokens(),
        &dataset.ids(),
        prompts,
        responses,
    )?;
    write_responses(&args.output, &file)
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!(
        family = backend.family().as_str(),
        responses = file.responses.len(),
        empty = file.empty_count(),
        output = %args.output.display(),
        "Run complete"
    );
    Ok(())
}

/// Validate every file, reporting each; fails if any file fails.
fn validate(files: &[PathBuf]) -> ExitCode {
    let mut failed = 0;
    for path in files {
        match load_dataset(path) {
            Ok(ds) => println!(
                "{}: ok ({} instances, {} annotations, first id {})",
                path.display(),
                ds.instances.len(),
                ds.annotations.len(),
                ds.first_id().map_or_else(|| "-".to_string(), |id| id.to_string()),
            ),
            Err(e) => {
                error!(path = %path.display(), "Validation failed: {e}");
                println!("{}: FAILED: {e}", path.display());
                failed += 1;
            }
        }
    }
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
