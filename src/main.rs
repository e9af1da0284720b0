use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aitestgen::cli;

#[derive(Parser)]
#[command(name = "aitestgen", version)]
#[command(about = "Generate API test suites from an OpenAPI specification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate test suites for a specification
    Generate {
        /// Path to the specification (.json, .yaml or .yml)
        #[arg(long)]
        spec: String,

        /// Test categories: functional, security, performance, e2e
        #[arg(
            long = "test-types",
            num_args = 1..,
            value_delimiter = ',',
            default_value = "functional"
        )]
        test_types: Vec<String>,

        /// Directory for generated test files and report.json
        #[arg(short = 'o', long)]
        output_dir: Option<String>,

        /// Path to config file (defaults to ./aitestgen.toml or ~/.config/aitestgen/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Override LLM model (e.g., "gpt-4-turbo", "claude-sonnet-4-5-20250929")
        #[arg(long)]
        model: Option<String>,

        /// Override LLM provider (openai, anthropic, gemini, openai-compatible)
        #[arg(long)]
        provider: Option<String>,

        /// Directory of versioned prompt templates
        #[arg(long)]
        templates: Option<String>,

        /// Generate categories concurrently
        #[arg(long)]
        parallel: bool,

        /// Use mock LLM client for testing
        #[arg(long)]
        dry_run: bool,
    },

    /// List available prompt templates
    Templates {
        /// Directory of versioned prompt templates
        #[arg(long)]
        templates: Option<String>,

        /// Only list one category
        #[arg(long)]
        category: Option<String>,

        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            spec,
            test_types,
            output_dir,
            config,
            model,
            provider,
            templates,
            parallel,
            dry_run,
        } => {
            cli::generate::run(
                spec, test_types, output_dir, config, model, provider, templates, parallel,
                dry_run,
            )
            .await?;
        }
        Commands::Templates {
            templates,
            category,
            config,
        } => {
            cli::templates::run(templates, config, category)?;
        }
    }

    Ok(())
}
