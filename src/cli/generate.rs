use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::client::LlmClient;
use crate::llm::factory;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::prompt::TemplateRegistry;
use crate::spec::UnifiedSpec;
use crate::util::SecretString;

pub const REPORT_FILE: &str = "report.json";

#[allow(clippy::too_many_arguments)]
pub async fn run(
    spec_path: String,
    test_types: Vec<String>,
    output_dir_override: Option<String>,
    config_path: Option<String>,
    model_override: Option<String>,
    provider_override: Option<String>,
    templates_override: Option<String>,
    parallel: bool,
    dry_run: bool,
) -> Result<RunReport> {
    info!("Specification: {}", spec_path);
    if let Some(ref cfg) = config_path {
        info!("Config: {}", cfg);
    }
    info!("Dry run: {}", dry_run);

    let mut config = Config::load_with_path(config_path)?;

    if let Some(ref provider) = provider_override {
        info!("CLI override: provider = {}", provider);
        config.llm.provider = provider.clone();
    }
    if let Some(ref model) = model_override {
        info!("CLI override: model = {}", model);
        config.llm.model = model.clone();
    }
    if let Some(ref dir) = output_dir_override {
        info!("CLI override: output_dir = {}", dir);
        config.generation.output_dir = PathBuf::from(dir);
    }
    if let Some(ref dir) = templates_override {
        info!("CLI override: template_dir = {}", dir);
        config.generation.template_dir = Some(PathBuf::from(dir));
    }
    if parallel {
        info!("CLI override: parallel = true");
        config.generation.parallel = true;
    }

    // Unreadable or unparseable specs abort before any generation
    let spec = UnifiedSpec::load(&spec_path)
        .with_context(|| format!("Failed to load specification file: {}", spec_path))?;
    info!(
        "Loaded spec '{}' v{} with {} endpoints",
        spec.title,
        spec.version,
        spec.endpoints.len()
    );
    if spec.endpoints.is_empty() {
        warn!("Specification declares no endpoints");
    }

    let api_key = if dry_run {
        SecretString::default()
    } else {
        SecretString::new(config.get_api_key()?)
    };
    let client: Arc<dyn LlmClient> =
        Arc::from(factory::create_client(&config.llm, api_key, dry_run)?);

    let mut orchestrator = Orchestrator::new(client, spec)
        .with_options(config.completion_options())
        .with_output_dir(&config.generation.output_dir)
        .with_parallel(config.generation.parallel);

    if let Some(ref dir) = config.generation.template_dir {
        let registry = TemplateRegistry::load(dir)
            .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
        orchestrator =
            orchestrator.with_registry(Arc::new(registry), &config.generation.template_name);
    }

    let report = orchestrator.run(&test_types).await;

    fs::create_dir_all(&config.generation.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.generation.output_dir.display()
        )
    })?;
    let report_path = config.generation.output_dir.join(REPORT_FILE);
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    info!("Report written to {}", report_path.display());

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &RunReport) {
    for result in report.results.values() {
        let status = if let Some(ref e) = result.generation_error {
            format!("FAILED: {}", e)
        } else {
            let mut notes = Vec::new();
            if result.syntax_errors.is_some() {
                notes.push("syntax errors".to_string());
            }
            if result.spec_compliance_errors.is_some() {
                notes.push("missing endpoints".to_string());
            }
            if !result.security_issues.is_empty() {
                notes.push(format!("{} security findings", result.security_issues.len()));
            }
            if notes.is_empty() {
                "ok".to_string()
            } else {
                notes.join(", ")
            }
        };
        let path = result
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:>3} tests  {:<40} {}",
            result.category.as_str(),
            result.test_names().len(),
            path,
            status
        );
    }
    for tag in &report.skipped {
        println!("{:<12} skipped (unknown test type)", tag);
    }
}
