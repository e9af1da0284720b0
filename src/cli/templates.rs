use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::generator::Category;
use crate::prompt::{TemplateEntry, TemplateRegistry};

/// List registry templates, or the bundled prompts when no template
/// directory is configured.
pub fn run(
    templates_override: Option<String>,
    config_path: Option<String>,
    category: Option<String>,
) -> Result<Vec<TemplateEntry>> {
    let config = Config::load_with_path(config_path)?;
    let template_dir = templates_override
        .map(PathBuf::from)
        .or(config.generation.template_dir);

    let entries = match template_dir {
        Some(dir) => {
            info!("Listing templates under {}", dir.display());
            let registry = TemplateRegistry::load(&dir)
                .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
            registry.list(category.as_deref())
        }
        None => {
            info!("No template directory configured, listing bundled prompts");
            bundled(category.as_deref())
        }
    };

    for entry in &entries {
        println!(
            "{}/{} v{} ({} bytes)",
            entry.category,
            entry.name,
            entry.version,
            entry.content.len()
        );
    }
    Ok(entries)
}

fn bundled(category: Option<&str>) -> Vec<TemplateEntry> {
    Category::ALL
        .iter()
        .filter(|c| category.is_none_or(|wanted| wanted == c.as_str()))
        .map(|c| TemplateEntry {
            category: c.as_str().to_string(),
            name: "default".to_string(),
            version: 1,
            content: c.default_template().to_string(),
        })
        .collect()
}
