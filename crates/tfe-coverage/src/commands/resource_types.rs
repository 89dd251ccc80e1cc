use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use tfe_coverage_core::{ProviderNamespace, collect_resource_types, filter_primary_resource_types};

pub fn handle_generate(providers: &Path, output: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(providers)
        .with_context(|| format!("Failed to read {}", providers.display()))?;
    let listing: Vec<ProviderNamespace> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse provider listing {}", providers.display()))?;

    let all_types = collect_resource_types(&listing);
    let primary = filter_primary_resource_types(&all_types);
    if primary.is_empty() {
        anyhow::bail!("No primary resource types found in {}", providers.display());
    }

    let json = serde_json::to_string_pretty(&primary)?;
    std::fs::write(output, json + "\n")
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} {} of {} resource types written to {}",
        "✓".green(),
        primary.len(),
        all_types.len(),
        output.display().to_string().cyan()
    );
    Ok(())
}
