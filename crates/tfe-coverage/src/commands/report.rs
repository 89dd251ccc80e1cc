use crate::fetcher::ExportDirFetcher;
use anyhow::{Context, bail};
use clap::Args;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tfe_coverage_config::CoverageConfig;
use tfe_coverage_core::{
    CacheStore, CancelToken, CoverageError, CoverageRun, InventoryCache, NormalizationPolicy,
    Normalizer, ResourceTypeFilter, RunOutcome, RunStatus, Source,
};

const DEFAULT_REPORT_PATH: &str = "coverage-report.csv";

/// Exit status when a report was produced with skipped records or stale data
const EXIT_PARTIAL: u8 = 2;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Azure subscription to list (repeatable; overrides the config)
    #[arg(long = "cloud-scope", value_name = "SUBSCRIPTION")]
    pub cloud_scopes: Vec<String>,

    /// Terraform workspace to read (repeatable; overrides the config)
    #[arg(long = "iac-scope", value_name = "WORKSPACE")]
    pub iac_scopes: Vec<String>,

    /// Directory holding cloud/<scope>.json and iac/<scope>.json exports
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Report file (default: coverage-report.csv)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Build the report without writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore cached snapshots of the requested scopes
    #[arg(long)]
    pub refresh: bool,

    /// Fail on the first invalid record instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Use an expired snapshot when a fetch fails
    #[arg(long)]
    pub serve_stale: bool,

    /// Snapshot lifetime in seconds
    #[arg(long, value_name = "SECS")]
    pub ttl: Option<u64>,

    /// Neither read nor write the cache file
    #[arg(long)]
    pub no_cache: bool,

    /// PRIMARY_RESOURCE_TYPES.json to compare instead of the built-in list
    #[arg(long, value_name = "FILE", conflicts_with = "all_types")]
    pub resource_types: Option<PathBuf>,

    /// Compare every resource type
    #[arg(long)]
    pub all_types: bool,
}

/// Settings after merging flags over the config
struct Settings {
    cloud_scopes: Vec<String>,
    iac_scopes: Vec<String>,
    export_dir: PathBuf,
    output: PathBuf,
    ttl: Duration,
    serve_stale: bool,
    cache_path: Option<PathBuf>,
    normalizer: Normalizer,
}

fn resolve(config: &CoverageConfig, args: &ReportArgs) -> anyhow::Result<Settings> {
    let cloud_scopes = if args.cloud_scopes.is_empty() {
        config.cloud.scopes.clone()
    } else {
        args.cloud_scopes.clone()
    };
    if cloud_scopes.is_empty() {
        bail!(
            "No cloud scope given: pass --cloud-scope, set cloud.scopes in the config, or set {}",
            tfe_coverage_config::SUBSCRIPTION_ENV
        );
    }

    let iac_scopes = if args.iac_scopes.is_empty() {
        config.iac.workspaces.clone()
    } else {
        args.iac_scopes.clone()
    };
    if iac_scopes.is_empty() {
        tracing::warn!("No IaC workspace given, every cloud resource will be reported as unmanaged");
    }

    let Some(export_dir) = args.export_dir.clone().or_else(|| config.export_dir.clone()) else {
        bail!("No export directory given: pass --export-dir or set export_dir in the config");
    };

    let policy = if args.strict || config.normalization.strict {
        NormalizationPolicy::Strict
    } else {
        NormalizationPolicy::Lenient
    };
    let mut normalizer = Normalizer::new(policy);
    if !(args.all_types || config.resource_types.all_types) {
        let filter = match args.resource_types.as_ref().or(config.resource_types.file.as_ref()) {
            Some(path) => ResourceTypeFilter::from_file(path)?,
            None => ResourceTypeFilter::builtin(),
        };
        tracing::debug!(types = filter.len(), "Using resource type filter");
        normalizer = normalizer.with_type_filter(filter);
    }

    let cache_path = if args.no_cache || !config.cache.enabled {
        None
    } else {
        Some(config.cache_path()?)
    };

    Ok(Settings {
        cloud_scopes,
        iac_scopes,
        export_dir,
        output: args
            .output
            .clone()
            .or_else(|| config.report.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH)),
        ttl: Duration::from_secs(args.ttl.unwrap_or(config.cache.ttl_secs)),
        serve_stale: args.serve_stale || config.cache.serve_stale_on_error,
        cache_path,
        normalizer,
    })
}

pub fn handle(config: &CoverageConfig, args: ReportArgs) -> anyhow::Result<ExitCode> {
    let settings = resolve(config, &args)?;

    let store = settings.cache_path.as_ref().map(CacheStore::new);
    let cache = match &store {
        Some(store) => {
            let loaded = store.load();
            if let Some(diagnostic) = &loaded.diagnostic {
                eprintln!("{} {}", "⚠".yellow(), diagnostic);
            }
            loaded.cache
        }
        None => InventoryCache::new(),
    };
    let mut cache = cache.with_serve_stale_on_error(settings.serve_stale);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let run = CoverageRun::new(settings.cloud_scopes.clone(), settings.iac_scopes.clone())
        .with_ttl(settings.ttl)
        .with_refresh(args.refresh)
        .with_normalizer(settings.normalizer.clone());
    let cloud = ExportDirFetcher::new(&settings.export_dir, Source::Cloud);
    let iac = ExportDirFetcher::new(&settings.export_dir, Source::Iac);

    let result = run.execute(&mut cache, &cloud, &iac, &cancel);

    // snapshots fetched before a failure are still valid
    let cancelled = matches!(result, Err(CoverageError::Cancelled { .. }));
    if let Some(store) = store.as_ref().filter(|_| cache.is_dirty() && !cancelled) {
        if let Err(e) = store.save(&cache) {
            eprintln!("{} Failed to save cache {}: {}", "⚠".yellow(), store.path().display(), e);
        }
    }

    let outcome = result?;
    print_summary(&outcome);

    if args.dry_run {
        println!(
            "{} Dry run: report not written ({} rows)",
            "ℹ".blue(),
            outcome.report.rows.len()
        );
    } else {
        write_atomic(&settings.output, outcome.report.to_csv().as_bytes())
            .with_context(|| format!("Failed to write report {}", settings.output.display()))?;
        println!(
            "{} Report written to {}",
            "✓".green(),
            settings.output.display().to_string().cyan()
        );
    }

    Ok(match outcome.status() {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::PartialSuccess => ExitCode::from(EXIT_PARTIAL),
    })
}

fn print_summary(outcome: &RunOutcome) {
    let summary = &outcome.summary;
    println!("{}", "Coverage summary".bold());
    println!("  {:<20} {}", "MANAGED", summary.managed.to_string().green());
    println!(
        "  {:<20} {}",
        "UNMANAGED_IN_CLOUD",
        summary.unmanaged_in_cloud.to_string().yellow()
    );
    println!(
        "  {:<20} {}",
        "ORPHANED_IN_STATE",
        summary.orphaned_in_state.to_string().red()
    );
    println!("  {:<20} {}", "cloud resources", summary.total_cloud);
    println!("  {:<20} {}", "state resources", summary.total_iac);
    println!(
        "  {:<20} {}",
        "coverage",
        format!("{:.2}%", summary.coverage_percent()).bold()
    );

    let diagnostics = &outcome.diagnostics;
    if diagnostics.skipped > 0 {
        println!(
            "{} {} invalid record(s) skipped",
            "⚠".yellow(),
            diagnostics.skipped
        );
    }
    if diagnostics.malformed_tags > 0 {
        println!(
            "{} {} malformed tag(s) dropped",
            "⚠".yellow(),
            diagnostics.malformed_tags
        );
    }
    for key in &diagnostics.stale_scopes {
        println!("{} Stale snapshot used for {}", "⚠".yellow(), key);
    }
    if !diagnostics.cached_scopes.is_empty() {
        println!(
            "{} {} scope(s) served from cache",
            "ℹ".blue(),
            diagnostics.cached_scopes.len()
        );
    }
}

/// Write through a temporary file in the target directory, then rename into place
fn write_atomic(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut file = tempfile::NamedTempFile::new_in(&dir)?;
    file.write_all(content)?;
    file.flush()?;
    file.persist(path)?;
    Ok(())
}
