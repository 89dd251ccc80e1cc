mod commands;
mod fetcher;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "tfe-coverage")]
#[command(about = "Compare live Azure resources against Terraform Enterprise state", long_about = None)]
struct Cli {
    /// Config file (default: discovered coverage.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the coverage report
    Report(commands::report::ReportArgs),
    /// Inspect or delete the inventory cache
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Manage the primary resource type list
    #[command(subcommand)]
    ResourceTypes(ResourceTypesCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached snapshots
    Show,
    /// Delete the cache file
    Clear,
}

#[derive(Subcommand)]
enum ResourceTypesCommands {
    /// Generate PRIMARY_RESOURCE_TYPES.json from a provider listing
    Generate {
        /// `az provider list` JSON output
        #[arg(long, value_name = "FILE")]
        providers: PathBuf,
        /// Output file
        #[arg(short, long, default_value = "PRIMARY_RESOURCE_TYPES.json")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn print_error(err: &anyhow::Error) {
    let message = err.to_string();
    eprintln!("{} {}", "Error:".red().bold(), message);
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            eprintln!("  caused by: {}", cause);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Version => {
            println!("tfe-coverage {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Report(args) => {
            let config = tfe_coverage_config::load_config(cli.config.as_deref())?;
            commands::report::handle(&config, args)
        }
        Commands::Cache(CacheCommands::Show) => {
            let config = tfe_coverage_config::load_config(cli.config.as_deref())?;
            commands::cache::handle_show(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache(CacheCommands::Clear) => {
            let config = tfe_coverage_config::load_config(cli.config.as_deref())?;
            commands::cache::handle_clear(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ResourceTypes(ResourceTypesCommands::Generate { providers, output }) => {
            commands::resource_types::handle_generate(&providers, &output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            print_error(&err);
            ExitCode::FAILURE
        }
    }
}
