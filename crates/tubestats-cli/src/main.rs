#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tubestats_core::config::{ConfigLayer, resolve_config};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tstats: like/view history for a video platform",
    long_about = None
)]
struct Cli {
    /// Enable debug logging unless TUBESTATS_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Data folder (overrides config files and TUBESTATS_DATA_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }

    /// Config layer carrying the flags that override file and env settings.
    fn config_layer(&self) -> ConfigLayer {
        ConfigLayer {
            data_dir: self.data_dir.clone(),
            ..ConfigLayer::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Collection",
        about = "Import a collected listing",
        long_about = "Store raw listing pages as the day file of the collection time, then reconcile catalog, deletions and time series.",
        after_help = "EXAMPLES:\n    # Import two pages collected now\n    tstats import --page p1.json --page p2.json --server-version 6.0.2\n\n    # Import a listing collected on a past day\n    tstats import --page p1.json --server-version 6.0.2 --at 2024-03-05"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Collection",
        about = "Reconcile a day file already on disk",
        long_about = "Re-run reconciliation for a day whose raw file was written but not reconciled.",
        after_help = "EXAMPLES:\n    # Retry the import of 5 March\n    tstats reconcile --day 2024-03-05"
    )]
    Reconcile(cmd::reconcile::ReconcileArgs),

    #[command(
        next_help_heading = "Read",
        about = "List every known video",
        long_about = "List every video ever collected with its latest counters and deletion state.",
        after_help = "EXAMPLES:\n    # List videos\n    tstats list\n\n    # Emit machine-readable output\n    tstats list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one video",
        long_about = "Show the last known metadata of a video by its numeric id.",
        after_help = "EXAMPLES:\n    # Show video 12\n    tstats show 12\n\n    # Emit machine-readable output\n    tstats show 12 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Export bucketed stats of one video",
        long_about = "Resolve likes and views of a video at each bucket of a date range, with normalized percentages.",
        after_help = "EXAMPLES:\n    # Last seven days\n    tstats export 12\n\n    # Monthly buckets over a year\n    tstats export 12 --start 2023-01-01 --end 2023-12-01 --granularity monthly --json"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        next_help_heading = "Read",
        about = "Write the views report as CSV",
        long_about = "Build the views table of every video over a date range and write it as CSV.",
        after_help = "EXAMPLES:\n    # Print the report\n    tstats report\n\n    # Write views.csv into a folder\n    tstats report --granularity monthly --output reports/"
    )]
    Report(cmd::report::ReportArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Rebuild the time series",
        long_about = "Rebuild every time series from the raw day files and save it.",
        after_help = "EXAMPLES:\n    # Full rebuild\n    tstats rebuild\n\n    # Emit machine-readable output\n    tstats rebuild --json"
    )]
    Rebuild,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TUBESTATS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "tubestats=debug,tstats=debug,info"
        } else {
            "tubestats=info,tstats=info,warn"
        })
    });

    let format = env::var("TUBESTATS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    let config = match resolve_config(&cli.config_layer()) {
        Ok(config) => config,
        Err(err) => {
            output::render_failure(output, &err)?;
            std::process::exit(1);
        }
    };

    let command_result = match cli.command {
        Commands::Import(ref args) => cmd::import::run_import(args, output, config),
        Commands::Reconcile(ref args) => cmd::reconcile::run_reconcile(args, output, config),
        Commands::List(ref args) => cmd::list::run_list(args, output, config),
        Commands::Show(ref args) => cmd::show::run_show(args, output, config),
        Commands::Export(ref args) => cmd::export::run_export(args, output, config),
        Commands::Report(ref args) => cmd::report::run_report(args, output, config),
        Commands::Rebuild => cmd::rebuild::run_rebuild(output, config),
    };

    if let Err(err) = command_result {
        output::render_failure(output, &err)?;
        std::process::exit(1);
    }
    Ok(())
}
