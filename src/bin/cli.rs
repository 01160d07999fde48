//! Ticket Crawler CLI
//!
//! Local execution entry point, meant to be run on a schedule.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ticket_crawler::{
    error::{AppError, Result},
    models::{Config, SourceMode},
    pipeline,
    services::TicketFetcher,
    storage::LocalStorage,
    utils::{LogReporter, Reporter, http},
};

/// Ticket Crawler - incremental civic ticket store
#[derive(Parser, Debug)]
#[command(
    name = "ticket-crawler",
    version,
    about = "Incrementally crawls civic tickets into a de-duplicated local store"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a window around the newest known id and merge it into the store
    Update {
        /// Anchor id used when the store is empty
        #[arg(long)]
        anchor: Option<u64>,

        /// Ids to revisit below the anchor
        #[arg(long, allow_negative_numbers = true)]
        look_back: Option<i64>,

        /// Ids to probe above the anchor
        #[arg(long, allow_negative_numbers = true)]
        look_ahead: Option<i64>,

        /// Fetch source: auto, api or web
        #[arg(long)]
        source: Option<SourceMode>,

        /// Store file (overrides config)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Directory of `<id>.json` seed files
        #[arg(long)]
        seed_dir: Option<PathBuf>,

        /// Do not archive the raw crawl as a snapshot
        #[arg(long)]
        no_archive: bool,
    },

    /// Download the full ticket list and merge it into the store
    Refresh {
        /// Store file (overrides config)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Do not archive the raw list as a snapshot
        #[arg(long)]
        no_archive: bool,
    },

    /// Fetch a single ticket and print it as JSON
    Fetch {
        id: u64,

        /// Fetch source: auto, api or web
        #[arg(long)]
        source: Option<SourceMode>,

        /// Indent the output
        #[arg(long)]
        pretty: bool,
    },

    /// Rebuild a store from a directory of snapshots or seed files
    Restore {
        /// Directory to replay, processed in file name order
        dir: PathBuf,

        /// Store to start from
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Output path (default: the configured store)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Keep only cycling-related tickets
        #[arg(long)]
        cycling_only: bool,
    },

    /// Validate configuration
    Validate,

    /// Show store and snapshot info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// File config, then `TICKETS_*` environment overrides.
fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path);
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let reporter = LogReporter;
    match run(cli, &reporter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e, &reporter),
    }
}

/// Log a fatal error with its display message.
fn report_failure(error: &AppError, reporter: &dyn Reporter) -> ExitCode {
    reporter.error(&error.to_string());
    ExitCode::FAILURE
}

async fn run(cli: Cli, reporter: &dyn Reporter) -> Result<()> {
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Command::Update {
            anchor,
            look_back,
            look_ahead,
            source,
            store,
            seed_dir,
            no_archive,
        } => {
            if anchor.is_some() {
                config.crawl.anchor_override = anchor;
            }
            if let Some(look_back) = look_back {
                config.crawl.look_back = look_back;
            }
            if let Some(look_ahead) = look_ahead {
                config.crawl.look_ahead = look_ahead;
            }
            if let Some(source) = source {
                config.source.mode = source;
            }
            if let Some(store) = store {
                config.paths.store_file = store;
            }
            if seed_dir.is_some() {
                config.crawl.seed_dir = seed_dir;
            }
            if no_archive {
                config.output.archive_raw = false;
            }
            config.validate()?;

            let client = http::create_async_client(&config.http)?;
            let fetcher = TicketFetcher::from_config(&config, client)?;
            let storage = LocalStorage::new(config.store_path());
            pipeline::run_update(&config, &fetcher, &storage, reporter).await?;
        }

        Command::Refresh { store, no_archive } => {
            if let Some(store) = store {
                config.paths.store_file = store;
            }
            if no_archive {
                config.output.archive_raw = false;
            }
            config.validate()?;

            let client = http::create_async_client(&config.http)?;
            let storage = LocalStorage::new(config.store_path());
            pipeline::run_refresh(&config, &client, &storage, reporter).await?;
        }

        Command::Fetch { id, source, pretty } => {
            config.validate()?;
            let mode = source.unwrap_or(config.source.mode);
            let client = http::create_async_client(&config.http)?;
            let fetcher = TicketFetcher::for_mode(&config, mode, client)?;

            let fetched = fetcher.fetch(id, reporter).await?;
            reporter.debug(&format!("ticket {id} fetched via {}", fetched.source));
            let json = if pretty {
                serde_json::to_string_pretty(&fetched.payload)?
            } else {
                serde_json::to_string(&fetched.payload)?
            };
            println!("{json}");
        }

        Command::Restore {
            dir,
            seed,
            output,
            cycling_only,
        } => {
            if !dir.is_dir() {
                return Err(AppError::config(format!(
                    "restore directory {} does not exist",
                    dir.display()
                )));
            }
            let output = output.unwrap_or_else(|| config.store_path());
            pipeline::run_restore(&dir, seed.as_deref(), &output, cycling_only, reporter)
                .await?;
        }

        Command::Validate => {
            reporter.info("Validating configuration...");
            config.validate()?;
            reporter.summary(
                "Effective configuration",
                &[
                    ("config file", cli.config.display().to_string()),
                    ("source mode", config.source.mode.to_string()),
                    ("api", config.source.api_url()?.to_string()),
                    ("web", config.source.web_url()?.to_string()),
                    ("look back", config.crawl.look_back.to_string()),
                    ("look ahead", config.crawl.look_ahead.to_string()),
                    (
                        "failure threshold",
                        config.crawl.failure_threshold.to_string(),
                    ),
                    ("store", config.store_path().display().to_string()),
                    ("snapshots", config.snapshot_dir().display().to_string()),
                    ("archive raw", config.output.archive_raw.to_string()),
                    ("write subset", config.output.write_subset.to_string()),
                ],
            );
            reporter.info("All validations passed!");
        }

        Command::Info => {
            config.validate()?;
            let info = pipeline::inspect_store(&config, reporter).await?;
            pipeline::report_store_info(&info, reporter);
        }
    }

    Ok(())
}
