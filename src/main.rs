//! fleet-sync: clone and refresh every repository of an organization
//! Runs are checkpointed so an interrupted or partially failed run can be resumed.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fleet_sync::commands::bulk::{BulkSync, BulkSyncOptions};
use fleet_sync::commands::state::{clean_all, clean_state, list_states, show_state};
use fleet_sync::core::{cancel_on_ctrl_c, cancel_pair, DisplayMode, SyncConfig, SyncError};
use fleet_sync::git::RepoExecutor;
use fleet_sync::pool::Strategy;
use fleet_sync::remote::{GitHubLister, RepositoryLister, RetryClient, StaticLister};
use fleet_sync::state::StateManager;
use fleet_sync::utils::set_terminal_title;

const DEFAULT_LOG_FILTER: &str = "info,fleet_sync=info";
const VERBOSE_LOG_FILTER: &str = "info,fleet_sync=debug";

// Process exit codes
const EXIT_RUN_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "fleet-sync", version, about = "Resumable bulk clone and refresh of an organization's repositories")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/fleet-sync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Checkpoint directory (defaults to the user data directory)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone missing repositories and refresh existing ones
    Sync(SyncArgs),
    /// Inspect or remove run checkpoints
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Organization to sync
    #[arg(long)]
    org: String,

    /// Directory the repositories live in
    #[arg(long, default_value = ".")]
    target: PathBuf,

    /// How existing repositories are refreshed: pull, fetch or reset
    #[arg(long, default_value = "pull")]
    strategy: Strategy,

    /// Base number of concurrent clones
    #[arg(short = 'j', long)]
    parallel: Option<usize>,

    /// Retries per API request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Continue from the saved checkpoint
    #[arg(long)]
    resume: bool,

    /// On resume, leave previously failed repositories alone
    #[arg(long)]
    skip_failed: bool,

    /// Progress output: quiet, compact or detailed
    #[arg(long, default_value = "compact")]
    display: DisplayMode,

    /// API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Sync exactly these repositories instead of listing the organization
    #[arg(long, value_delimiter = ',')]
    repos: Option<Vec<String>>,
}

#[derive(Subcommand)]
enum StateCommand {
    /// List every checkpoint
    List,
    /// Show one checkpoint with its failures
    Show {
        #[arg(long)]
        org: String,
    },
    /// Delete one checkpoint, or all of them
    Clean {
        #[arg(long, required_unless_present = "all")]
        org: Option<String>,
        #[arg(long, conflicts_with = "org")]
        all: bool,
    },
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load_from_path(path),
        None => SyncConfig::load(),
    }
}

async fn handle_sync_command(config: SyncConfig, args: SyncArgs) -> Result<()> {
    let mut retry = config.retry.clone();
    if let Some(max_retries) = args.max_retries {
        retry.max_retries = max_retries;
    }
    let client = Arc::new(
        RetryClient::new(&config.api_url, args.token.clone(), &retry)
            .context("failed to build API client")?,
    );

    let lister: Arc<dyn RepositoryLister> = match args.repos {
        Some(repos) => Arc::new(StaticLister::new(repos)),
        None => Arc::new(GitHubLister::new(Arc::clone(&client))),
    };
    let executor = Arc::new(RepoExecutor::from_config(&config, &args.org, Some(client)));

    let mut options = BulkSyncOptions::new(&args.target, &args.org)
        .strategy(args.strategy)
        .resume(args.resume)
        .retry_failed(!args.skip_failed)
        .display(args.display);
    options.parallelism = args.parallel;
    options.max_retries = args.max_retries;

    let (handle, cancel) = cancel_pair();
    cancel_on_ctrl_c(handle);

    set_terminal_title("🚀 fleet-sync");
    let result = BulkSync::new(config, lister, executor, cancel)
        .run_bulk_sync(options)
        .await;
    set_terminal_title("✅ fleet-sync");

    match result {
        Ok(_) => Ok(()),
        Err(err @ SyncError::Cancelled) => {
            eprintln!("{err}");
            std::process::exit(EXIT_CANCELLED);
        }
        Err(err @ SyncError::RunFailed { .. }) => {
            eprintln!("{err}");
            std::process::exit(EXIT_RUN_FAILED);
        }
        Err(err) => Err(err.into()),
    }
}

fn handle_state_command(config: &SyncConfig, command: StateCommand) -> Result<()> {
    let provider = config.provider.as_str();
    let manager = StateManager::new(config.state_dir());
    match command {
        StateCommand::List => println!("{}", list_states(&manager)?),
        StateCommand::Show { org } => println!("{}", show_state(&manager, provider, &org)?),
        StateCommand::Clean { org, all } => {
            if all {
                let removed = clean_all(&manager)?;
                println!("Removed {removed} checkpoints");
            } else if let Some(org) = org {
                if clean_state(&manager, provider, &org)? {
                    println!("Removed checkpoint for {org}");
                } else {
                    println!("No checkpoint for {org}");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = load_config(cli.config.as_ref())?;
    if cli.state_dir.is_some() {
        config.state_dir = cli.state_dir;
    }

    match cli.command {
        Command::Sync(args) => handle_sync_command(config, args).await,
        Command::State { command } => handle_state_command(&config, command),
    }
}
