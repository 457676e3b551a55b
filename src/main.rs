use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use feedhook::commands::{self, raw_feed::resolve_target, AddOptions};
use feedhook::{
    Configuration, Database, HookInvoker, HttpFetcher, ProcessRunner, Result, Updater,
};

#[derive(Debug, Parser)]
#[command(name = "feedhook", version)]
#[command(about = "Aggregate RSS/Atom feeds and run hooks on new items")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "feeds.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a template configuration and the item database
    Init,
    /// Fetch due feeds and run hooks for new items
    Update {
        /// Feed keys to update (default: all feeds)
        feeds: Vec<String>,
        /// Update feeds even if they are not due
        #[arg(short, long)]
        force: bool,
    },
    /// List feeds and their last update
    List {
        /// List the stored articles as well
        #[arg(short, long)]
        articles: bool,
    },
    /// Add feeds by URL
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Add feeds whose URL is already configured
        #[arg(short, long)]
        force: bool,
        /// Use the given URLs verbatim instead of following redirects
        #[arg(long)]
        no_redirect: bool,
        /// Append the new feeds to the configuration file
        #[arg(short, long)]
        write_config: bool,
    },
    /// Dump the parsed contents of a feed URL or configured feed
    RawFeed {
        feed: String,
        /// Dump all entries
        #[arg(short, long)]
        all: bool,
    },
}

/// Load the configuration and set up logging as it requests.
fn load_configuration(path: &Path) -> Result<Configuration> {
    let configuration = Configuration::load(path)?;
    let global = &configuration.config().global;
    let log_file = configuration.log_file();
    if let Err(e) = feedhook::logging::init(&global.log_level, log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        feedhook::logging::init_console_only(&global.log_level);
    }
    Ok(configuration)
}

async fn run(cli: Cli) -> Result<()> {
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Init => {
            feedhook::logging::init_console_only("info");
            commands::init(&cli.config, &mut stdout).await
        }
        Commands::Update { feeds, force } => {
            let configuration = load_configuration(&cli.config)?;
            let db = Database::open(configuration.database_file()).await?;
            let fetcher = HttpFetcher::new(&configuration.config().fetch)?;
            let timeout = Duration::from_secs(configuration.config().global.hook_timeout_secs);
            let hooks = HookInvoker::new(Arc::new(ProcessRunner::new(timeout)));

            let updater = Updater::new(&configuration, &db, &fetcher, hooks);
            updater.update(&feeds, force).await?;
            db.close().await;
            Ok(())
        }
        Commands::List { articles } => {
            let configuration = load_configuration(&cli.config)?;
            let db = Database::open(configuration.database_file()).await?;
            commands::list(&configuration, &db, articles, &mut stdout).await
        }
        Commands::Add {
            urls,
            force,
            no_redirect,
            write_config,
        } => {
            // Snippets can be printed without a configuration file.
            let configuration = if cli.config.exists() {
                Some(load_configuration(&cli.config)?)
            } else {
                feedhook::logging::init_console_only("info");
                None
            };
            let fetch_config = configuration
                .as_ref()
                .map(|c| c.config().fetch.clone())
                .unwrap_or_default();
            let fetcher = HttpFetcher::new(&fetch_config)?;
            let options = AddOptions {
                force,
                no_redirect,
                write_config,
            };
            commands::add_feeds(
                configuration.as_ref(),
                &fetcher,
                &urls,
                options,
                &mut stdout,
            )
            .await?;
            Ok(())
        }
        Commands::RawFeed { feed, all } => {
            let configuration = if feed.starts_with("http://") || feed.starts_with("https://") {
                feedhook::logging::init_console_only("info");
                None
            } else {
                Some(load_configuration(&cli.config)?)
            };
            let url = resolve_target(&feed, configuration.as_ref())?;
            let fetch_config = configuration
                .as_ref()
                .map(|c| c.config().fetch.clone())
                .unwrap_or_default();
            let fetcher = HttpFetcher::new(&fetch_config)?;
            commands::raw_feed(&fetcher, &url, all, &mut stdout).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("feedhook: {e}");
            ExitCode::FAILURE
        }
    }
}
