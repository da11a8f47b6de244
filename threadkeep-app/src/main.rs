use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use threadkeep_app::{Renderer, SaveOutcome, Session, ThreadSource};
use threadkeep_common::observability::{LogConfig, init_logging};
use threadkeep_config::{
    ClientConfig, DEFAULT_CONFIG_FILE, ThreadkeepConfig, ThreadkeepConfigLoader,
};

#[derive(Parser)]
#[command(name = "threadkeep", version)]
#[command(about = "Save tweet links and read their threads from the terminal")]
struct Cli {
    /// YAML config file (defaults to ./threadkeep.yaml when present)
    #[arg(long, short = 'c', env = "THREADKEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy server
    Serve,

    /// Fetch tweets through the proxy and add them to the collection
    Save {
        /// Tweet URLs or ids
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// List saved tweets, newest first
    List {
        /// Print the items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the author's thread around a tweet
    Show {
        /// Tweet URL or id
        target: String,
        /// Ignore the thread cache
        #[arg(long)]
        refresh: bool,
        /// Wrap text at this many columns
        #[arg(long, default_value_t = 80)]
        width: usize,
    },

    /// Remove a saved tweet and its cached thread
    Remove {
        /// Tweet URL or id
        target: String,
    },

    /// Write the collection as JSON to a file or stdout
    Export { file: Option<PathBuf> },

    /// Merge a JSON export into the collection
    Import {
        file: PathBuf,
        /// Replace the collection instead of merging
        #[arg(long)]
        replace: bool,
    },

    /// Drop cached threads whose tweet is no longer saved
    Gc,

    /// Manage the provider API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a provider key locally
    Set { api_key: String },
    /// Upload the local key to the proxy
    Push,
    /// Download the key stored on the proxy
    Pull,
    /// Forget the local key
    Clear {
        /// Also delete the proxy's copy
        #[arg(long)]
        remote: bool,
    },
}

fn load_config(cli: &Cli) -> Result<ThreadkeepConfig> {
    let loader = ThreadkeepConfigLoader::new();
    let loader = match &cli.config {
        Some(path) => loader.with_file(path),
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE),
    };
    Ok(loader.load()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let serving = matches!(cli.command, Command::Serve);
    init_logging(LogConfig {
        app_name: if serving { "threadkeep-server" } else { "threadkeep" }.to_string(),
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.emit_stderr || cli.verbose,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;

    match cli.command {
        Command::Serve => threadkeep_server::serve(cfg.server).await,
        command => run_client(command, &cfg.client).await,
    }
}

async fn run_client(command: Command, config: &ClientConfig) -> Result<()> {
    let session = Session::open(config).await?;

    match command {
        Command::Serve => bail!("`serve` does not run against a client session"),
        Command::Save { urls } => {
            for outcome in session.save(&urls).await? {
                match outcome {
                    SaveOutcome::Saved(id) => println!("saved      {id}"),
                    SaveOutcome::AlreadySaved(id) => println!("kept       {id} (already saved)"),
                    SaveOutcome::NotFound(id) => println!("not found  {id}"),
                    SaveOutcome::Invalid { input, reason } => {
                        println!("skipped    {input}: {reason}")
                    }
                }
            }
        }
        Command::List { json } => {
            if json {
                println!("{}", session.export_json().await?);
            } else {
                let renderer = Renderer::default();
                let items = session.list().await?;
                if items.is_empty() {
                    println!("No saved tweets yet. Try `threadkeep save <url>`.");
                }
                for item in &items {
                    println!("{}", renderer.item_line(item));
                }
            }
        }
        Command::Show {
            target,
            refresh,
            width,
        } => {
            let view = session.show(&target, refresh).await?;
            print!("{}", Renderer::new(width).thread(&view.tweets));
            match view.source {
                ThreadSource::Cache => println!("\n(from cache)"),
                ThreadSource::StaleCache => println!("\n(proxy unreachable; showing cached copy)"),
                ThreadSource::Proxy if view.truncated => {
                    println!("\n(thread truncated at the page limit)")
                }
                ThreadSource::Proxy => {}
            }
            if !view.saved {
                println!("(not saved; `threadkeep save {}` keeps it)", view.tweet_id);
            }
        }
        Command::Remove { target } => {
            if session.remove(&target).await? {
                println!("removed {target}");
            } else {
                println!("{target} was not saved");
            }
        }
        Command::Export { file } => {
            let json = session.export_json().await?;
            match file {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    println!("exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Import { file, replace } => {
            let json = tokio::fs::read_to_string(&file).await?;
            let report = session.import_json(&json, replace).await?;
            println!(
                "imported: {} new, {} updated, {} skipped",
                report.inserted, report.updated, report.skipped
            );
        }
        Command::Gc => {
            let removed = session.gc().await?;
            println!("removed {removed} orphaned thread cache entries");
        }
        Command::Key { action } => match action {
            KeyAction::Set { api_key } => {
                session.set_local_key(&api_key).await?;
                println!("API key stored locally");
            }
            KeyAction::Push => {
                let at = session.push_key().await?;
                println!("API key pushed ({})", at.to_rfc3339());
            }
            KeyAction::Pull => {
                if session.pull_key().await? {
                    println!("API key pulled from the proxy");
                } else {
                    println!("the proxy has no API key for this account");
                }
            }
            KeyAction::Clear { remote } => {
                session.clear_key(remote).await?;
                println!("API key cleared");
            }
        },
    }

    session.store().close().await;
    Ok(())
}
