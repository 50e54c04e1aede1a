use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lede::api;
use lede::config::Config;
use lede::import::Importer;
use lede::storage::{Database, StorageError};
use lede::sync::{job, SyncEngine, SyncPhase};

#[derive(Parser, Debug)]
#[command(
    name = "lede",
    about = "Local-first sync client for self-hosted news services"
)]
struct Args {
    /// Path to the config file (defaults to ~/.config/lede/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass (performs initial sync when never completed)
    Sync,
    /// Background-job entry point; the exit code maps to the scheduler
    /// vocabulary (0 = success, 75 = retry, 1 = permanent failure)
    SyncJob,
    /// Import subscriptions from an OPML file
    Import {
        file: PathBuf,
    },
    /// Export subscriptions as OPML to stdout or a file
    Export {
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Subscribe to a feed
    Add {
        url: String,
    },
    /// Rename a feed
    Rename {
        id: i64,
        title: String,
    },
    /// Unsubscribe from a feed
    Delete {
        id: i64,
    },
    /// Mark an entry read (or unread with --unread)
    MarkRead {
        id: i64,
        #[arg(long)]
        unread: bool,
    },
    /// Mark every entry read, optionally scoped to one feed
    MarkAllRead {
        #[arg(long)]
        feed: Option<i64>,
    },
    /// Bookmark an entry (or unbookmark with --remove)
    Bookmark {
        id: i64,
        #[arg(long)]
        remove: bool,
    },
    /// Show cache counters and sync state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let db_path = config.resolved_database_path()?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::InstanceLocked) => {
            eprintln!("Error: another lede process has the cache locked. Close it and try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open cache: {}", e)),
    };

    let remote = api::connect(&config).await?;
    let engine = SyncEngine::new(db.clone(), remote.clone());

    match args.command {
        Command::Sync => {
            let conf = db.conf().await?;
            let printer = spawn_sync_progress_printer(&engine);
            let result = if conf.initial_sync_completed {
                engine.sync().await
            } else {
                engine.perform_initial_sync().await
            };
            printer.abort();
            match result {
                Ok(()) => {
                    let status = engine.status().await?;
                    println!(
                        "Synced: {} feeds, {} entries ({} unread)",
                        status.feeds, status.entries, status.unread
                    );
                }
                Err(e) => {
                    eprintln!("Sync failed: {e}");
                    std::process::exit(1);
                }
            }
        }

        Command::SyncJob => {
            let outcome = job::run(&engine).await;
            std::process::exit(outcome.exit_code());
        }

        Command::Import { file } => {
            let document = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let importer = Importer::new(db.clone(), remote);
            let mut progress_rx = importer.progress();
            let printer = tokio::spawn(async move {
                while progress_rx.changed().await.is_ok() {
                    let p = *progress_rx.borrow();
                    eprintln!("Imported {}/{}", p.imported, p.total);
                }
            });

            let result = importer
                .import_opml(&document)
                .await
                .context("Import aborted")?;
            printer.abort();

            println!(
                "Import finished: {} added, {} updated, {} failed",
                result.added, result.updated, result.failed
            );
            for error in &result.errors {
                eprintln!("  {error}");
            }
        }

        Command::Export { output } => {
            let document = lede::import::export_opml(&db).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, document)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => print!("{document}"),
            }
        }

        Command::Add { url } => {
            lede::util::validate_url(&url).context("Refusing to add feed")?;
            let id = engine.add_feed(&url).await?;
            println!("Added feed {id}");
        }

        Command::Rename { id, title } => {
            engine.rename_feed(id, &title).await?;
            println!("Renamed feed {id}");
        }

        Command::Delete { id } => {
            engine.delete_feed(id).await?;
            println!("Deleted feed {id}");
        }

        Command::MarkRead { id, unread } => {
            engine.mark_read(id, !unread).await?;
        }

        Command::MarkAllRead { feed } => {
            let changed = engine.mark_feed_read(feed).await?;
            println!("Marked {changed} entries read");
        }

        Command::Bookmark { id, remove } => {
            engine.mark_bookmarked(id, !remove).await?;
        }

        Command::Status => {
            let status = engine.status().await?;
            println!("Initial sync completed: {}", status.initial_sync_completed);
            println!("Last sync watermark:    {}", status.last_sync);
            println!("Feeds:                  {}", status.feeds);
            println!("Entries:                {}", status.entries);
            println!("Unread:                 {}", status.unread);
            println!("Pending flag pushes:    {}", status.pending_flags);
        }
    }

    Ok(())
}

/// Print initial-sync progress lines while a sync runs; aborted when the
/// operation returns.
fn spawn_sync_progress_printer(engine: &SyncEngine) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.progress();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let p = *rx.borrow();
            if p.phase == SyncPhase::InitialSync {
                eprintln!("Initial sync: {} entries", p.entries_synced);
            }
        }
    })
}
