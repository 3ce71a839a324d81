// Entrypoint for the CLI.
// - Loads `.env` and the TOML settings, then sets up logging.
// - `publish` runs the whole workflow for one Markdown file.
// - `cache` inspects or prunes the media caches without touching the API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use wechat_draft_cli::api::MediaKind;
use wechat_draft_cli::cache::MediaCache;
use wechat_draft_cli::config::{credentials_from_env, load_env_file, Settings};
use wechat_draft_cli::media::{cache_key, CONTENT_IMAGE_CACHE_FILE, THUMB_CACHE_FILE};
use wechat_draft_cli::{logging, ui, PublishError, PublishOutcome, Publisher};

/// Publish Markdown articles to WeChat Official Account drafts.
#[derive(Parser, Debug)]
#[command(name = "wechat-draft", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the environment file holding the app credentials
    #[arg(long, global = true)]
    env: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a Markdown article as a draft
    Publish {
        /// Path to the input Markdown file
        markdown_file: PathBuf,

        /// Upload media and build the payload, but do not create the draft
        #[arg(long)]
        dry_run: bool,

        /// Write the draft payload JSON to this file (stdout for a dry run if unset)
        #[arg(long)]
        payload_out: Option<PathBuf>,

        /// Do not ask for confirmation before creating the draft
        #[arg(short, long)]
        yes: bool,
    },
    /// Inspect or prune the media caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// List cached media identifiers
    List,
    /// Forget the cached identifiers of one local file
    Forget { path: PathBuf },
    /// Forget everything
    Clear,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = {
        let _bootstrap = logging::bootstrap();
        load_env_file(cli.env.as_deref());
        Settings::load(cli.config.as_deref())?
    };
    logging::init(&settings.logging.level, settings.logging.log_file.as_deref());

    match cli.command {
        Commands::Publish {
            markdown_file,
            dry_run,
            payload_out,
            yes,
        } => {
            tracing::info!(file = %markdown_file.display(), "processing article");
            if let Err(err) = publish(&settings, &markdown_file, dry_run, payload_out, yes) {
                match err.downcast_ref::<PublishError>() {
                    Some(publish_err) => ui::print_failure(publish_err),
                    None => eprintln!("Error: {err:#}"),
                }
                tracing::error!("processing failed: {err:#}");
                std::process::exit(1);
            }
        }
        Commands::Cache { action } => run_cache_action(&settings, action)?,
    }
    Ok(())
}

fn publish(
    settings: &Settings,
    markdown_file: &std::path::Path,
    dry_run: bool,
    payload_out: Option<PathBuf>,
    yes: bool,
) -> anyhow::Result<()> {
    let credentials = credentials_from_env()?;
    let mut publisher = Publisher::new(settings, credentials)?;

    let prepared = ui::with_spinner("Uploading media...", || publisher.prepare(markdown_file))?;

    if dry_run || payload_out.is_some() {
        let json = serde_json::to_string_pretty(&prepared.payload)?;
        match &payload_out {
            Some(path) => std::fs::write(path, &json)
                .with_context(|| format!("failed to write payload to {}", path.display()))?,
            None => println!("{json}"),
        }
    }
    if dry_run {
        tracing::info!("dry run, draft not submitted");
        return Ok(());
    }

    if !ui::confirm_submission(&prepared, yes)? {
        ui::print_cancelled();
        return Ok(());
    }

    let draft_media_id = ui::with_spinner("Submitting draft...", || publisher.submit(&prepared))?;
    ui::print_success(&PublishOutcome {
        title: prepared.title,
        draft_media_id,
        thumb_media_id: prepared.thumb_media_id,
        uploads: prepared.uploads,
    });
    Ok(())
}

fn run_cache_action(settings: &Settings, action: CacheAction) -> anyhow::Result<()> {
    let dir = &settings.paths.cache_dir;
    let mut stores = [
        (MediaKind::Thumb, MediaCache::new(dir.join(THUMB_CACHE_FILE))),
        (MediaKind::ContentImage, MediaCache::new(dir.join(CONTENT_IMAGE_CACHE_FILE))),
    ];

    match action {
        CacheAction::List => {
            for (kind, cache) in stores.iter_mut() {
                let label = format!("{kind:?} ({})", cache.path().display());
                ui::print_cache_entries(&label, &cache.entries()?);
            }
        }
        CacheAction::Forget { path } => {
            let key = cache_key(&path)?;
            let mut removed = false;
            for (_, cache) in stores.iter_mut() {
                removed |= cache.remove(&key)?.is_some();
            }
            if removed {
                println!("Forgot {key}");
            } else {
                println!("{key} was not cached");
            }
        }
        CacheAction::Clear => {
            for (_, cache) in stores.iter_mut() {
                cache.clear()?;
            }
            println!("Media caches cleared");
        }
    }
    Ok(())
}
