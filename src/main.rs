//! # Content Harvester CLI (`harvest`)
//!
//! The `harvest` binary drives the extraction pipeline: scrape a listing
//! page, unpack and extract an archive of documents, extract a single
//! file, list a folder, submit a manifest to a search index, or clear a
//! working folder.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest scrape` | Listing page → one record per item + manifest |
//! | `harvest archive <PATH\|URL>` | ZIP archive → one record per document + manifest |
//! | `harvest extract <FILE>` | Extract one file and print its record |
//! | `harvest list <DIR>` | Print the file descriptors of a folder |
//! | `harvest index <MANIFEST>` | Bulk-submit a manifest's records |
//! | `harvest clean <DIR>` | Remove a folder's contents |
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default); stdout is
//! reserved for command output.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use content_harvester::config::{self, Config};
use content_harvester::extract::{extract, ExtractOptions};
use content_harvester::files::{clear_dir_contents, describe_file, list_files};
use content_harvester::models::{MediaKind, SourceItem};
use content_harvester::normalize::{normalize_document, RunContext};
use content_harvester::pipeline::{index_manifest, Pipeline, RunReport};
use content_harvester::progress::ProgressMode;
use content_harvester::sink::ElasticsearchClient;

/// Content Harvester CLI: turns listing pages and document archives into
/// normalized JSON records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Content Harvester: listing pages and document archives to normalized JSON records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a listing page into records and a combined manifest.
    Scrape {
        /// Listing URL. Defaults to `[scrape].start_url`.
        #[arg(long)]
        url: Option<String>,
        /// Output folder. Defaults to `[output].dir`.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Translate titles and sections (overrides `[translation].enabled`).
        #[arg(long)]
        translate: bool,
    },

    /// Extract a ZIP archive (local path or URL) and every document in it.
    Archive {
        /// Path or http(s) URL of the archive.
        source: String,
        /// Extraction folder. Defaults to `[archive].dest`.
        #[arg(long)]
        dest: Option<PathBuf>,
        /// Output folder for records. Defaults to `[output].dir`.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Run OCR on PDFs without a text layer.
        #[arg(long)]
        ocr: bool,
    },

    /// Extract a single file and print its record as JSON.
    Extract {
        file: PathBuf,
        #[arg(long)]
        ocr: bool,
    },

    /// List the files of a folder as JSON.
    List {
        dir: PathBuf,
        /// Only include these extensions (repeatable).
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },

    /// Submit the records of a manifest to the configured index.
    Index {
        manifest: PathBuf,
        /// Index name. Defaults to `[index].index_name`.
        #[arg(long)]
        index: Option<String>,
    },

    /// Remove everything inside a folder, keeping the folder.
    Clean { dir: PathBuf },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::minimal())
    }
}

/// Cancels `token` on Ctrl-C so the run stops between items.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing current item");
            token.cancel();
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("processed: {}", report.processed);
    println!("persisted: {}", report.persisted);
    println!("skipped: {}", report.skipped);
    if let Some(manifest) = &report.manifest {
        println!("manifest: {}", manifest.display());
    }
    if !report.errors.is_empty() {
        println!("errors:");
        for error in &report.errors {
            println!("  {}", error);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::List { dir, extensions } => {
            let filter = (!extensions.is_empty()).then_some(extensions.as_slice());
            let files = list_files(dir, filter)?;
            return print_json(&files);
        }
        Commands::Clean { dir } => {
            clear_dir_contents(dir)?;
            println!("cleared {}", dir.display());
            return Ok(());
        }
        _ => {}
    }

    let mut cfg = load_or_default(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Scrape {
            url,
            out,
            translate,
        } => {
            if translate {
                cfg.translation.enabled = true;
            }
            let url = url.unwrap_or_else(|| cfg.scrape.start_url.clone());
            let out = out.unwrap_or_else(|| cfg.output.dir.clone());
            let mut pipeline = Pipeline::new(cfg)?.with_progress(progress.reporter());
            cancel_on_ctrl_c(pipeline.cancellation_token());

            let collected = pipeline.scrape_listing(&url).await?;
            tracing::info!(collected, url = %url, "scrape complete");
            let report = pipeline.finish(&out)?;
            print_report(&report);
        }
        Commands::Archive {
            source,
            dest,
            out,
            ocr,
        } => {
            let dest = dest.unwrap_or_else(|| cfg.archive.dest.clone());
            let out = out.unwrap_or_else(|| cfg.output.dir.clone());

            let mut pipeline = Pipeline::new(cfg)?.with_progress(progress.reporter());
            cancel_on_ctrl_c(pipeline.cancellation_token());

            pipeline.process_archive(&source, &dest, ocr).await?;
            let report = pipeline.finish(&out)?;
            print_report(&report);
        }
        Commands::Extract { file, ocr } => {
            let descriptor = describe_file(&file)?;
            let kind = MediaKind::from_extension(&descriptor.extension).with_context(|| {
                format!("no extractor for file extension '{}'", descriptor.extension)
            })?;
            let options = ExtractOptions {
                ocr,
                ocr_config: cfg.ocr.clone(),
            };
            let extraction = extract(SourceItem::from_path(&file, kind), &options).await;
            let ctx = RunContext::now(cfg.archive.source_label.clone());
            print_json(&normalize_document(&descriptor, extraction, &ctx))?;
        }
        Commands::Index { manifest, index } => {
            let client = ElasticsearchClient::from_config(&cfg.index)?;
            if !client.ping().await {
                anyhow::bail!("index at {:?} is not reachable", cfg.index.url);
            }
            let index = index.unwrap_or_else(|| cfg.index.index_name.clone());
            let report = index_manifest(&client, &manifest, &index).await?;
            print_json(&report)?;
            if let Some(err) = report.partial_failure() {
                tracing::warn!(error = %err, "partial indexing failure");
            }
        }
        Commands::List { .. } | Commands::Clean { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
