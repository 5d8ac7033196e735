//! # CLI Module
//!
//! Command-line interface for the media catalog.
//!
//! ## Usage
//! ```bash
//! # Catalog a directory tree
//! catalog sync ~/Pictures
//!
//! # With a configuration file and a custom catalog location
//! catalog --config catalog.json --data-dir /mnt/catalog sync
//!
//! # Duplicate sets, grouped by the perceptual fingerprint
//! catalog duplicates --by perceptual
//!
//! # JSON output
//! catalog duplicates --output json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use media_catalog::config::CatalogConfig;
use media_catalog::core::duplicates::{DuplicateGrouper, DuplicateSet};
use media_catalog::core::fingerprint::FingerprintKind;
use media_catalog::core::model::CatalogEntry;
use media_catalog::core::repository::Repository;
use media_catalog::core::storage::LocalStorage;
use media_catalog::core::sync::CatalogSynchronizer;
use media_catalog::error::{ConfigError, Result};
use media_catalog::events::{event_channel, Event, SyncEvent, SyncSummary};
use std::path::{Path, PathBuf};
use std::thread;

/// Media Catalog - catalog a media tree and find duplicates, even rotated ones
#[derive(Parser, Debug)]
#[command(name = "catalog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Catalog data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the catalog in line with a directory tree
    Sync {
        /// Directory to catalog (overrides the configured root)
        root: Option<PathBuf>,

        /// Maximum entries committed per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Fingerprints to compute (repeatable)
        #[arg(short, long)]
        fingerprint: Vec<Kind>,

        /// Include videos (needs a frame extractor; otherwise cataloged as corrupted)
        #[arg(long)]
        include_videos: bool,

        /// Include hidden files
        #[arg(long)]
        include_hidden: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// List duplicate sets in the catalog
    Duplicates {
        /// Fingerprint to group by (defaults to the configured one)
        #[arg(long)]
        by: Option<Kind>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Show catalog statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    /// Byte-identical files only
    Exact,
    /// Difference hash - rotation-tolerant (default)
    Difference,
    /// Perceptual hash - rotation-tolerant, DCT based
    Perceptual,
}

impl From<Kind> for FingerprintKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Exact => FingerprintKind::Exact,
            Kind::Difference => FingerprintKind::Difference,
            Kind::Perceptual => FingerprintKind::Perceptual,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (paths only)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    media_catalog::init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Sync {
            root,
            batch_size,
            fingerprint,
            include_videos,
            include_hidden,
            output,
        } => {
            if let Some(root) = root {
                config.root = root;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if !fingerprint.is_empty() {
                config.fingerprint.exact = false;
                config.fingerprint.difference = false;
                config.fingerprint.perceptual = false;
                for kind in &fingerprint {
                    config.fingerprint = config.fingerprint.group_by((*kind).into());
                }
                // Group by the first requested kind
                config.fingerprint.group_by = fingerprint[0].into();
            }
            config.include_videos |= include_videos;
            config.include_hidden |= include_hidden;
            run_sync(config, output)
        }
        Commands::Duplicates { by, output } => {
            let kind = by.map(Into::into).unwrap_or(config.fingerprint.group_by);
            run_duplicates(&config, kind, output)
        }
        Commands::Stats { output } => run_stats(&config, output),
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<CatalogConfig> {
    let mut config = match path {
        Some(path) => CatalogConfig::from_file(path)?,
        None => CatalogConfig::default(),
    };
    if data_dir.is_some() {
        config.data_dir = data_dir;
    }
    Ok(config)
}

fn open_repository(config: &CatalogConfig) -> Result<(LocalStorage, Repository)> {
    let storage = LocalStorage::new(config.data_root());
    let repository = Repository::open_with_backups(
        &Repository::catalog_directory(&storage),
        config.backups_to_keep,
    )?;
    Ok((storage, repository))
}

fn run_sync(config: CatalogConfig, output: OutputFormat) -> Result<()> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(
            "no root directory given; pass one or set \"root\" in the configuration".to_string(),
        )
        .into());
    }
    config.validate()?;

    let term = Term::stderr();
    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Media Catalog").bold().cyan(),
            style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let (storage, mut repository) = open_repository(&config)?;
    let synchronizer = CatalogSynchronizer::new(config, &storage);

    let (sender, receiver) = event_channel();

    // Progress bar for pretty output
    let progress = if matches!(output, OutputFormat::Pretty) {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress_clone else {
                continue;
            };
            match event {
                Event::Sync(SyncEvent::StateChanged { state }) => {
                    pb.set_message(state.to_string());
                }
                Event::Sync(SyncEvent::FolderClassified {
                    new,
                    modified,
                    renamed,
                    deleted,
                    ..
                }) => {
                    pb.inc_length((new + modified + renamed + deleted) as u64);
                }
                Event::Sync(SyncEvent::BatchCommitted(p)) => {
                    pb.inc(p.batch_size as u64);
                }
                Event::Sync(SyncEvent::EntryCorrupted { path, message }) => {
                    pb.println(format!(
                        "  {} {}: {}",
                        style("!").yellow(),
                        path.display(),
                        style(message).dim()
                    ));
                }
                Event::Sync(SyncEvent::Completed(_)) | Event::Sync(SyncEvent::Failed { .. }) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
        }
    });

    let result = synchronizer.run(&mut repository, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();

    let summary = result?;
    repository.close()?;

    match output {
        OutputFormat::Pretty => print_pretty_summary(&term, &summary),
        OutputFormat::Json | OutputFormat::Minimal => print_json(&summary),
    }

    Ok(())
}

fn print_pretty_summary(term: &Term, summary: &SyncSummary) {
    term.write_line(&format!("{} Sync Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    let lines = [
        ("folders scanned", summary.folders_scanned),
        ("added", summary.added),
        ("updated", summary.updated),
        ("renamed", summary.renamed),
        ("removed", summary.removed),
        ("unchanged", summary.unchanged),
    ];
    for (label, count) in lines {
        term.write_line(&format!("  {} {}", style(count).cyan(), label))
            .ok();
    }

    if summary.corrupted > 0 {
        term.write_line(&format!(
            "  {} corrupted (cataloged without fingerprints)",
            style(summary.corrupted).yellow()
        ))
        .ok();
    }
    if summary.skipped > 0 {
        term.write_line(&format!(
            "  {} skipped (unreadable)",
            style(summary.skipped).yellow()
        ))
        .ok();
    }

    term.write_line(&format!(
        "  {} in {:.1}s",
        style(format!("{} batches", summary.batches_committed)).dim(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();
}

fn run_duplicates(config: &CatalogConfig, kind: FingerprintKind, output: OutputFormat) -> Result<()> {
    let (_storage, repository) = open_repository(config)?;
    // Slots of a kind that was disabled hold the sentinel and would group together
    repository.require_fingerprints(kind)?;
    let sets = DuplicateGrouper::new(kind).find_duplicates(&repository);

    match output {
        OutputFormat::Pretty => print_pretty_sets(&Term::stdout(), &repository, &sets, kind),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "grouped_by": kind,
                "duplicate_sets": sets.len(),
                "duplicate_count": sets.iter().map(DuplicateSet::duplicate_count).sum::<usize>(),
                "potential_savings_bytes": sets.iter().map(DuplicateSet::reclaimable_bytes).sum::<u64>(),
                "sets": sets.iter().map(|set| {
                    serde_json::json!({
                        "fingerprint": set.fingerprint,
                        "reclaimable_bytes": set.reclaimable_bytes(),
                        "entries": set.entries.iter().map(|entry| {
                            serde_json::json!({
                                "path": entry_path(&repository, entry),
                                "file_size": entry.file_size,
                                "rotation": entry.rotation.degrees(),
                                "corrupted": entry.corrupted.set,
                            })
                        }).collect::<Vec<_>>(),
                    })
                }).collect::<Vec<_>>(),
            });
            print_json(&output);
        }
        OutputFormat::Minimal => {
            for set in &sets {
                for entry in set.entries.iter().skip(1) {
                    println!("{}", entry_path(&repository, entry).display());
                }
            }
        }
    }

    Ok(())
}

fn print_pretty_sets(
    term: &Term,
    repository: &Repository,
    sets: &[DuplicateSet],
    kind: FingerprintKind,
) {
    if sets.is_empty() {
        term.write_line(&format!(
            "  {} No duplicates found by {}",
            style("✓").green(),
            kind
        ))
        .ok();
        return;
    }

    let savings: u64 = sets.iter().map(DuplicateSet::reclaimable_bytes).sum();
    term.write_line(&format!(
        "{} duplicate sets by {}, {} potential space savings",
        style(sets.len()).cyan(),
        kind,
        style(format_bytes(savings)).yellow()
    ))
    .ok();
    term.write_line("").ok();

    for (i, set) in sets.iter().enumerate() {
        term.write_line(&format!(
            "  {} {} ({} files, {})",
            style(format!("Set {}:", i + 1)).bold(),
            style(&set.fingerprint).dim(),
            set.len(),
            format_bytes(set.reclaimable_bytes())
        ))
        .ok();

        for (idx, entry) in set.entries.iter().enumerate() {
            let marker = if idx == 0 {
                style("★").green().to_string()
            } else {
                style("○").dim().to_string()
            };
            let mut notes = Vec::new();
            if entry.rotated.set {
                notes.push(entry.rotation.to_string());
            }
            if entry.corrupted.set {
                notes.push("corrupted".to_string());
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!(" {}", style(format!("[{}]", notes.join(", "))).dim())
            };

            term.write_line(&format!(
                "    {} {}{}",
                marker,
                display_path(&entry_path(repository, entry)),
                notes
            ))
            .ok();
        }
        term.write_line("").ok();
    }

    term.write_line(&format!(
        "{}",
        style("Remember: No files were deleted. Review carefully before taking action.").dim()
    ))
    .ok();
}

fn run_stats(config: &CatalogConfig, output: OutputFormat) -> Result<()> {
    let (_storage, repository) = open_repository(config)?;
    let stats = repository.stats();

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            term.write_line(&format!(
                "{} {}",
                style("Catalog").bold(),
                style(repository.directory().display()).dim()
            ))
            .ok();
            term.write_line(&format!("  {} folders", style(stats.folders).cyan()))
                .ok();
            term.write_line(&format!(
                "  {} entries ({})",
                style(stats.entries).cyan(),
                format_bytes(stats.total_bytes)
            ))
            .ok();
            term.write_line(&format!("  {} rotated", style(stats.rotated).cyan()))
                .ok();
            term.write_line(&format!("  {} corrupted", style(stats.corrupted).yellow()))
                .ok();
        }
        OutputFormat::Json | OutputFormat::Minimal => print_json(&stats),
    }

    Ok(())
}

fn entry_path(repository: &Repository, entry: &CatalogEntry) -> PathBuf {
    repository
        .folder(entry.folder_id)
        .map(|folder| folder.path_buf().join(&entry.file_name))
        .unwrap_or_else(|| PathBuf::from(&entry.file_name))
}

fn display_path(path: &Path) -> String {
    match dirs::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(relative) => format!("~/{}", relative.display()),
        None => path.display().to_string(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render JSON: {}", e),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
