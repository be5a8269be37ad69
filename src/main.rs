use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedpatch::config::Config;
use feedpatch::feed::{EditorOptions, FeedEditor, ImageStats};
use feedpatch::storage::{CatalogEntry, Database, DatabaseError, ReportEntry};
use feedpatch::store;

#[derive(Parser, Debug)]
#[command(
    name = "feedpatch",
    about = "Batch editor for product-catalog XML feeds"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "feedpatch.toml")]
    config: PathBuf,

    /// Process only the named feed file (repeatable); default is every file
    /// in the feeds folder
    #[arg(long = "feed", value_name = "NAME")]
    feeds: Vec<String>,

    /// Skip the image replacement pass
    #[arg(long)]
    skip_images: bool,

    /// Reset the report database (delete and recreate)
    #[arg(long)]
    reset_db: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config).context("Failed to load configuration")?;

    // Handle --reset-db flag
    if args.reset_db && std::path::Path::new(&config.database_path).exists() {
        std::fs::remove_file(&config.database_path).context("Failed to delete report database")?;
        println!("Report database reset.");
    }

    // Bootstrap destination folders; the feeds folder itself must already
    // exist and hold the downloaded files.
    for dir in [&config.output_dir, &config.image_dir] {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            println!("Created directory: {}", dir.display());
        }
    }

    let filenames = if args.feeds.is_empty() {
        store::list_feed_files(&config.feeds_dir).context("Failed to discover feed files")?
    } else {
        args.feeds.clone()
    };
    println!(
        "Processing {} feed file(s) from {}",
        filenames.len(),
        config.feeds_dir.display()
    );

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: another feedpatch run appears to hold the report database. Let it finish and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open report database: {}", e));
        }
    };

    // One editor per file, strictly sequential. A failed feed aborts the
    // run: its output is untrustworthy and later feeds are better retried
    // together after the cause is fixed.
    let options = EditorOptions::from_config(&config);
    for filename in &filenames {
        process_feed(filename, &config, &options, &args, &db)
            .await
            .with_context(|| format!("Processing failed for {}", filename))?;
    }

    println!("Done: {} feed file(s) processed", filenames.len());
    Ok(())
}

/// Runs the full mutation pipeline for one feed file and persists the
/// report and catalog snapshot.
async fn process_feed(
    filename: &str,
    config: &Config,
    options: &EditorOptions,
    args: &Args,
    db: &Database,
) -> Result<()> {
    let mut editor = FeedEditor::new(filename, options.clone());

    let availability_updates = if config.availability.ids.is_empty() {
        0
    } else {
        editor.set_availability(&config.availability.ids, &config.availability.flag)?
    };

    let labels_added = if config.labels.is_empty() {
        0
    } else {
        editor.apply_labels(&config.labels)?
    };

    let images = if args.skip_images {
        ImageStats::default()
    } else {
        editor.replace_images()?
    };

    let offers_deleted = if config.delete_ids.is_empty() {
        0
    } else {
        editor.delete_offers(&config.delete_ids)?
    };

    editor.save()?;

    let catalog = editor.catalog()?;
    let report = ReportEntry {
        filename: filename.to_string(),
        offers_total: catalog.len() as i64,
        availability_updates: availability_updates as i64,
        labels_added: labels_added as i64,
        images_deleted: images.deleted as i64,
        images_inserted: images.inserted as i64,
        images_promo_inserted: images.promo_inserted as i64,
        offers_deleted: offers_deleted as i64,
    };
    db.insert_report(&report)
        .await
        .context("Failed to save processing report")?;

    let rows: Vec<CatalogEntry> = catalog
        .into_iter()
        .map(|entry| CatalogEntry {
            offer_id: entry.offer_id,
            name: entry.name,
            available: entry.available,
        })
        .collect();
    db.insert_catalog(filename, &rows)
        .await
        .context("Failed to save catalog snapshot")?;

    Ok(())
}
