mod db;
mod errors;
mod loader;
mod parser;
mod report;
mod settings;
mod staging;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use errors::Stage;
use settings::Settings;
use staging::StagedLoad;

#[derive(Parser)]
#[command(name = "catalog_loader", about = "Load a product catalog dump into SQLite and query it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a catalog dump and load it into the store
    Load {
        /// Catalog dump to read
        #[arg(short, long)]
        input: PathBuf,
        /// SQLite database file (default: settings `db_path`)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Rows per insert chunk (default: settings `chunk_size`)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Parse a catalog dump without writing anything
    Parse {
        /// Catalog dump to read
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Show row counts of the loaded tables
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run one analytical query against the loaded store
    Report {
        #[arg(value_enum)]
        query: report::QueryKind,
        /// Product ASIN for per-product queries
        #[arg(short, long)]
        asin: Option<String>,
        /// Max rows (per group for grouped queries)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Also write the result to <output_dir>/<query>.csv
        #[arg(long)]
        export: bool,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to read settings")?;

    let result = match cli.command {
        Commands::Load { input, db, chunk_size } => {
            let settings = settings.with_overrides(db, chunk_size)?;
            let staged = parse_input(&input)?;
            print_staged(&staged);

            let mut conn = db::connect(&settings.db_path)?;
            info!(db = ?settings.db_path, chunk_size = settings.chunk_size, "Loading");
            let opts = loader::LoadOptions {
                chunk_size: settings.chunk_size,
                progress: true,
            };
            let summary = loader::load(&mut conn, &staged, &opts)
                .context("Load failed, store left unchanged")?;
            println!("Loaded into {:?}:", settings.db_path);
            summary.print();
            let fresh = summary.total_inserted();
            info!(
                inserted = fresh,
                categories = summary.inserted(Stage::Categories),
                products = summary.inserted(Stage::Products),
                reviews = summary.inserted(Stage::Reviews),
                "Load committed"
            );
            if fresh == 0 {
                println!("Store already held every staged row, nothing new was written.");
            }
            Ok(())
        }
        Commands::Parse { input } => {
            let staged = parse_input(&input)?;
            print_staged(&staged);
            Ok(())
        }
        Commands::Stats { db } => {
            let settings = settings.with_overrides(db, None)?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            for (table, n) in db::get_stats(&conn)? {
                println!("{:<20} {}", format!("{}:", table), n);
            }
            Ok(())
        }
        Commands::Report { query, asin, limit, export, db } => {
            let settings = settings.with_overrides(db, None)?;
            if query.needs_asin() && asin.is_none() {
                anyhow::bail!("query `{}` requires --asin", query.name());
            }
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let table = report::run(&conn, query, asin.as_deref(), limit)?;
            if table.rows.is_empty() {
                println!("No rows.");
            } else {
                table.print();
            }
            if export {
                let path = table.export_csv(&settings.output_dir, query.name())?;
                println!("Exported to {:?}", path);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn parse_input(input: &Path) -> anyhow::Result<StagedLoad> {
    let file = File::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    info!(input = ?input, "Parsing catalog");

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} products ({per_sec})")
            .unwrap(),
    );
    let staged = parser::stage_catalog(BufReader::new(file), &pb)
        .with_context(|| format!("Failed to parse {:?}", input))?;
    pb.finish_and_clear();
    Ok(staged)
}

fn print_staged(staged: &StagedLoad) {
    println!("Staged rows:");
    for stage in Stage::ALL {
        println!("  {:<20} {:>9}", stage.table(), staged.rows(stage));
    }
    let d = &staged.defects;
    println!(
        "Skipped {} malformed reviews, {} unmatched category lines, {} similar links to unloaded products, {} repeated ASIN blocks ({} discontinued products).",
        d.malformed_reviews, d.unmatched_category_lines, d.dropped_similar, d.duplicate_asins, d.discontinued,
    );
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
