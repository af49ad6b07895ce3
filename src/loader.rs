use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db;
use crate::errors::{LoadError, Stage};
use crate::staging::StagedLoad;

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub chunk_size: usize,
    pub progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: Stage,
    pub offered: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub stages: Vec<StageSummary>,
}

impl LoadSummary {
    pub fn inserted(&self, stage: Stage) -> usize {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.inserted)
            .unwrap_or(0)
    }

    /// Rows new to the store across every stage. Zero on a repeated load.
    pub fn total_inserted(&self) -> usize {
        Stage::ALL.into_iter().map(|stage| self.inserted(stage)).sum()
    }

    pub fn print(&self) {
        for s in &self.stages {
            println!(
                "  {:<20} {:>9} rows, {:>9} inserted, {:>9} already present",
                s.stage.table(),
                s.offered,
                s.inserted,
                s.offered - s.inserted
            );
        }
    }
}

/// Write all staged rows in dependency order inside one transaction.
///
/// The schema script runs first in the same transaction. On any error the
/// transaction is dropped uncommitted, which rolls everything back.
pub fn load(
    conn: &mut Connection,
    staged: &StagedLoad,
    opts: &LoadOptions,
) -> Result<LoadSummary, LoadError> {
    let tx = conn.transaction().map_err(LoadError::Begin)?;
    db::init_schema(&tx).map_err(LoadError::Schema)?;

    let stages = vec![
        write_stage(&tx, Stage::Categories, &staged.categories, opts, db::insert_categories)?,
        write_stage(&tx, Stage::Products, &staged.products, opts, db::insert_products)?,
        write_stage(
            &tx,
            Stage::ProductCategories,
            &staged.product_categories,
            opts,
            db::insert_product_categories,
        )?,
        write_stage(&tx, Stage::Reviews, &staged.reviews, opts, db::insert_reviews)?,
        write_stage(&tx, Stage::SimilarProducts, &staged.similar, opts, db::insert_similar)?,
    ];

    info!("Committing load");
    tx.commit().map_err(LoadError::Commit)?;
    Ok(LoadSummary { stages })
}

fn write_stage<T>(
    conn: &Connection,
    stage: Stage,
    rows: &[T],
    opts: &LoadOptions,
    insert: fn(&Connection, &[T]) -> rusqlite::Result<usize>,
) -> Result<StageSummary, LoadError> {
    info!(stage = %stage, rows = rows.len(), "Writing stage");
    let pb = stage_progress(stage, rows.len(), opts.progress);

    let mut inserted = 0;
    for (i, chunk) in rows.chunks(opts.chunk_size.max(1)).enumerate() {
        inserted += insert(conn, chunk).map_err(|source| LoadError::Stage { stage, source })?;
        debug!(stage = %stage, chunk = i, rows = chunk.len(), "chunk written");
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    Ok(StageSummary {
        stage,
        offered: rows.len(),
        inserted,
    })
}

fn stage_progress(stage: Stage, len: usize, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:<20} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(stage.table());
    pb
}

// ── Tests ──
