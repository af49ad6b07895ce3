use std::path::PathBuf;

use anyhow::{bail, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::loader::DEFAULT_CHUNK_SIZE;

const ENV_PREFIX: &str = "CATALOG";

/// Runtime settings: defaults, then `catalog.toml`, then `CATALOG_*` env vars.
/// Command-line flags are applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub chunk_size: usize,
    pub output_dir: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::build(
            Config::builder()
                .add_source(File::with_name("catalog").required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)),
        )
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .set_default("db_path", "data/catalog.sqlite")?
            .set_default("chunk_size", DEFAULT_CHUNK_SIZE as i64)?
            .set_default("output_dir", "out")?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_overrides(mut self, db: Option<PathBuf>, chunk_size: Option<usize>) -> Result<Self> {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(n) = chunk_size {
            self.chunk_size = n;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        Ok(())
    }
}

// ── Tests ──
