use std::fmt;
use std::io;

use thiserror::Error;

/// Structural failures while reading the catalog dump. Any of these aborts
/// the whole load before a single row is written.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read catalog input: {0}")]
    Io(#[from] io::Error),
    #[error("block Id {block}: input ended while looking for `{marker}`")]
    Truncated { block: String, marker: String },
    #[error("line {line}: `{field}` has malformed value {value:?}")]
    MalformedField {
        field: &'static str,
        value: String,
        line: usize,
    },
    #[error("line {line}: `{field}` line carries no value")]
    MissingValue { field: &'static str, line: usize },
}

/// Write stages of a load, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Categories,
    Products,
    ProductCategories,
    Reviews,
    SimilarProducts,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Categories,
        Stage::Products,
        Stage::ProductCategories,
        Stage::Reviews,
        Stage::SimilarProducts,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Stage::Categories => "categories",
            Stage::Products => "products",
            Stage::ProductCategories => "product_categories",
            Stage::Reviews => "reviews",
            Stage::SimilarProducts => "similar_products",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Store failures during a load. The transaction is rolled back before one
/// of these reaches the caller.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not open load transaction: {0}")]
    Begin(#[source] rusqlite::Error),
    #[error("schema creation failed: {0}")]
    Schema(#[source] rusqlite::Error),
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: rusqlite::Error,
    },
    #[error("commit failed: {0}")]
    Commit(#[source] rusqlite::Error),
}
