use std::collections::HashSet;

use chrono::NaiveDate;
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::db::{CategoryRow, ProductCategoryRow, ProductRow, ReviewRow, SimilarRow};
use crate::errors::Stage;
use crate::parser::categories;
use crate::parser::record::RawProduct;

/// Review lines are `date cutomer: ID rating: N votes: N helpful: N`.
const REVIEW_TOKENS: usize = 9;

/// Recoverable defects seen while staging. None of them stop a load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Defects {
    pub discontinued: usize,
    pub malformed_reviews: usize,
    pub unmatched_category_lines: usize,
    pub parent_conflicts: usize,
    pub dropped_similar: usize,
    pub duplicate_asins: usize,
}

/// Everything parsed from one dump, held in memory until the whole input has
/// been read. Lives for exactly one load.
#[derive(Debug, Default)]
pub struct Staging {
    products: Vec<ProductRow>,
    categories: IndexMap<i64, CategoryRow>,
    product_categories: IndexSet<ProductCategoryRow>,
    reviews: Vec<ReviewRow>,
    similar_candidates: Vec<(String, Vec<String>)>,
    seen: HashSet<String>,
    loadable: HashSet<String>,
    defects: Defects,
}

/// Fully resolved rows, ready for the bulk loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedLoad {
    pub categories: Vec<CategoryRow>,
    pub products: Vec<ProductRow>,
    pub product_categories: Vec<ProductCategoryRow>,
    pub reviews: Vec<ReviewRow>,
    pub similar: Vec<SimilarRow>,
    pub defects: Defects,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Stage one parsed block. The first block for an ASIN wins, matching the
    /// store's insert-or-ignore; later blocks for it are counted and dropped.
    pub fn add(&mut self, raw: RawProduct) {
        if !self.seen.insert(raw.asin.clone()) {
            self.defects.duplicate_asins += 1;
            warn!(asin = %raw.asin, id = raw.seq_id, "dropping repeated ASIN block");
            return;
        }

        let product = ProductRow {
            asin: raw.asin.clone(),
            seq_id: raw.seq_id,
            title: raw.title.clone(),
            group: raw.group.clone(),
            salesrank: raw.salesrank,
            similar_count: raw.similar_count as i64,
            category_count: raw.category_paths.len() as i64,
            review_count: raw.review_count as i64,
            downloaded: raw.review_lines.len() as i64,
            avg_rating: raw.avg_rating,
        };
        self.products.push(product);

        if raw.is_discontinued() {
            self.defects.discontinued += 1;
            return;
        }

        for line in &raw.category_paths {
            self.add_category_path(&raw.asin, line);
        }

        for line in &raw.review_lines {
            match parse_review(&raw.asin, line) {
                Some(review) => self.reviews.push(review),
                None => {
                    self.defects.malformed_reviews += 1;
                    warn!(asin = %raw.asin, line = line.trim(), "dropping malformed review line");
                }
            }
        }

        self.loadable.insert(raw.asin.clone());
        if !raw.similar_asins.is_empty() {
            self.similar_candidates.push((raw.asin, raw.similar_asins));
        }
    }

    fn add_category_path(&mut self, asin: &str, line: &str) {
        let Some(path) = categories::parse_path(line) else {
            self.defects.unmatched_category_lines += 1;
            warn!(asin, line = line.trim(), "category line matches no name[id] pattern");
            return;
        };

        for node in &path {
            self.product_categories.insert(ProductCategoryRow {
                asin: asin.to_string(),
                category_id: node.id,
            });
        }

        // First occurrence of an id fixes its name and parent.
        for row in categories::link_parents(&path) {
            match self.categories.entry(row.id) {
                Entry::Occupied(existing) => {
                    if existing.get().parent_id != row.parent_id {
                        self.defects.parent_conflicts += 1;
                        debug!(
                            category = row.id,
                            kept = ?existing.get().parent_id,
                            ignored = ?row.parent_id,
                            "category seen under a different parent"
                        );
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(row);
                }
            }
        }
    }

    /// Resolve similarity edges against the loadable ASINs and hand over the
    /// rows. Categories keep first-seen order, so a parent always precedes
    /// its children.
    pub fn finish(self) -> StagedLoad {
        let Staging {
            products,
            categories,
            product_categories,
            reviews,
            similar_candidates,
            seen: _,
            loadable,
            mut defects,
        } = self;

        let mut similar: IndexSet<SimilarRow> = IndexSet::new();
        for (asin, candidates) in similar_candidates {
            for candidate in candidates {
                if loadable.contains(&candidate) {
                    similar.insert(SimilarRow {
                        asin: asin.clone(),
                        similar_asin: candidate,
                    });
                } else {
                    defects.dropped_similar += 1;
                }
            }
        }

        StagedLoad {
            categories: categories.into_values().collect(),
            products,
            product_categories: product_categories.into_iter().collect(),
            reviews,
            similar: similar.into_iter().collect(),
            defects,
        }
    }
}

impl StagedLoad {
    pub fn rows(&self, stage: Stage) -> usize {
        match stage {
            Stage::Categories => self.categories.len(),
            Stage::Products => self.products.len(),
            Stage::ProductCategories => self.product_categories.len(),
            Stage::Reviews => self.reviews.len(),
            Stage::SimilarProducts => self.similar.len(),
        }
    }
}

/// Positional extraction: tokens 0, 2, 4, 6, 8 are date, customer, rating,
/// votes and helpful. Anything else is a malformed line.
pub fn parse_review(asin: &str, line: &str) -> Option<ReviewRow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != REVIEW_TOKENS {
        return None;
    }
    let date = NaiveDate::parse_from_str(tokens[0], "%Y-%m-%d").ok()?;
    Some(ReviewRow {
        asin: asin.to_string(),
        date: date.format("%Y-%m-%d").to_string(),
        customer_id: tokens[2].to_string(),
        rating: tokens[4].parse().ok()?,
        votes: tokens[6].parse().ok()?,
        helpful: tokens[8].parse().ok()?,
    })
}

// ── Tests ──
