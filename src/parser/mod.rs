pub mod categories;
pub mod cursor;
pub mod record;

use std::io::BufRead;

use indicatif::ProgressBar;
use tracing::info;

use crate::errors::ParseError;
use crate::staging::{StagedLoad, Staging};

/// Two-step pipeline: dump lines → raw product blocks → staged rows.
///
/// The whole input is read before anything is returned; similarity edges can
/// only be resolved once every product is known.
pub fn stage_catalog<R: BufRead>(reader: R, pb: &ProgressBar) -> Result<StagedLoad, ParseError> {
    let mut staging = Staging::new();
    for raw in record::records(reader) {
        staging.add(raw?);
        pb.inc(1);
    }
    info!(products = staging.product_count(), "Parsing complete");

    let staged = staging.finish();
    let d = &staged.defects;
    info!(
        discontinued = d.discontinued,
        malformed_reviews = d.malformed_reviews,
        unmatched_category_lines = d.unmatched_category_lines,
        parent_conflicts = d.parent_conflicts,
        dropped_similar = d.dropped_similar,
        duplicate_asins = d.duplicate_asins,
        "Staging complete"
    );
    Ok(staged)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_stages_end_to_end() {
        let text = std::fs::read_to_string("tests/fixtures/catalog_sample.txt").unwrap();
        let pb = ProgressBar::hidden();
        let staged = stage_catalog(text.as_bytes(), &pb).unwrap();
        assert_eq!(pb.position(), 6);
        assert_eq!(staged.products.len(), 6);
        assert_eq!(staged.reviews.len(), 7);
        assert_eq!(staged.similar.len(), 4);
        // Music path ends in an unnamed node.
        let unnamed = staged.categories.iter().find(|c| c.id == 265523).unwrap();
        assert_eq!(unnamed.name, None);
        assert_eq!(unnamed.parent_id, Some(173429));
    }

    #[test]
    fn truncated_input_fails_whole_parse() {
        let text = std::fs::read_to_string("tests/fixtures/catalog_sample.txt").unwrap();
        let cut = &text[..text.find("  salesrank: 631289").unwrap()];
        let err = stage_catalog(cut.as_bytes(), &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { ref block, .. } if block == "4"));
    }
}
