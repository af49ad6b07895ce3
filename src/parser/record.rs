use std::io::BufRead;

use tracing::debug;

use super::cursor::LineCursor;
use crate::errors::ParseError;

const DISCONTINUED: &str = "discontinued product";

/// One product block as read from the dump, before any normalisation.
///
/// `title == None` marks a discontinued product; such a block carries
/// nothing but its id and ASIN.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProduct {
    pub seq_id: i64,
    pub asin: String,
    pub title: Option<String>,
    pub group: Option<String>,
    pub salesrank: Option<i64>,
    pub similar_count: usize,
    pub similar_asins: Vec<String>,
    pub category_paths: Vec<String>,
    pub review_count: usize,
    pub review_lines: Vec<String>,
    pub avg_rating: Option<f64>,
}

impl RawProduct {
    fn discontinued(seq_id: i64, asin: String) -> Self {
        Self {
            seq_id,
            asin,
            title: None,
            group: None,
            salesrank: None,
            similar_count: 0,
            similar_asins: Vec::new(),
            category_paths: Vec::new(),
            review_count: 0,
            review_lines: Vec::new(),
            avg_rating: None,
        }
    }

    pub fn is_discontinued(&self) -> bool {
        self.title.is_none()
    }
}

/// Iterator over the product blocks of a dump.
///
/// Lines outside of a block (file header, blank separators) are skipped. The
/// first structural error is yielded once and ends the iteration.
pub struct Records<R> {
    cursor: LineCursor<R>,
    failed: bool,
}

pub fn records<R: BufRead>(reader: R) -> Records<R> {
    Records {
        cursor: LineCursor::new(reader),
        failed: false,
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<RawProduct, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let line = match self.cursor.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            };
            if line.starts_with("Id") {
                let result = parse_block(&mut self.cursor, &line);
                self.failed = result.is_err();
                return Some(result);
            }
        }
    }
}

/// Parse one block whose `Id` line has already been consumed.
pub fn parse_block<R: BufRead>(
    cursor: &mut LineCursor<R>,
    id_line: &str,
) -> Result<RawProduct, ParseError> {
    let id_raw = field_value(id_line, "Id", cursor.line_no())?;
    let seq_id = id_raw
        .parse::<i64>()
        .map_err(|_| malformed("Id", id_raw, cursor.line_no()))?;
    let block = id_raw.to_string();

    let line = require(cursor, "ASIN", &block)?;
    let asin = field_value(&line, "ASIN", cursor.line_no())?.to_string();

    let line = cursor.next_line()?.ok_or_else(|| truncated(&block, "title"))?;
    if line.contains(DISCONTINUED) {
        debug!(asin = %asin, "discontinued product");
        return Ok(RawProduct::discontinued(seq_id, asin));
    }
    // Titles may contain colons; only the first one separates the marker.
    let title = field_value(&line, "title", cursor.line_no())?.to_string();

    let line = require(cursor, "group", &block)?;
    let group = field_value(&line, "group", cursor.line_no())?.to_string();

    let line = require(cursor, "salesrank", &block)?;
    let rank_raw = field_value(&line, "salesrank", cursor.line_no())?;
    let salesrank = rank_raw.parse::<i64>().ok();
    if salesrank.is_none() {
        debug!(asin = %asin, value = rank_raw, "salesrank is not an integer");
    }

    let line = require(cursor, "similar", &block)?;
    let line_no = cursor.line_no();
    let mut tokens = field_value(&line, "similar", line_no)?.split_whitespace();
    let similar_count = match tokens.next() {
        Some(tok) => parse_count("similar", tok, line_no)?,
        None => return Err(ParseError::MissingValue { field: "similar", line: line_no }),
    };
    let similar_asins: Vec<String> = tokens.map(str::to_string).collect();

    let line = require(cursor, "categories", &block)?;
    let line_no = cursor.line_no();
    let num_categories = parse_count("categories", field_value(&line, "categories", line_no)?, line_no)?;
    let category_paths = take_lines(cursor, num_categories, &block, "category path")?;

    let line = require(cursor, "reviews", &block)?;
    let (review_count, downloaded, avg_rating) = parse_review_header(&line, cursor.line_no())?;
    let review_lines = take_lines(cursor, downloaded, &block, "review line")?;

    Ok(RawProduct {
        seq_id,
        asin,
        title: Some(title),
        group: Some(group),
        salesrank,
        similar_count,
        similar_asins,
        category_paths,
        review_count,
        review_lines,
        avg_rating: Some(avg_rating),
    })
}

/// `reviews: total: 8  downloaded: 8  avg rating: 4` → (8, 8, 4.0)
fn parse_review_header(line: &str, line_no: usize) -> Result<(usize, usize, f64), ParseError> {
    let segments: Vec<&str> = line.split(':').collect();
    let first_token = |idx: usize, field: &'static str| {
        segments
            .get(idx)
            .and_then(|s| s.split_whitespace().next())
            .ok_or(ParseError::MissingValue { field, line: line_no })
    };

    let total = parse_count("reviews total", first_token(2, "reviews total")?, line_no)?;
    let downloaded = parse_count("reviews downloaded", first_token(3, "reviews downloaded")?, line_no)?;
    let avg_raw = first_token(4, "avg rating")?;
    let avg = avg_raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| malformed("avg rating", avg_raw, line_no))?;
    Ok((total, downloaded, avg))
}

fn require<R: BufRead>(
    cursor: &mut LineCursor<R>,
    marker: &str,
    block: &str,
) -> Result<String, ParseError> {
    cursor
        .advance_until(marker)?
        .ok_or_else(|| truncated(block, marker))
}

fn take_lines<R: BufRead>(
    cursor: &mut LineCursor<R>,
    count: usize,
    block: &str,
    what: &str,
) -> Result<Vec<String>, ParseError> {
    let mut lines = Vec::with_capacity(count);
    for _ in 0..count {
        let line = cursor.next_line()?.ok_or_else(|| truncated(block, what))?;
        lines.push(line);
    }
    Ok(lines)
}

/// Trimmed remainder after the first `:` of a `marker: value` line.
fn field_value<'a>(line: &'a str, field: &'static str, line_no: usize) -> Result<&'a str, ParseError> {
    line.split_once(':')
        .map(|(_, value)| value.trim())
        .ok_or(ParseError::MissingValue { field, line: line_no })
}

fn parse_count(field: &'static str, raw: &str, line_no: usize) -> Result<usize, ParseError> {
    raw.parse::<usize>().map_err(|_| malformed(field, raw, line_no))
}

fn malformed(field: &'static str, value: &str, line: usize) -> ParseError {
    ParseError::MalformedField {
        field,
        value: value.to_string(),
        line,
    }
}

fn truncated(block: &str, marker: &str) -> ParseError {
    ParseError::Truncated {
        block: block.to_string(),
        marker: marker.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(text: &str) -> Result<Vec<RawProduct>, ParseError> {
        records(text.as_bytes()).collect()
    }

    const BLOCK: &str = "\
Id:   1
ASIN: 0827229534
  title: Patterns of Preaching: A Sermon Sampler
  group: Book
  salesrank: 396585
  similar: 5  0804215715  156101074X  0687023955  0687074231  082721619X
  categories: 2
   |Books[283155]|Subjects[1000]|Religion & Spirituality[22]|Christianity[12290]|Clergy[12360]|Preaching[12368]
   |Books[283155]|Subjects[1000]|Religion & Spirituality[22]|Christianity[12290]|Clergy[12360]|Sermons[12370]
  reviews: total: 2  downloaded: 2  avg rating: 5
    2000-7-28  cutomer: A2JW67OY8U6HHK  rating: 5  votes:  10  helpful:   9
    2003-12-14  cutomer: A2VE83MZF98ITY  rating: 5  votes:   6  helpful:   5

";

    #[test]
    fn full_block() {
        let products = parse_all(BLOCK).unwrap();
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.seq_id, 1);
        assert_eq!(p.asin, "0827229534");
        assert_eq!(p.title.as_deref(), Some("Patterns of Preaching: A Sermon Sampler"));
        assert_eq!(p.group.as_deref(), Some("Book"));
        assert_eq!(p.salesrank, Some(396585));
        assert_eq!(p.similar_count, 5);
        assert_eq!(p.similar_asins.len(), 5);
        assert_eq!(p.similar_asins[1], "156101074X");
        assert_eq!(p.category_paths.len(), 2);
        assert!(p.category_paths[1].ends_with("Sermons[12370]"));
        assert_eq!(p.review_count, 2);
        assert_eq!(p.review_lines.len(), 2);
        assert_eq!(p.avg_rating, Some(5.0));
    }

    #[test]
    fn discontinued_block() {
        let text = "Id:   0\nASIN: 0771044445\n  discontinued product\n\n";
        let products = parse_all(text).unwrap();
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert!(p.is_discontinued());
        assert_eq!(p.asin, "0771044445");
        assert!(p.category_paths.is_empty());
        assert!(p.review_lines.is_empty());
        assert!(p.similar_asins.is_empty());
    }

    #[test]
    fn header_lines_are_skipped() {
        let text = format!("# Full information about Amazon Share the Love products\nTotal items: 1\n\n{BLOCK}");
        let products = parse_all(&text).unwrap();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn zero_counts_read_no_lines() {
        let text = "\
Id:   7
ASIN: 0000000007
  title: Nothing Attached
  group: Music
  salesrank: 12
  similar: 0
  categories: 0
  reviews: total: 0  downloaded: 0  avg rating: 0
Id:   8
ASIN: 0000000008
  discontinued product
";
        let products = parse_all(text).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].similar_count, 0);
        assert!(products[0].category_paths.is_empty());
        assert!(products[0].review_lines.is_empty());
        assert_eq!(products[1].asin, "0000000008");
    }

    #[test]
    fn non_numeric_salesrank_is_optional() {
        let text = BLOCK.replace("salesrank: 396585", "salesrank: n/a");
        let products = parse_all(&text).unwrap();
        assert_eq!(products[0].salesrank, None);
    }

    #[test]
    fn negative_category_count_is_fatal() {
        let text = BLOCK.replace("categories: 2", "categories: -1");
        let err = parse_all(&text).unwrap_err();
        assert!(matches!(err, ParseError::MalformedField { field: "categories", .. }));
    }

    #[test]
    fn non_numeric_downloaded_is_fatal() {
        let text = BLOCK.replace("downloaded: 2", "downloaded: two");
        let err = parse_all(&text).unwrap_err();
        assert!(matches!(err, ParseError::MalformedField { field: "reviews downloaded", .. }));
    }

    #[test]
    fn truncated_review_lines_are_fatal() {
        let text = BLOCK.replace("downloaded: 2", "downloaded: 5");
        let err = parse_all(&text).unwrap_err();
        match err {
            ParseError::Truncated { block, marker } => {
                assert_eq!(block, "1");
                assert_eq!(marker, "review line");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_marker_is_fatal() {
        let text = "Id:   3\nASIN: 0000000003\n  title: Cut Short\n  group: Book\n";
        let err = parse_all(text).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { ref marker, .. } if marker == "salesrank"));
    }

    #[test]
    fn iteration_stops_after_error() {
        let text = format!("Id:   x\nASIN: 1\n{BLOCK}");
        let mut it = records(text.as_bytes());
        assert!(matches!(it.next(), Some(Err(ParseError::MalformedField { field: "Id", .. }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn reparsing_is_deterministic() {
        assert_eq!(parse_all(BLOCK).unwrap(), parse_all(BLOCK).unwrap());
    }
}
