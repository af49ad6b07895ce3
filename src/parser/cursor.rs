use std::io::{self, BufRead};

/// Forward-only view over the lines of a catalog dump.
///
/// Lines are handed out exactly once. There is no pushback, so a caller that
/// needs a line later has to keep the returned `String`.
pub struct LineCursor<R> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> LineCursor<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }

    /// Next line without its terminator, or `None` at end of input.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let trimmed = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed);
        Ok(Some(buf))
    }

    /// Discard lines until one contains `marker` and return it.
    pub fn advance_until(&mut self, marker: &str) -> io::Result<Option<String>> {
        while let Some(line) = self.next_line()? {
            if line.contains(marker) {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// 1-based number of the line most recently returned.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(text: &str) -> LineCursor<&[u8]> {
        LineCursor::new(text.as_bytes())
    }

    #[test]
    fn next_line_strips_terminators() {
        let mut c = cursor("Id:   1\r\nASIN: 0827229534\n");
        assert_eq!(c.next_line().unwrap().as_deref(), Some("Id:   1"));
        assert_eq!(c.next_line().unwrap().as_deref(), Some("ASIN: 0827229534"));
        assert_eq!(c.next_line().unwrap(), None);
        assert_eq!(c.line_no(), 2);
    }

    #[test]
    fn advance_until_skips_to_marker() {
        let mut c = cursor("  title: x\n  group: Book\n  salesrank: 396585\n");
        assert_eq!(
            c.advance_until("salesrank").unwrap().as_deref(),
            Some("  salesrank: 396585")
        );
        assert_eq!(c.line_no(), 3);
        assert_eq!(c.next_line().unwrap(), None);
    }

    #[test]
    fn advance_until_reports_exhaustion() {
        let mut c = cursor("  group: Book\n  salesrank: 1\n");
        assert_eq!(c.advance_until("reviews").unwrap(), None);
        // Consumed lines are gone for good.
        assert_eq!(c.advance_until("group").unwrap(), None);
    }

    #[test]
    fn last_line_without_newline_is_returned() {
        let mut c = cursor("a\nb");
        assert_eq!(c.next_line().unwrap().as_deref(), Some("a"));
        assert_eq!(c.next_line().unwrap().as_deref(), Some("b"));
        assert_eq!(c.next_line().unwrap(), None);
    }
}
