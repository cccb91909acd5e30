use crate::Result;
use std::io::BufRead;

/// Sequential line source the readers pull from.
///
/// `Ok(None)` marks end of stream. Lines come back without their trailing
/// `\n` / `\r\n`, so a blank line is `Some("")` and never looks like EOF.
pub trait LineSource {
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Number of lines handed out so far.
    fn line_number(&self) -> usize;
}

/// Adapts any buffered reader into a [`LineSource`].
///
/// Opening and closing the underlying file stays with the caller.
pub struct LineReader<R> {
    inner: R,
    line_number: usize,
    buf: String,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_number: 0,
            buf: String::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let line = self.buf.strip_suffix('\n').unwrap_or(&self.buf);
        let line = line.strip_suffix('\r').unwrap_or(line);
        Ok(Some(line.to_string()))
    }

    fn line_number(&self) -> usize {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_reader_strips_newlines() {
        let mut src = LineReader::new(Cursor::new("a\r\nb\n\nc"));

        assert_eq!(src.read_line().unwrap().as_deref(), Some("a"));
        assert_eq!(src.read_line().unwrap().as_deref(), Some("b"));
        assert_eq!(src.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(src.read_line().unwrap().as_deref(), Some("c"));
        assert_eq!(src.line_number(), 4);
        assert!(src.read_line().unwrap().is_none());
        assert!(src.read_line().unwrap().is_none());
        assert_eq!(src.line_number(), 4);
    }
}
