//! Task source - reads task identifiers one per line.
//!
//! Surrounding whitespace is trimmed. The first blank line ends the sequence,
//! as does end of input.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::{Error, Result};

/// Line-oriented reader of task identifiers
pub struct TaskSource<R> {
    lines: Lines<R>,
    finished: bool,
}

impl<R> TaskSource<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            finished: false,
        }
    }

    /// Next identifier, or `None` once the sequence has ended.
    ///
    /// After the terminating blank line no further input is read.
    pub async fn next_task(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        match self.lines.next_line().await.map_err(Error::Input)? {
            Some(line) => {
                let id = line.trim();
                if id.is_empty() {
                    self.finished = true;
                    Ok(None)
                } else {
                    Ok(Some(id.to_string()))
                }
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn collect(input: &[u8]) -> Vec<String> {
        let mut source = TaskSource::new(BufReader::new(input));
        let mut out = Vec::new();
        while let Some(id) = source.next_task().await.unwrap() {
            out.push(id);
        }
        out
    }

    #[tokio::test]
    async fn reads_one_identifier_per_line() {
        let ids = collect(b"http://a/1\nhttp://a/2\nhttp://a/3\n").await;
        assert_eq!(ids, vec!["http://a/1", "http://a/2", "http://a/3"]);
    }

    #[tokio::test]
    async fn trims_whitespace_and_crlf() {
        let ids = collect(b"  http://a/1 \r\n\thttp://a/2\r\n").await;
        assert_eq!(ids, vec!["http://a/1", "http://a/2"]);
    }

    #[tokio::test]
    async fn blank_line_terminates_sequence() {
        let ids = collect(b"http://a/1\n   \nhttp://a/ignored\n").await;
        assert_eq!(ids, vec!["http://a/1"]);
    }

    #[tokio::test]
    async fn missing_trailing_newline_is_accepted() {
        let ids = collect(b"http://a/1").await;
        assert_eq!(ids, vec!["http://a/1"]);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        assert!(collect(b"").await.is_empty());
    }

    #[tokio::test]
    async fn stays_finished_after_terminator() {
        let mut source = TaskSource::new(BufReader::new(&b"\nhttp://a/1\n"[..]));
        assert_eq!(source.next_task().await.unwrap(), None);
        assert_eq!(source.next_task().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_input_error() {
        let mut source = TaskSource::new(BufReader::new(&[0xff, 0xfe, b'\n'][..]));
        assert!(matches!(source.next_task().await, Err(Error::Input(_))));
    }
}
