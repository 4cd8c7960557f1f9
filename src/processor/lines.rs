//! Buffered line reading with configurable decoding.

use crate::config::{StreamProcessorConfig, TextEncoding};
use crate::error::{IngestError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads a file line by line.
///
/// `\n`, `\r\n` and a lone `\r` each end a line and are stripped.
/// `next_line` is cancel safe: partially read bytes stay in the internal
/// buffer and the next call continues where the previous one stopped, so it
/// can sit in a `tokio::select!` branch.
#[derive(Debug)]
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    encoding: TextEncoding,
    buf: Vec<u8>,
    /// The previous line ended with `\r`; a leading `\n` belongs to it
    skip_lf: bool,
}

impl LineReader {
    pub async fn open(path: &Path, config: &StreamProcessorConfig) -> Result<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| IngestError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(config.high_water_mark, file),
            encoding: config.encoding,
            buf: Vec::new(),
            skip_lf: false,
        })
    }

    /// Next decoded line, or `None` at end of file
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let available = self
                .reader
                .fill_buf()
                .await
                .map_err(|e| IngestError::io(&self.path, e))?;

            if available.is_empty() {
                self.skip_lf = false;
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            if self.skip_lf {
                self.skip_lf = false;
                if available[0] == b'\n' {
                    self.reader.consume(1);
                    continue;
                }
            }

            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(end) => {
                    let terminator = available[end];
                    self.buf.extend_from_slice(&available[..end]);
                    self.reader.consume(end + 1);
                    self.skip_lf = terminator == b'\r';
                    return Ok(Some(self.take_line()));
                }
                None => {
                    let len = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = self.encoding.decode(&self.buf);
        self.buf.clear();
        line
    }
}

/// Split in-memory text on the same terminators as [`LineReader`]
pub fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text).filter(|t| !t.is_empty());
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(|c: char| c == '\n' || c == '\r') {
            Some(end) => {
                let mut after = &current[end + 1..];
                if current.as_bytes()[end] == b'\r' {
                    after = after.strip_prefix('\n').unwrap_or(after);
                }
                rest = Some(after).filter(|t| !t.is_empty());
                Some(&current[..end])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// Count the lines of a file. A trailing line without newline counts.
pub async fn estimate_file_line_count(path: &Path) -> Result<usize> {
    count_lines(path, &StreamProcessorConfig::default()).await
}

pub(crate) async fn count_lines(path: &Path, config: &StreamProcessorConfig) -> Result<usize> {
    let mut reader = LineReader::open(path, config).await?;
    let mut count = 0;
    while reader.next_line().await?.is_some() {
        count += 1;
    }
    Ok(count)
}
