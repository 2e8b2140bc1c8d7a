use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::separator::{Scan, ScanState, Separator};

const DEFAULT_READ_BUFFER_BYTES: usize = 64 * 1024;

/// Reads the records of one chunk file, one per call, without their separator.
///
/// Records are delimited by the exact byte sequence of the separator, or by LF, CRLF or a lone CR for
/// newline separators. A final record without a trailing separator is still returned, and once the
/// file is exhausted every call returns `None`.
pub(crate) struct ChunkRecordReader {
    path: PathBuf,
    reader: BufReader<File>,
    matcher: Separator,
    newline: bool,
    separator_len: usize,
    exhausted: bool,
}

impl ChunkRecordReader {
    pub(crate) fn new(path: &Path, separator: &Separator) -> Result<ChunkRecordReader, anyhow::Error> {
        ChunkRecordReader::with_capacity(path, separator, DEFAULT_READ_BUFFER_BYTES)
    }

    pub(crate) fn with_capacity(path: &Path, separator: &Separator, capacity: usize) -> Result<ChunkRecordReader, anyhow::Error> {
        let bytes = separator.bytes();
        let matcher = if separator.is_newline() {
            Separator::newline()
        } else if bytes.len() == 1 {
            Separator::single_byte(bytes[0])
        } else {
            Separator::custom_bytes(bytes)?
        };
        let file = File::open(path)
            .with_context(|| anyhow!("path: {}", path.display()))?;
        Ok(
            ChunkRecordReader {
                path: path.to_path_buf(),
                reader: BufReader::with_capacity(capacity, file),
                matcher,
                newline: separator.is_newline(),
                separator_len: bytes.len(),
                exhausted: false,
            }
        )
    }

    pub(crate) fn next_record(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error> {
        if self.exhausted {
            return Ok(None);
        }
        let mut record = Vec::new();
        let mut state = ScanState::Idle;
        loop {
            let buf = self.reader.fill_buf()
                .with_context(|| anyhow!("path: {}", self.path.display()))?;
            if buf.is_empty() {
                self.exhausted = true;
                if state == ScanState::PendingCr {
                    // a CR at end of file is a terminator
                    record.pop();
                    return Ok(Some(record));
                }
                // a partially matched separator at end of file stays part of the record
                return Ok(if record.is_empty() { None } else { Some(record) });
            }
            match self.matcher.scan(buf, state) {
                Scan::Found(end) => {
                    record.extend_from_slice(&buf[..end]);
                    self.reader.consume(end);
                    self.strip_separator(&mut record);
                    return Ok(Some(record));
                }
                Scan::Continue(next) => {
                    state = next;
                    let consumed = buf.len();
                    record.extend_from_slice(buf);
                    self.reader.consume(consumed);
                }
            }
        }
    }

    // record ends with its terminator here
    fn strip_separator(&self, record: &mut Vec<u8>) {
        if !self.newline {
            record.truncate(record.len() - self.separator_len);
            return;
        }
        if record.last() == Some(&b'\n') {
            record.pop();
        }
        if record.last() == Some(&b'\r') {
            record.pop();
        }
    }
}
