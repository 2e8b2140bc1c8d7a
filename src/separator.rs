use std::cmp::min;
use std::fs::File;
use std::io;

use crate::error::SortError;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Positional read access to a byte stream.
///
/// Reads never move a shared cursor, so one source can be scanned from several threads at different
/// offsets.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes starting at `offset`, returning 0 at end of stream
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl ByteSource for File {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl ByteSource for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let available = &self[offset as usize..];
        let n = min(available.len(), buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

impl ByteSource for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_slice().read_at(offset, buf)
    }
}

/// Matching state carried from one buffer to the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    /// the previous buffer ended with a CR that may still turn out to be the first half of a CRLF
    PendingCr,
    /// the previous buffer ended with the first `n` bytes of a custom separator
    PartialMatch(usize),
}

/// Outcome of scanning one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan {
    /// index right after the terminator, relative to the scanned buffer. `Found(0)` means a CR
    /// carried from the previous buffer was a lone CR.
    Found(usize),
    /// no terminator ends in this buffer
    Continue(ScanState),
}

/// Record terminator flavours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeparatorKind {
    /// LF, CRLF or a lone CR
    Newline,
    SingleByte(u8),
    CustomBytes(Vec<u8>),
}

/// Detects record terminators in a byte stream.
///
/// # Examples
/// ```
/// use record_split_sort::separator::Separator;
///
/// let data = b"first\r\nsecond\rthird".to_vec();
/// let separator = Separator::newline().with_buffer_size(6).unwrap();
/// // the CRLF spans the first two 6 byte reads
/// assert_eq!(separator.find_next_separator_end(&data, 0, data.len() as u64).unwrap(), Some(7));
/// assert_eq!(separator.find_next_separator_end(&data, 7, data.len() as u64).unwrap(), Some(14));
/// assert_eq!(separator.find_next_separator_end(&data, 14, data.len() as u64).unwrap(), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Separator {
    kind: SeparatorKind,
    // KMP failure table, only for CustomBytes
    failure: Vec<usize>,
    buffer_size: usize,
}

pub(crate) const LF: &[u8] = b"\n";

impl Separator {
    pub fn newline() -> Separator {
        Separator {
            kind: SeparatorKind::Newline,
            failure: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn single_byte(byte: u8) -> Separator {
        Separator {
            kind: SeparatorKind::SingleByte(byte),
            failure: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn custom_bytes(pattern: &[u8]) -> Result<Separator, anyhow::Error> {
        if pattern.is_empty() {
            return Err(SortError::invalid_config("custom separator must not be empty"));
        }
        Ok(
            Separator {
                kind: SeparatorKind::CustomBytes(pattern.to_vec()),
                failure: failure_table(pattern),
                buffer_size: DEFAULT_BUFFER_SIZE,
            }
        )
    }

    /// Set the size of the buffers used by [Separator::find_next_separator_end]. The default is 64 KB
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Result<Separator, anyhow::Error> {
        if buffer_size == 0 {
            return Err(SortError::invalid_config("buffer_size must be > 0"));
        }
        self.buffer_size = buffer_size;
        Ok(self)
    }

    pub fn kind(&self) -> &SeparatorKind {
        &self.kind
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn is_newline(&self) -> bool {
        self.kind == SeparatorKind::Newline
    }

    /// Byte sequence written after each record by the merge. LF for newline separators.
    pub fn bytes(&self) -> &[u8] {
        match &self.kind {
            SeparatorKind::Newline => LF,
            SeparatorKind::SingleByte(byte) => std::slice::from_ref(byte),
            SeparatorKind::CustomBytes(pattern) => pattern,
        }
    }

    /// Scan one buffer continuing from `state`
    pub fn scan(&self, buf: &[u8], state: ScanState) -> Scan {
        if buf.is_empty() {
            return Scan::Continue(state);
        }
        match &self.kind {
            SeparatorKind::Newline => scan_newline(buf, state),
            SeparatorKind::SingleByte(byte) => match memchr::memchr(*byte, buf) {
                Some(i) => Scan::Found(i + 1),
                None => Scan::Continue(ScanState::Idle),
            },
            SeparatorKind::CustomBytes(pattern) => {
                let mut matched = match state {
                    ScanState::PartialMatch(n) => n,
                    _ => 0,
                };
                for (i, &b) in buf.iter().enumerate() {
                    while matched > 0 && pattern[matched] != b {
                        matched = self.failure[matched - 1];
                    }
                    if pattern[matched] == b {
                        matched += 1;
                    }
                    if matched == pattern.len() {
                        return Scan::Found(i + 1);
                    }
                }
                if matched > 0 {
                    Scan::Continue(ScanState::PartialMatch(matched))
                } else {
                    Scan::Continue(ScanState::Idle)
                }
            }
        }
    }

    /// Offset right after the first terminator found in `[from, length)`, `None` when there is none.
    ///
    /// A CR that is the last byte before `length` counts as a terminator ending at `length`.
    pub fn find_next_separator_end<S: ByteSource + ?Sized>(&self, source: &S, from: u64, length: u64) -> io::Result<Option<u64>> {
        if from >= length {
            return Ok(None);
        }
        let mut buf = vec![0_u8; min(self.buffer_size as u64, length - from) as usize];
        let mut pos = from;
        let mut state = ScanState::Idle;
        while pos < length {
            let want = min(buf.len() as u64, length - pos) as usize;
            let read = source.read_at(pos, &mut buf[..want])?;
            if read == 0 {
                break;
            }
            match self.scan(&buf[..read], state) {
                Scan::Found(end) => return Ok(Some(pos + end as u64)),
                Scan::Continue(next) => state = next,
            }
            pos += read as u64;
        }
        if state == ScanState::PendingCr {
            Ok(Some(pos))
        } else {
            Ok(None)
        }
    }
}

fn scan_newline(buf: &[u8], state: ScanState) -> Scan {
    if state == ScanState::PendingCr {
        return if buf[0] == b'\n' {
            Scan::Found(1)
        } else {
            Scan::Found(0)
        };
    }
    match memchr::memchr2(b'\n', b'\r', buf) {
        None => Scan::Continue(ScanState::Idle),
        Some(i) if buf[i] == b'\n' => Scan::Found(i + 1),
        Some(i) => match buf.get(i + 1) {
            Some(b'\n') => Scan::Found(i + 2),
            Some(_) => Scan::Found(i + 1),
            None => Scan::Continue(ScanState::PendingCr),
        },
    }
}

fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut failure = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = failure[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        failure[i] = k;
    }
    failure
}
