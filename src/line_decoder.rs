use crate::charset::Charset;
use crate::line_record::{LineEnding, LineRecord};

/// Incremental LF / CRLF / CR line decoder.
///
/// Bytes are fed one buffer at a time. A line is emitted together with the number of source bytes it
/// occupied (payload plus terminator) as soon as its terminator is resolved. A CR that ends a buffer is
/// held until the next buffer, or [LineDecoder::finish], tells whether it is part of a CRLF.
pub(crate) struct LineDecoder {
    charset: Charset,
    pending: Vec<u8>,
    pending_cr: bool,
}

impl LineDecoder {
    pub(crate) fn new(charset: Charset) -> LineDecoder {
        LineDecoder {
            charset,
            pending: Vec::new(),
            pending_cr: false,
        }
    }

    pub(crate) fn feed<F>(&mut self, buf: &[u8], mut emit: F) -> Result<(), anyhow::Error>
        where F: FnMut(LineRecord, usize) -> Result<(), anyhow::Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut i = 0;
        if self.pending_cr {
            self.pending_cr = false;
            if buf[0] == b'\n' {
                self.emit_line(LineEnding::CrLf, &mut emit)?;
                i = 1;
            } else {
                self.emit_line(LineEnding::Cr, &mut emit)?;
            }
        }
        while i < buf.len() {
            match memchr::memchr2(b'\n', b'\r', &buf[i..]) {
                None => {
                    self.pending.extend_from_slice(&buf[i..]);
                    break;
                }
                Some(offset) => {
                    let j = i + offset;
                    self.pending.extend_from_slice(&buf[i..j]);
                    if buf[j] == b'\n' {
                        self.emit_line(LineEnding::Lf, &mut emit)?;
                        i = j + 1;
                    } else if j + 1 == buf.len() {
                        self.pending_cr = true;
                        i = j + 1;
                    } else if buf[j + 1] == b'\n' {
                        self.emit_line(LineEnding::CrLf, &mut emit)?;
                        i = j + 2;
                    } else {
                        self.emit_line(LineEnding::Cr, &mut emit)?;
                        i = j + 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve whatever is left at end of stream: a held CR becomes a CR terminator and unterminated
    /// bytes become a [LineEnding::None] line
    pub(crate) fn finish<F>(&mut self, mut emit: F) -> Result<(), anyhow::Error>
        where F: FnMut(LineRecord, usize) -> Result<(), anyhow::Error> {
        if self.pending_cr {
            self.pending_cr = false;
            self.emit_line(LineEnding::Cr, &mut emit)
        } else if !self.pending.is_empty() {
            self.emit_line(LineEnding::None, &mut emit)
        } else {
            Ok(())
        }
    }

    fn emit_line<F>(&mut self, ending: LineEnding, emit: &mut F) -> Result<(), anyhow::Error>
        where F: FnMut(LineRecord, usize) -> Result<(), anyhow::Error> {
        let raw_len = self.pending.len() + ending.len();
        let line = self.charset.decode(&self.pending).into_owned();
        self.pending.clear();
        emit(LineRecord::new(line, ending), raw_len)
    }
}

#[cfg(test)]
mod tests {
    use crate::charset::Charset;
    use crate::line_decoder::LineDecoder;
    use crate::line_record::{LineEnding, LineRecord};

    fn decode(data: &[u8], buffer_size: usize) -> Result<Vec<(LineRecord, usize)>, anyhow::Error> {
        let mut decoder = LineDecoder::new(Charset::Utf8);
        let mut records = Vec::new();
        for chunk in data.chunks(buffer_size) {
            decoder.feed(chunk, |record, len| {
                records.push((record, len));
                Ok(())
            })?;
        }
        decoder.finish(|record, len| {
            records.push((record, len));
            Ok(())
        })?;
        Ok(records)
    }

    fn record(line: &str, ending: LineEnding) -> LineRecord {
        LineRecord::new(line.to_string(), ending)
    }

    #[test]
    fn test_all_endings_any_buffer_size() -> Result<(), anyhow::Error> {
        let data = b"a\r\nbb\rc\n\r\ndd";
        let expected = vec![
            (record("a", LineEnding::CrLf), 3),
            (record("bb", LineEnding::Cr), 3),
            (record("c", LineEnding::Lf), 2),
            (record("", LineEnding::CrLf), 2),
            (record("dd", LineEnding::None), 2),
        ];
        for buffer_size in 1..=data.len() {
            assert_eq!(decode(data, buffer_size)?, expected, "buffer size {buffer_size}");
        }
        Ok(())
    }

    #[test]
    fn test_trailing_cr_is_a_terminator() -> Result<(), anyhow::Error> {
        for buffer_size in 1..5 {
            let records = decode(b"ab\r", buffer_size)?;
            assert_eq!(records, vec![(record("ab", LineEnding::Cr), 3)]);
        }
        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<(), anyhow::Error> {
        assert!(decode(b"", 4)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_emit_error_propagates() {
        let mut decoder = LineDecoder::new(Charset::Utf8);
        let result = decoder.feed(b"a\nb\n", |_, _| Err(anyhow::anyhow!("stop")));
        assert!(result.is_err());
    }
}
