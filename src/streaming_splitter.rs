use std::cmp::{max, min};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::charset::Charset;
use crate::config::IoConfig;
use crate::error::SortError;
use crate::line_decoder::LineDecoder;
use crate::line_record::LineRecord;
use crate::part_writer::PartWriter;
use crate::range_command::buffer_len;
use crate::separator::{ByteSource, Scan, ScanState, Separator};

const MIN_LINE_BUFFER_BYTES: usize = 256 * 1024;
const PART_WRITE_BUFFER_BYTES: usize = 1 << 20;

/// Single reader, single pass splitter that needs no precomputed plan.
///
/// Bytes are counted into the current part as they are consumed. Once the count reaches the target the
/// part is armed, and it is cut right after the next complete record, so a part never ends inside a
/// record. An empty input produces no parts.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use record_split_sort::config::IoConfig;
/// use record_split_sort::separator::Separator;
/// use record_split_sort::streaming_splitter::SequentialStreamingSplitter;
///
/// fn split(input: PathBuf, output_dir: PathBuf) -> Result<Vec<PathBuf>, anyhow::Error> {
///     let io = IoConfig::new(1 << 20, 0, true, "part-", ".txt")?;
///     // parts of at least 64 MB, except the last one
///     SequentialStreamingSplitter::new().split_by_max_bytes(&input, &output_dir, 64_000_000, &Separator::newline(), &io)
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct SequentialStreamingSplitter {}

impl SequentialStreamingSplitter {
    pub fn new() -> SequentialStreamingSplitter {
        SequentialStreamingSplitter {}
    }

    /// Byte exact split into parts of at least `max_bytes` each, the last part excepted
    pub fn split_by_max_bytes(
        &self,
        input: &Path,
        output_dir: &Path,
        max_bytes: u64,
        separator: &Separator,
        io: &IoConfig,
    ) -> Result<Vec<PathBuf>, anyhow::Error> {
        if max_bytes == 0 {
            return Err(SortError::invalid_config("max_bytes must be > 0"));
        }
        self.split_raw(input, output_dir, |_| max_bytes, separator, io)
    }

    /// Byte exact split into about `parts` parts
    pub fn split_by_parts(
        &self,
        input: &Path,
        output_dir: &Path,
        parts: usize,
        separator: &Separator,
        io: &IoConfig,
    ) -> Result<Vec<PathBuf>, anyhow::Error> {
        if parts == 0 {
            return Err(SortError::invalid_config("parts must be > 0"));
        }
        self.split_raw(input, output_dir, |file_size| max(1, file_size / parts as u64), separator, io)
    }

    /// Decode the input into lines and feed them to `writer`, ending a part whenever at least
    /// `max_bytes` of input went into it. Newline separators only.
    pub fn split_by_max_bytes_with_writer(
        &self,
        input: &Path,
        output_dir: &Path,
        max_bytes: u64,
        separator: &Separator,
        io: &IoConfig,
        writer: &mut dyn PartWriter,
        charset: Charset,
    ) -> Result<Vec<PathBuf>, anyhow::Error> {
        if max_bytes == 0 {
            return Err(SortError::invalid_config("max_bytes must be > 0"));
        }
        self.split_lines(input, output_dir, |_| max_bytes, separator, io, writer, charset)
    }

    /// Same as [SequentialStreamingSplitter::split_by_max_bytes_with_writer] with a target of
    /// `ceil(size / parts)` bytes per part
    pub fn split_by_parts_with_writer(
        &self,
        input: &Path,
        output_dir: &Path,
        parts: usize,
        separator: &Separator,
        io: &IoConfig,
        writer: &mut dyn PartWriter,
        charset: Charset,
    ) -> Result<Vec<PathBuf>, anyhow::Error> {
        if parts == 0 {
            return Err(SortError::invalid_config("parts must be > 0"));
        }
        self.split_lines(
            input,
            output_dir,
            |file_size| max(1, file_size.div_ceil(parts as u64)),
            separator,
            io,
            writer,
            charset,
        )
    }

    fn split_raw<F>(
        &self,
        input: &Path,
        output_dir: &Path,
        target: F,
        separator: &Separator,
        io: &IoConfig,
    ) -> Result<Vec<PathBuf>, anyhow::Error>
        where F: Fn(u64) -> u64 {
        let (file, file_size) = open_input(input, output_dir)?;
        let target = target(file_size);
        log::info!("Start streaming split of {}, size: {}, target: {}", input.display(), file_size, target);

        let mut sink = PartSink::new(output_dir, io);
        let mut buf = vec![0_u8; buffer_len(io.copy_buffer_bytes(), file_size)];
        let mut part_bytes: u64 = 0;
        let mut armed = false;
        let mut state = ScanState::Idle;
        let mut position: u64 = 0;
        while position < file_size {
            let want = min(buf.len() as u64, file_size - position) as usize;
            let read = file.read_at(position, &mut buf[..want])
                .with_context(|| anyhow!("path: {}, offset: {}", input.display(), position))?;
            if read == 0 {
                break;
            }
            let data = &buf[..read];
            let mut chunk_start = 0;
            loop {
                match separator.scan(&data[chunk_start..], state) {
                    Scan::Continue(next) => {
                        state = next;
                        break;
                    }
                    Scan::Found(end) => {
                        state = ScanState::Idle;
                        let separator_end = chunk_start + end;
                        if separator_end > chunk_start {
                            sink.write(&data[chunk_start..separator_end])?;
                            part_bytes += (separator_end - chunk_start) as u64;
                        }
                        chunk_start = separator_end;
                        if part_bytes >= target {
                            armed = true;
                        }
                        if armed {
                            sink.cut()?;
                            part_bytes = 0;
                            armed = false;
                        }
                    }
                }
            }
            // bytes after the last terminator, continued by the next buffer
            if chunk_start < read {
                sink.write(&data[chunk_start..])?;
                part_bytes += (read - chunk_start) as u64;
                if part_bytes >= target {
                    armed = true;
                }
            }
            position += read as u64;
        }

        let parts = sink.finish()?;
        log::info!("Finish streaming split of {}, parts: {}", input.display(), parts.len());
        Ok(parts)
    }

    fn split_lines<F>(
        &self,
        input: &Path,
        output_dir: &Path,
        target: F,
        separator: &Separator,
        io: &IoConfig,
        writer: &mut dyn PartWriter,
        charset: Charset,
    ) -> Result<Vec<PathBuf>, anyhow::Error>
        where F: Fn(u64) -> u64 {
        if !separator.is_newline() {
            return Err(SortError::Unsupported("part writers accept newline separated input only".to_string()).into());
        }
        let (file, file_size) = open_input(input, output_dir)?;
        let target = target(file_size);
        log::info!("Start streaming line split of {}, size: {}, target: {}", input.display(), file_size, target);

        let mut parts: Vec<PathBuf> = Vec::new();
        let mut part_bytes: u64 = 0;
        let mut wrote_any_line = false;
        let mut on_line = |record: LineRecord, raw_len: usize| -> Result<(), anyhow::Error> {
            let (line, ending) = record.into_parts();
            writer.accept_line(line, ending)?;
            part_bytes += raw_len as u64;
            wrote_any_line = true;
            // a line was just completed, so a reached target cuts here
            if part_bytes >= target {
                let path = io.part_path(output_dir, parts.len() + 1);
                writer.end_part(&path)?;
                parts.push(path);
                part_bytes = 0;
                wrote_any_line = false;
            }
            Ok(())
        };

        let mut decoder = LineDecoder::new(charset);
        let mut buf = vec![0_u8; buffer_len(max(io.copy_buffer_bytes(), MIN_LINE_BUFFER_BYTES), file_size)];
        let mut position: u64 = 0;
        while position < file_size {
            let want = min(buf.len() as u64, file_size - position) as usize;
            let read = file.read_at(position, &mut buf[..want])
                .with_context(|| anyhow!("path: {}, offset: {}", input.display(), position))?;
            if read == 0 {
                break;
            }
            decoder.feed(&buf[..read], &mut on_line)?;
            position += read as u64;
        }
        decoder.finish(&mut on_line)?;

        if wrote_any_line {
            let path = io.part_path(output_dir, parts.len() + 1);
            writer.end_part(&path)?;
            parts.push(path);
        }
        log::info!("Finish streaming line split of {}, parts: {}", input.display(), parts.len());
        Ok(parts)
    }
}

fn open_input(input: &Path, output_dir: &Path) -> Result<(File, u64), anyhow::Error> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| anyhow!("path: {}", output_dir.display()))?;
    let file = File::open(input)
        .with_context(|| anyhow!("path: {}", input.display()))?;
    let file_size = file.metadata()
        .with_context(|| anyhow!("path: {}", input.display()))?
        .len();
    Ok((file, file_size))
}

/// Part files of a raw streaming split. A part file is created on its first write, so a cut at end of
/// input leaves no empty trailing part.
struct PartSink<'a> {
    output_dir: &'a Path,
    io: &'a IoConfig,
    current: Option<(PathBuf, BufWriter<File>)>,
    parts: Vec<PathBuf>,
}

impl<'a> PartSink<'a> {
    fn new(output_dir: &'a Path, io: &'a IoConfig) -> PartSink<'a> {
        PartSink {
            output_dir,
            io,
            current: None,
            parts: Vec::new(),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error> {
        if self.current.is_none() {
            let path = self.io.part_path(self.output_dir, self.parts.len() + 1);
            let file = File::create(&path)
                .with_context(|| anyhow!("path: {}", path.display()))?;
            log::debug!("Start part {}", path.display());
            self.parts.push(path.clone());
            self.current = Some((path, BufWriter::with_capacity(PART_WRITE_BUFFER_BYTES, file)));
        }
        if let Some((path, writer)) = self.current.as_mut() {
            writer.write_all(bytes)
                .with_context(|| anyhow!("path: {}", path.display()))?;
        }
        Ok(())
    }

    fn cut(&mut self) -> Result<(), anyhow::Error> {
        if let Some((path, mut writer)) = self.current.take() {
            writer.flush()
                .with_context(|| anyhow!("path: {}", path.display()))?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<PathBuf>, anyhow::Error> {
        self.cut()?;
        Ok(self.parts)
    }
}
