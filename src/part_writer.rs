use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use tempfile::Builder;

use crate::charset::Charset;
use crate::key_spec::LineComparator;
use crate::line_record::{LineEnding, LineRecord};

/// Consumes the lines of one output part and finalizes them to a file.
pub trait PartWriter {
    /// Accept one line, without its terminator, and the terminator it had in the input
    fn accept_line(&mut self, line: String, ending: LineEnding) -> Result<(), anyhow::Error>;

    /// Write everything accepted since the previous call to `path` and get ready for the next part
    fn end_part(&mut self, path: &Path) -> Result<(), anyhow::Error>;
}

/// Creates one [PartWriter] per planned range. Called from the worker threads.
pub trait PartWriterFactory: Send + Sync {
    fn create(&self) -> Box<dyn PartWriter>;
}

impl<F> PartWriterFactory for F
    where F: Fn() -> Box<dyn PartWriter> + Send + Sync {
    fn create(&self) -> Box<dyn PartWriter> {
        self()
    }
}

/// [PartWriter] that buffers a whole part, sorts it and writes it once.
///
/// The sort is stable. Each line keeps its original terminator, except that only the physically last
/// line of the part may lack one: a [LineEnding::None] line that no longer ends the part gets the
/// part's default terminator (the first one in sorted order, LF when there is none), and a last line
/// carrying the default terminator loses it.
///
/// The part is written to a temporary file next to the target and renamed over it, so the target is
/// always either absent, the previous complete file or the new complete file.
///
/// # Examples
/// ```
/// use record_split_sort::charset::Charset;
/// use record_split_sort::key_spec::{KeySpec, LineComparator};
/// use record_split_sort::line_record::LineEnding;
/// use record_split_sort::part_writer::{InMemorySortingPartWriter, PartWriter};
///
/// fn write_part(path: &std::path::Path) -> Result<(), anyhow::Error> {
///     let mut writer = InMemorySortingPartWriter::new(LineComparator::new(KeySpec::whole_line()), Charset::Utf8);
///     writer.accept_line("b".to_string(), LineEnding::None)?;
///     writer.accept_line("c".to_string(), LineEnding::Lf)?;
///     writer.accept_line("a".to_string(), LineEnding::Lf)?;
///     // writes "a\nb\nc"
///     writer.end_part(path)
/// }
/// ```
pub struct InMemorySortingPartWriter {
    comparator: LineComparator,
    charset: Charset,
    buffer: Vec<LineRecord>,
}

impl InMemorySortingPartWriter {
    pub fn new(comparator: LineComparator, charset: Charset) -> InMemorySortingPartWriter {
        InMemorySortingPartWriter {
            comparator,
            charset,
            buffer: Vec::new(),
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn buffered_lines(&self) -> usize {
        self.buffer.len()
    }

    fn write_records(&self, records: &[LineRecord], path: &Path) -> Result<(), anyhow::Error> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = Builder::new()
            .prefix(&format!("{file_name}."))
            .suffix(".tmp")
            .tempfile_in(parent)
            .with_context(|| anyhow!("create temp file in: {}", parent.display()))?;

        let default_ending = records.iter()
            .map(|record| record.ending())
            .find(|ending| !ending.is_none())
            .unwrap_or(LineEnding::Lf);

        let mut writer = BufWriter::new(tmp.as_file());
        let mut encoded = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let last = i + 1 == records.len();
            let mut ending = record.ending();
            if ending.is_none() && !last {
                ending = default_ending;
            }
            if last && ending == default_ending {
                ending = LineEnding::None;
            }
            encoded.clear();
            self.charset.encode_into(record.line(), &mut encoded);
            encoded.extend_from_slice(ending.as_bytes());
            writer.write_all(&encoded)
                .with_context(|| anyhow!("path: {}", tmp.path().display()))?;
        }
        writer.flush()
            .with_context(|| anyhow!("path: {}", tmp.path().display()))?;
        drop(writer);

        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| anyhow!("persist part: {}", path.display()))?;
        Ok(())
    }
}

impl PartWriter for InMemorySortingPartWriter {
    fn accept_line(&mut self, line: String, ending: LineEnding) -> Result<(), anyhow::Error> {
        self.buffer.push(LineRecord::new(line, ending));
        Ok(())
    }

    fn end_part(&mut self, path: &Path) -> Result<(), anyhow::Error> {
        // taken up front so a failed write does not leak lines into the next part
        let mut records = std::mem::take(&mut self.buffer);
        records.sort_by(|a, b| self.comparator.compare(a.line(), b.line()));
        log::debug!("Writing sorted part {}, lines: {}", path.display(), records.len());
        self.write_records(&records, path)
    }
}
