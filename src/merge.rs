use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context};

use crate::charset::Charset;
use crate::chunk_reader::ChunkRecordReader;
use crate::heap_item::HeapItem;
use crate::key_spec::LineComparator;
use crate::separator::Separator;

const MERGE_WRITE_BUFFER_BYTES: usize = 1 << 20;

/// k-way merge of sorted chunk files.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use record_split_sort::charset::Charset;
/// use record_split_sort::key_spec::{KeySpec, LineComparator};
/// use record_split_sort::merge::MergeEngine;
/// use record_split_sort::segment::Segment;
/// use record_split_sort::separator::Separator;
///
/// fn merge(chunks: Vec<PathBuf>, output: PathBuf) -> Result<u64, anyhow::Error> {
///     // order by the first four characters of each record
///     let comparator = LineComparator::new(KeySpec::new(vec![Segment::range(0, 4)?])?);
///     MergeEngine::new().k_way_merge(&chunks, &output, &comparator, Charset::Utf8, &Separator::newline())
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MergeEngine {}

impl MergeEngine {
    pub fn new() -> MergeEngine {
        MergeEngine {}
    }

    /// Merge `chunks`, each sorted by `comparator`, into `output` and return the number of records
    /// written.
    ///
    /// Records are decoded with `charset` only to be compared; the output receives each record's
    /// original bytes followed by the separator's byte sequence, the last record included. Newline
    /// separated chunks may end their lines with LF, CRLF or CR, and every merged line ends with LF.
    /// Records with equal keys come out in chunk order, and in their original order within a chunk.
    pub fn k_way_merge(
        &self,
        chunks: &[PathBuf],
        output: &Path,
        comparator: &LineComparator,
        charset: Charset,
        separator: &Separator,
    ) -> Result<u64, anyhow::Error> {
        log::info!(
            "Merging {} sorted files into {}, thread: {}",
            chunks.len(),
            output.display(),
            thread::current().name().unwrap_or("unnamed")
        );
        let mut readers = Vec::with_capacity(chunks.len());
        for path in chunks {
            readers.push(ChunkRecordReader::new(path, separator)?);
        }
        let file = File::create(output)
            .with_context(|| anyhow!("path: {}", output.display()))?;
        let mut merged_writer = BufWriter::with_capacity(MERGE_WRITE_BUFFER_BYTES, file);

        let mut sequence: u64 = 0;
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (chunk_index, reader) in readers.iter_mut().enumerate() {
            if let Some(record) = reader.next_record()? {
                let line = comparable_line(&record, charset);
                heap.push(Reverse(HeapItem::new(comparator, line, record, chunk_index, sequence)));
                sequence += 1;
            }
        }

        let mut merged_len: u64 = 0;
        while let Some(Reverse(item)) = heap.pop() {
            merged_writer.write_all(item.record())
                .and_then(|_| merged_writer.write_all(separator.bytes()))
                .with_context(|| anyhow!("path: {}", output.display()))?;
            merged_len += 1;

            let chunk_index = item.chunk_index();
            if let Some(record) = readers[chunk_index].next_record()? {
                let line = comparable_line(&record, charset);
                heap.push(Reverse(HeapItem::new(comparator, line, record, chunk_index, sequence)));
                sequence += 1;
            }
        }
        merged_writer.flush()
            .with_context(|| anyhow!("path: {}", output.display()))?;

        log::info!(
            "Finished merging sorted files, thread: {}, merged length: {} records",
            thread::current().name().unwrap_or("unnamed"),
            merged_len
        );
        Ok(merged_len)
    }
}

/// Text a record is compared by
pub(crate) fn comparable_line(record: &[u8], charset: Charset) -> String {
    charset.decode(record).into_owned()
}
