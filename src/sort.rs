use std::cmp::{max, min, Ordering};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use rlimit::{getrlimit, Resource, setrlimit};
use tempfile::Builder;

use crate::charset::Charset;
use crate::chunk_reader::ChunkRecordReader;
use crate::config::IoConfig;
use crate::key_spec::{KeyComparator, KeySpec, LineComparator};
use crate::merge::{comparable_line, MergeEngine};
use crate::separator::Separator;
use crate::split_engine::SortedSplitEngine;

/// Sort record files of any size: split into sorted runs, then merge the runs
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use record_split_sort::key_spec::KeySpec;
/// use record_split_sort::segment::Segment;
/// use record_split_sort::sort::Sort;
///
/// // sort by the second ';' separated field, then by the first 8 characters
/// fn sort_records(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut record_sort = Sort::new(vec![input], output);
///     record_sort.with_key_spec(KeySpec::new(vec![
///         Segment::after_delimiter(';', 0, None)?,
///         Segment::range(0, 8)?,
///     ])?);
///     // set number of CPU cores the sort will attempt to use. The default is to use all
///     // available cores.
///     record_sort.with_tasks(2);
///     // set the directory for intermediate results. The default is the system temp dir -
///     // std::env::temp_dir(), however, for large files it is recommended to provide a dedicated
///     // directory for intermediate files, preferably on the same file system as the output result.
///     record_sort.with_tmp_dir(tmp);
///     record_sort.sort()
/// }
/// ```
pub struct Sort {
    input_files: Vec<PathBuf>,
    output: PathBuf,
    tmp: PathBuf,
    tasks: usize,
    chunk_size_bytes: u64,
    key_spec: KeySpec,
    key_comparator: Option<KeyComparator>,
    charset: Charset,
    separator: Separator,
    sequential: bool,
    copy_buffer_bytes: usize,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * intermediate files go to a private directory inside std::env::temp_dir()
    /// * the complete line is the sort key
    /// * lines are separated by LF, CRLF or CR and decoded as UTF-8
    /// * input is split into sorted runs of about 10 MB, in parallel on all cores
    ///
    /// The Sort implementation will increase the file descriptor rlimit to accommodate one open file
    /// per sorted run during the merge
    pub fn new(input_files: Vec<PathBuf>, output: PathBuf) -> Sort {
        Sort {
            input_files,
            output,
            tmp: std::env::temp_dir(),
            tasks: 0,
            chunk_size_bytes: 10_000_000,
            key_spec: KeySpec::whole_line(),
            key_comparator: None,
            charset: Charset::Utf8,
            separator: Separator::newline(),
            sequential: false,
            copy_buffer_bytes: 64 * 1024,
        }
    }

    /// Set directory for intermediate files. By default use std::env::temp_dir()
    /// It is recommended for large files to create a dedicated directory for intermediate files
    /// on the same file system as the output target
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the number of tasks. The default is zero which will result in using all system cores
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Each sorted run holds about 'chunk_size_bytes' of input, respecting record boundaries
    pub fn with_chunk_size_bytes(&mut self, chunk_size_bytes: u64) {
        self.chunk_size_bytes = chunk_size_bytes;
    }

    /// Each sorted run holds about 'chunk_size_mb' MB of input, respecting record boundaries
    pub fn with_chunk_size_mb(&mut self, chunk_size_mb: u64) {
        self.chunk_size_bytes = chunk_size_mb * 1_000_000;
    }

    /// Set the sort key. The default is the whole line
    pub fn with_key_spec(&mut self, key_spec: KeySpec) {
        self.key_spec = key_spec;
    }

    /// Compare materialized keys with `key_comparator` instead of segment by segment
    pub fn with_key_comparator(&mut self, key_comparator: KeyComparator) {
        self.key_comparator = Some(key_comparator);
    }

    pub fn with_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// Set the record separator. [Sort::sort] accepts newline separators only, [Sort::merge] and
    /// [Sort::check] accept any
    pub fn with_separator(&mut self, separator: Separator) {
        self.separator = separator;
    }

    /// Split with a single streaming reader instead of planned parallel ranges
    pub fn with_sequential(&mut self, sequential: bool) {
        self.sequential = sequential;
    }

    pub fn with_copy_buffer_bytes(&mut self, copy_buffer_bytes: usize) {
        self.copy_buffer_bytes = copy_buffer_bytes;
    }

    /// Sort input files into the output file. Every output record is followed by a line feed
    pub fn sort(&self) -> Result<(), anyhow::Error> {
        log::info!("Start sort of {} files into {}", self.input_files.len(), self.output.display());
        let comparator = self.comparator();
        let io = self.io_config()?;
        let tmp_dir = Builder::new()
            .prefix("record-split-sort-")
            .tempdir_in(&self.tmp)
            .with_context(|| anyhow!("create temp dir in: {}", self.tmp.display()))?;

        let engine = SortedSplitEngine::new(comparator.clone(), self.charset);
        let mut runs = Vec::new();
        for (index, input) in self.input_files.iter().enumerate() {
            let run_dir = tmp_dir.path().join(format!("input-{:04}", index + 1));
            let mut input_runs = engine.split_by_max_bytes(input, &run_dir, self.chunk_size_bytes, &self.separator, &io)?;
            log::info!("Sorted {} into {} runs", input.display(), input_runs.len());
            runs.append(&mut input_runs);
        }

        Self::with_open_files(runs.len(), || self.merge_into_output(&runs, &comparator))?;
        log::info!("Finish sort into {}", self.output.display());
        Ok(())
    }

    /// Merge input files, each already sorted, into the output file
    pub fn merge(&self) -> Result<(), anyhow::Error> {
        let comparator = self.comparator();
        Self::with_open_files(self.input_files.len(), || self.merge_into_output(&self.input_files, &comparator))
    }

    /// Check that every input file is sorted
    pub fn check(&self) -> Result<bool, anyhow::Error> {
        let comparator = self.comparator();
        for path in &self.input_files {
            if !Self::internal_check(path, &comparator, self.charset, &self.separator)? {
                log::info!("{} is not sorted", path.display());
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn internal_check(
        path: &Path,
        comparator: &LineComparator,
        charset: Charset,
        separator: &Separator,
    ) -> Result<bool, anyhow::Error> {
        let mut reader = ChunkRecordReader::new(path, separator)?;
        let mut previous: Option<String> = None;
        while let Some(record) = reader.next_record()? {
            let current = comparable_line(&record, charset);
            if let Some(previous) = &previous {
                if comparator.compare(previous, &current) == Ordering::Greater {
                    return Ok(false);
                }
            }
            previous = Some(current);
        }
        Ok(true)
    }

    fn comparator(&self) -> LineComparator {
        let comparator = LineComparator::new(self.key_spec.clone());
        match &self.key_comparator {
            None => comparator,
            Some(key_comparator) => comparator.with_key_comparator(key_comparator.clone()),
        }
    }

    fn io_config(&self) -> Result<IoConfig, anyhow::Error> {
        let tasks = if self.tasks == 0 {
            num_cpus::get()
        } else {
            self.tasks
        };
        IoConfig::new(self.copy_buffer_bytes, tasks, self.sequential, "part-", ".txt")
    }

    // the merge lands in a temp file next to the output and replaces it when complete
    fn merge_into_output(&self, chunks: &[PathBuf], comparator: &LineComparator) -> Result<(), anyhow::Error> {
        let parent = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let merged_file = Builder::new()
            .prefix(".merged-")
            .tempfile_in(parent)
            .with_context(|| anyhow!("create temp file in: {}", parent.display()))?
            .into_temp_path();
        MergeEngine::new().k_way_merge(chunks, &merged_file, comparator, self.charset, &self.separator)?;
        merged_file.persist(&self.output)
            .map_err(|e| e.error)
            .with_context(|| anyhow!("Rename merged file to {}", self.output.display()))?;
        Ok(())
    }

    fn with_open_files<T, F>(files: usize, f: F) -> Result<T, anyhow::Error>
        where F: FnOnce() -> Result<T, anyhow::Error> {
        let (current_soft, current_hard) = Self::get_rlimits()?;
        log::info!("Current rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        let new_soft = min(max((files + 256) as u64, current_soft), current_hard);
        log::info!("Set new rlimit NOFILE, soft: {}, hard: {}", new_soft, current_hard);
        Self::set_rlimits(new_soft, current_hard)?;
        let result = f();
        log::info!("Restore rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        let restored = Self::set_rlimits(current_soft, current_hard);
        // a failed restore must not hide the failure of f
        let value = result?;
        restored?;
        Ok(value)
    }

    fn get_rlimits() -> Result<(u64, u64), anyhow::Error> {
        getrlimit(Resource::NOFILE).with_context(|| "getrlimit")
    }

    fn set_rlimits(soft: u64, hard: u64) -> Result<(), anyhow::Error> {
        setrlimit(Resource::NOFILE, soft, hard)
            .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", soft, hard))?;
        Ok(())
    }
}
