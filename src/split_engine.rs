use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::charset::Charset;
use crate::config::IoConfig;
use crate::error::SortError;
use crate::key_spec::LineComparator;
use crate::parallel_splitter::ParallelRangeSplitter;
use crate::part_writer::{InMemorySortingPartWriter, PartWriter, PartWriterFactory};
use crate::separator::Separator;
use crate::split_plan::{SplitPlan, SplitPlanner};
use crate::streaming_splitter::SequentialStreamingSplitter;

/// Record safe split of one file into part files.
///
/// With [IoConfig::prefer_sequential] the file is split in one streaming pass, otherwise it is planned
/// with [SplitPlanner] and the ranges are copied by [ParallelRangeSplitter].
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use record_split_sort::config::IoConfig;
/// use record_split_sort::separator::Separator;
/// use record_split_sort::split_engine::SplitEngine;
///
/// fn split(input: PathBuf, output_dir: PathBuf) -> Result<Vec<PathBuf>, anyhow::Error> {
///     // 16 parts named chunk-0001.csv, chunk-0002.csv, ... written by 4 threads
///     let io = IoConfig::new(1 << 20, 4, false, "chunk-", ".csv")?;
///     SplitEngine::new().split_by_parts(&input, &output_dir, 16, &Separator::newline(), &io)
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct SplitEngine {
    parallel: ParallelRangeSplitter,
    streaming: SequentialStreamingSplitter,
}

impl SplitEngine {
    pub fn new() -> SplitEngine {
        SplitEngine {
            parallel: ParallelRangeSplitter::new(),
            streaming: SequentialStreamingSplitter::new(),
        }
    }

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
        if io.prefer_sequential() {
            return self.streaming.split_by_max_bytes(input, output_dir, max_bytes, separator, io);
        }
        let plan = SplitPlanner::new(separator.clone()).plan_by_max_bytes(input, output_dir, max_bytes)?;
        self.parallel.execute(&plan, &worker_config(io)?)
    }

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
        if io.prefer_sequential() {
            return self.streaming.split_by_parts(input, output_dir, parts, separator, io);
        }
        let plan = SplitPlanner::new(separator.clone()).plan_by_parts(input, output_dir, parts)?;
        self.parallel.execute(&plan, &worker_config(io)?)
    }

    /// Split feeding the lines to `writer`. Sequential mode only, parallel line splitting goes through
    /// [SortedSplitEngine] or [ParallelRangeSplitter::execute_with_writer].
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
        require_sequential(io)?;
        self.streaming.split_by_max_bytes_with_writer(input, output_dir, max_bytes, separator, io, writer, charset)
    }

    /// See [SplitEngine::split_by_max_bytes_with_writer]
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
        require_sequential(io)?;
        self.streaming.split_by_parts_with_writer(input, output_dir, parts, separator, io, writer, charset)
    }
}

/// Split where every part is sorted in memory before it is written, producing sorted runs for
/// [crate::merge::MergeEngine].
///
/// Only newline separated input is accepted.
#[derive(Clone, Debug)]
pub struct SortedSplitEngine {
    split_engine: SplitEngine,
    comparator: LineComparator,
    charset: Charset,
}

impl SortedSplitEngine {
    pub fn new(comparator: LineComparator, charset: Charset) -> SortedSplitEngine {
        SortedSplitEngine {
            split_engine: SplitEngine::new(),
            comparator,
            charset,
        }
    }

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
        require_newline(separator)?;
        if io.prefer_sequential() {
            let mut writer = InMemorySortingPartWriter::new(self.comparator.clone(), self.charset);
            return self.split_engine
                .split_by_max_bytes_with_writer(input, output_dir, max_bytes, separator, io, &mut writer, self.charset);
        }
        let plan = SplitPlanner::new(separator.clone()).plan_by_max_bytes(input, output_dir, max_bytes)?;
        self.execute_sorted(&plan, io)
    }

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
        require_newline(separator)?;
        if io.prefer_sequential() {
            let mut writer = InMemorySortingPartWriter::new(self.comparator.clone(), self.charset);
            return self.split_engine
                .split_by_parts_with_writer(input, output_dir, parts, separator, io, &mut writer, self.charset);
        }
        let plan = SplitPlanner::new(separator.clone()).plan_by_parts(input, output_dir, parts)?;
        self.execute_sorted(&plan, io)
    }

    fn execute_sorted(&self, plan: &SplitPlan, io: &IoConfig) -> Result<Vec<PathBuf>, anyhow::Error> {
        let comparator = self.comparator.clone();
        let charset = self.charset;
        let factory: Arc<dyn PartWriterFactory> = Arc::new(move || -> Box<dyn PartWriter> {
            Box::new(InMemorySortingPartWriter::new(comparator.clone(), charset))
        });
        ParallelRangeSplitter::new().execute_with_writer(plan, &worker_config(io)?, factory, self.charset)
    }
}

// a single worker still runs on the pool
fn worker_config(io: &IoConfig) -> Result<IoConfig, anyhow::Error> {
    if io.parallelism() > 1 {
        Ok(io.clone())
    } else {
        io.with_parallelism(1)
    }
}

fn require_sequential(io: &IoConfig) -> Result<(), anyhow::Error> {
    if io.prefer_sequential() {
        Ok(())
    } else {
        Err(SortError::Unsupported("part writer splits need sequential mode".to_string()).into())
    }
}

fn require_newline(separator: &Separator) -> Result<(), anyhow::Error> {
    if separator.is_newline() {
        Ok(())
    } else {
        Err(SortError::Unsupported("sorted splits accept newline separated input only".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::charset::Charset;
    use crate::config::IoConfig;
    use crate::error::SortError;
    use crate::key_spec::{KeySpec, LineComparator};
    use crate::part_writer::InMemorySortingPartWriter;
    use crate::separator::Separator;
    use crate::split_engine::{SortedSplitEngine, SplitEngine};

    fn concat(parts: &Vec<std::path::PathBuf>) -> Result<Vec<u8>, anyhow::Error> {
        let mut all = Vec::new();
        for part in parts {
            all.extend(std::fs::read(part)?);
        }
        Ok(all)
    }

    fn input(dir: &Path) -> Result<std::path::PathBuf, anyhow::Error> {
        let path = dir.join("input.txt");
        let content: String = (0..50).rev().map(|i| format!("{:04};row\n", i)).collect();
        std::fs::write(&path, content)?;
        Ok(path)
    }

    #[test]
    fn test_sequential_and_parallel_agree() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = input(dir.path())?;
        let engine = SplitEngine::new();
        let sequential = engine.split_by_max_bytes(
            &input,
            &dir.path().join("seq"),
            100,
            &Separator::newline(),
            &IoConfig::new(16, 0, true, "part-", ".txt")?,
        )?;
        let parallel = engine.split_by_max_bytes(
            &input,
            &dir.path().join("par"),
            100,
            &Separator::newline(),
            &IoConfig::new(16, 1, false, "part-", ".txt")?,
        )?;
        assert_eq!(concat(&sequential)?, std::fs::read(&input)?);
        assert_eq!(concat(&parallel)?, std::fs::read(&input)?);
        // both cut at the first record end at or after 100 bytes into the part
        assert_eq!(sequential.len(), parallel.len());
        Ok(())
    }

    #[test]
    fn test_writer_split_needs_sequential_mode() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = input(dir.path())?;
        let mut writer = InMemorySortingPartWriter::new(LineComparator::new(KeySpec::whole_line()), Charset::Utf8);
        let e = SplitEngine::new()
            .split_by_parts_with_writer(
                &input,
                dir.path(),
                2,
                &Separator::newline(),
                &IoConfig::new(16, 2, false, "part-", ".txt")?,
                &mut writer,
                Charset::Utf8,
            )
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
        assert!(matches!(e.downcast_ref::<SortError>(), Some(SortError::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn test_sorted_split_produces_sorted_runs() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = input(dir.path())?;
        let engine = SortedSplitEngine::new(LineComparator::new(KeySpec::whole_line()), Charset::Utf8);
        for (name, io) in [
            ("seq", IoConfig::new(64, 0, true, "run-", ".txt")?),
            ("par", IoConfig::new(64, 3, false, "run-", ".txt")?),
        ] {
            let parts = engine.split_by_parts(&input, &dir.path().join(name), 4, &Separator::newline(), &io)?;
            assert!(parts.len() >= 2, "{name}");
            let mut total = 0;
            for part in &parts {
                let content = std::fs::read_to_string(part)?;
                let lines: Vec<&str> = content.lines().collect();
                let mut sorted = lines.clone();
                sorted.sort();
                assert_eq!(lines, sorted, "{name}");
                total += lines.len();
            }
            assert_eq!(total, 50, "{name}");
        }
        Ok(())
    }

    #[test]
    fn test_sorted_split_rejects_other_separators() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let engine = SortedSplitEngine::new(LineComparator::new(KeySpec::whole_line()), Charset::Utf8);
        let result = engine.split_by_max_bytes(
            &dir.path().join("never-read.txt"),
            dir.path(),
            10,
            &Separator::single_byte(b'|'),
            &IoConfig::default(),
        );
        let e = result.err().ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
        assert!(matches!(e.downcast_ref::<SortError>(), Some(SortError::Unsupported(_))));
        Ok(())
    }
}
