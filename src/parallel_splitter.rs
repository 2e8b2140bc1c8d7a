use std::cmp::min;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;

use crate::charset::Charset;
use crate::config::{IoConfig, QUEUE_SIZE};
use crate::part_writer::PartWriterFactory;
use crate::range_command::{FirstFailure, RangeCommand, RangeMode};
use crate::split_plan::SplitPlan;

/// Executes a [SplitPlan] on a pool of worker threads, one task per range.
///
/// Range `i` of the plan is always written to part `i + 1`, e.g. `part-0001.txt` for the first range.
/// Workers read the shared input by absolute offset only. When tasks fail the pool is still drained and
/// the failure of the lowest numbered range is returned. Parts written by other tasks stay on disk.
#[derive(Clone, Debug, Default)]
pub struct ParallelRangeSplitter {}

impl ParallelRangeSplitter {
    pub fn new() -> ParallelRangeSplitter {
        ParallelRangeSplitter {}
    }

    /// Copy every range verbatim to its part file. Returns the part paths in plan order.
    ///
    /// # Examples
    /// ```
    /// use std::path::PathBuf;
    /// use record_split_sort::config::IoConfig;
    /// use record_split_sort::parallel_splitter::ParallelRangeSplitter;
    /// use record_split_sort::separator::Separator;
    /// use record_split_sort::split_plan::SplitPlanner;
    ///
    /// fn split(input: PathBuf, output_dir: PathBuf) -> Result<Vec<PathBuf>, anyhow::Error> {
    ///     let plan = SplitPlanner::new(Separator::newline()).plan_by_parts(&input, &output_dir, 8)?;
    ///     ParallelRangeSplitter::new().execute(&plan, &IoConfig::default())
    /// }
    /// ```
    pub fn execute(&self, plan: &SplitPlan, io: &IoConfig) -> Result<Vec<PathBuf>, anyhow::Error> {
        self.run(plan, io, RangeMode::Raw)
    }

    /// Decode every range into lines, feed them to a writer created by `factory` and finalize the
    /// writer to the range's part file
    pub fn execute_with_writer(
        &self,
        plan: &SplitPlan,
        io: &IoConfig,
        factory: Arc<dyn PartWriterFactory>,
        charset: Charset,
    ) -> Result<Vec<PathBuf>, anyhow::Error> {
        self.run(plan, io, RangeMode::Lines { factory, charset })
    }

    fn run(&self, plan: &SplitPlan, io: &IoConfig, mode: RangeMode) -> Result<Vec<PathBuf>, anyhow::Error> {
        std::fs::create_dir_all(plan.output_dir())
            .with_context(|| anyhow!("path: {}", plan.output_dir().display()))?;
        let ranges = plan.ranges();
        if ranges.is_empty() {
            log::info!("Nothing to split, {} is empty", plan.input().display());
            return Ok(Vec::new());
        }

        let input = Arc::new(
            File::open(plan.input())
                .with_context(|| anyhow!("path: {}", plan.input().display()))?
        );
        let tasks = if io.parallelism() > 0 {
            min(io.parallelism(), ranges.len())
        } else {
            min(num_cpus::get(), ranges.len())
        };
        log::info!("Start parallel split of {}, ranges: {}, tasks: {}", plan.input().display(), ranges.len(), tasks);

        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut splitting_pool = thread_pool_builder
            .with_name("splitting".to_string())
            .with_tasks(tasks)
            .with_queue_size(QUEUE_SIZE)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()?;

        let first_failure: FirstFailure = Arc::new(Mutex::new(None));
        let mut parts = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.iter().enumerate() {
            let output = io.part_path(plan.output_dir(), index + 1);
            let range_command = Box::new(
                RangeCommand::new(
                    index,
                    input.clone(),
                    plan.input().clone(),
                    *range,
                    output.clone(),
                    io.copy_buffer_bytes(),
                    mode.clone(),
                    first_failure.clone(),
                )
            );
            splitting_pool.submit(range_command);
            parts.push(output);
        }

        log::info!("Shutting down splitting pool");
        splitting_pool.shutdown();
        splitting_pool.join()?;

        let failure = first_failure.lock()
            .map_err(|_| anyhow!("failure slot poisoned"))?
            .take();
        if let Some((index, e)) = failure {
            return Err(e.context(format!("split of {} failed at part {}", plan.input().display(), index + 1)));
        }
        log::info!("Finish parallel split of {}, parts: {}", plan.input().display(), parts.len());
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::charset::Charset;
    use crate::config::IoConfig;
    use crate::key_spec::{KeySpec, LineComparator};
    use crate::line_record::LineEnding;
    use crate::parallel_splitter::ParallelRangeSplitter;
    use crate::part_writer::{InMemorySortingPartWriter, PartWriter, PartWriterFactory};
    use crate::split_plan::{Range, SplitPlan};

    #[test]
    fn test_raw_ranges() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.txt");
        std::fs::write(&input, b"aa\nbb\ncc\n")?;
        let plan = SplitPlan::new(
            input,
            dir.path().join("parts"),
            vec![Range::new(0, 3), Range::new(3, 9)],
        );
        let parts = ParallelRangeSplitter::new().execute(&plan, &IoConfig::new(2, 4, false, "r-", ".txt")?)?;
        assert_eq!(parts, vec![dir.path().join("parts/r-0001.txt"), dir.path().join("parts/r-0002.txt")]);
        assert_eq!(std::fs::read(&parts[0])?, b"aa\n");
        assert_eq!(std::fs::read(&parts[1])?, b"bb\ncc\n");
        Ok(())
    }

    #[test]
    fn test_empty_plan() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let plan = SplitPlan::new(PathBuf::from("unused"), dir.path().join("parts"), vec![]);
        assert!(ParallelRangeSplitter::new().execute(&plan, &IoConfig::default())?.is_empty());
        assert!(dir.path().join("parts").is_dir());
        Ok(())
    }

    #[test]
    fn test_unaligned_range_emits_tail() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.txt");
        std::fs::write(&input, b"zz\nyy\nxx")?;
        // the first range ends inside "yy"
        let plan = SplitPlan::new(
            input,
            dir.path().join("parts"),
            vec![Range::new(0, 4), Range::new(4, 8)],
        );
        let factory: Arc<dyn PartWriterFactory> = Arc::new(|| -> Box<dyn PartWriter> {
            Box::new(InMemorySortingPartWriter::new(LineComparator::new(KeySpec::whole_line()), Charset::Utf8))
        });
        let parts = ParallelRangeSplitter::new()
            .execute_with_writer(&plan, &IoConfig::new(3, 2, false, "s-", "")?, factory, Charset::Utf8)?;
        assert_eq!(std::fs::read(&parts[0])?, b"y\nzz");
        assert_eq!(std::fs::read(&parts[1])?, b"xx\ny");
        Ok(())
    }

    /// Writes lines as they come and rejects the ones listed in `reject`
    struct RejectingWriter {
        reject: Vec<&'static str>,
        lines: Vec<String>,
    }

    impl PartWriter for RejectingWriter {
        fn accept_line(&mut self, line: String, _ending: LineEnding) -> Result<(), anyhow::Error> {
            if self.reject.contains(&line.as_str()) {
                return Err(anyhow::anyhow!("rejected line {}", line));
            }
            self.lines.push(line);
            Ok(())
        }

        fn end_part(&mut self, path: &Path) -> Result<(), anyhow::Error> {
            std::fs::write(path, self.lines.join("\n"))?;
            self.lines.clear();
            Ok(())
        }
    }

    #[test]
    fn test_failed_ranges_report_lowest_part_after_drain() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.txt");
        std::fs::write(&input, b"a\nb\nc\nd\ne\n")?;
        let plan = SplitPlan::new(
            input,
            dir.path().join("parts"),
            (0..5).map(|i| Range::new(i * 2, i * 2 + 2)).collect(),
        );
        let factory: Arc<dyn PartWriterFactory> = Arc::new(|| -> Box<dyn PartWriter> {
            Box::new(RejectingWriter { reject: vec!["b", "d"], lines: vec![] })
        });
        let e = ParallelRangeSplitter::new()
            .execute_with_writer(&plan, &IoConfig::new(16, 2, false, "part-", ".txt")?, factory, Charset::Utf8)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
        // one error, for the lowest failing range, raised after every range ran
        assert!(e.to_string().ends_with("failed at part 2"), "{}", e);
        assert_eq!(e.root_cause().to_string(), "rejected line b");
        for (part, written) in [(1, true), (2, false), (3, true), (4, false), (5, true)] {
            let path = dir.path().join("parts").join(format!("part-{:04}.txt", part));
            assert_eq!(path.exists(), written, "part {}", part);
        }
        assert_eq!(std::fs::read_to_string(dir.path().join("parts/part-0005.txt"))?, "e");
        Ok(())
    }

    #[test]
    fn test_missing_input() {
        let plan = SplitPlan::new(
            PathBuf::from("./target/no-such-input.txt"),
            PathBuf::from("./target/results/missing-input"),
            vec![Range::new(0, 1)],
        );
        assert!(ParallelRangeSplitter::new().execute(&plan, &IoConfig::default()).is_err());
    }
}
