use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::error::SortError;
use crate::separator::Separator;

/// Half open byte range `[start, end)` of the input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    start: u64,
    end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Range {
        Range {
            start,
            end,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the range, 0 for a reversed range
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contiguous, record aligned ranges covering `[0, file size)` of one input file.
#[derive(Clone, Debug)]
pub struct SplitPlan {
    input: PathBuf,
    output_dir: PathBuf,
    ranges: Vec<Range>,
}

impl SplitPlan {
    pub fn new(input: PathBuf, output_dir: PathBuf, ranges: Vec<Range>) -> SplitPlan {
        SplitPlan {
            input,
            output_dir,
            ranges,
        }
    }

    pub fn input(&self) -> &PathBuf {
        &self.input
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    pub fn ranges(&self) -> &Vec<Range> {
        &self.ranges
    }
}

/// Computes record safe split plans.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use record_split_sort::separator::Separator;
/// use record_split_sort::split_plan::SplitPlanner;
///
/// fn plan(input: PathBuf, output_dir: PathBuf) -> Result<(), anyhow::Error> {
///     let planner = SplitPlanner::new(Separator::newline());
///     // about 10 MB per range, each range ends right after a line terminator
///     let plan = planner.plan_by_max_bytes(&input, &output_dir, 10_000_000)?;
///     println!("{} ranges", plan.ranges().len());
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct SplitPlanner {
    separator: Separator,
}

impl SplitPlanner {
    pub fn new(separator: Separator) -> SplitPlanner {
        SplitPlanner {
            separator,
        }
    }

    pub fn separator(&self) -> &Separator {
        &self.separator
    }

    /// Plan ranges of about `max_bytes` each. Every range but the last ends at the first terminator
    /// found at or after `max_bytes` from its start. A `max_bytes` of 0 yields one range per record.
    pub fn plan_by_max_bytes(&self, input: &Path, output_dir: &Path, max_bytes: u64) -> Result<SplitPlan, anyhow::Error> {
        self.plan(input, output_dir, |_| max_bytes)
    }

    /// Plan about `parts` ranges. Fewer ranges are produced when the file holds fewer records.
    pub fn plan_by_parts(&self, input: &Path, output_dir: &Path, parts: usize) -> Result<SplitPlan, anyhow::Error> {
        if parts == 0 {
            return Err(SortError::invalid_config("parts must be > 0"));
        }
        self.plan(input, output_dir, |file_size| std::cmp::max(1, file_size / parts as u64))
    }

    fn plan<F>(&self, input: &Path, output_dir: &Path, target: F) -> Result<SplitPlan, anyhow::Error>
        where F: Fn(u64) -> u64 {
        let file = File::open(input)
            .with_context(|| anyhow!("path: {}", input.display()))?;
        let file_size = file.metadata()
            .with_context(|| anyhow!("path: {}", input.display()))?
            .len();
        let target = target(file_size);
        log::info!("Start planning {}, size: {}, target: {}", input.display(), file_size, target);
        let ranges = compute_ranges(
            file_size,
            target,
            |from| self.separator.find_next_separator_end(&file, from, file_size),
        )
            .with_context(|| anyhow!("path: {}", input.display()))?;
        log::info!("Finish planning {}, ranges: {}", input.display(), ranges.len());
        Ok(SplitPlan::new(input.to_path_buf(), output_dir.to_path_buf(), ranges))
    }
}

/// Boundary walk shared by both planning modes. `find` returns the end of the first terminator at or
/// after the given offset.
pub(crate) fn compute_ranges<F>(file_size: u64, target: u64, mut find: F) -> io::Result<Vec<Range>>
    where F: FnMut(u64) -> io::Result<Option<u64>> {
    let mut boundaries: Vec<u64> = vec![0];
    let mut next_target = target;
    while next_target < file_size {
        let last = boundaries[boundaries.len() - 1];
        let boundary = match find(next_target)? {
            None => break,
            Some(boundary) if boundary > last => boundary,
            Some(stuck) => {
                let retry_from = std::cmp::min(file_size, last + 1);
                match find(retry_from)? {
                    Some(retry) if retry > last => retry,
                    _ => {
                        log::warn!(
                            "Boundary search stuck at {} (candidate {}), remaining {} bytes stay in the last range",
                            last,
                            stuck,
                            file_size - last
                        );
                        break;
                    }
                }
            }
        };
        boundaries.push(boundary);
        next_target = boundary.saturating_add(target);
    }

    if boundaries[boundaries.len() - 1] != file_size {
        boundaries.push(file_size);
    }

    Ok(
        boundaries
            .windows(2)
            .map(|w| Range::new(w[0], w[1]))
            .collect()
    )
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    use crate::separator::Separator;
    use crate::split_plan::{compute_ranges, Range, SplitPlanner};

    fn boundaries(ranges: &Vec<Range>) -> Vec<u64> {
        let mut result = vec![];
        if let Some(first) = ranges.first() {
            result.push(first.start());
        }
        for range in ranges {
            result.push(range.end());
        }
        result
    }

    fn ten_lines() -> Vec<u8> {
        (0..10).map(|i| format!("{:03}\n", i)).collect::<String>().into_bytes()
    }

    fn plan_bytes(data: &Vec<u8>, target: u64) -> Result<Vec<u64>, anyhow::Error> {
        let separator = Separator::newline();
        let ranges = compute_ranges(
            data.len() as u64,
            target,
            |from| separator.find_next_separator_end(data, from, data.len() as u64),
        )?;
        Ok(boundaries(&ranges))
    }

    #[test]
    fn test_range_len() {
        assert_eq!(Range::new(3, 10).len(), 7);
        assert!(Range::new(4, 4).is_empty());
        assert_eq!(Range::new(10, 3).len(), 0);
        assert!(Range::new(10, 3).is_empty());
    }

    #[test]
    fn test_target_larger_than_file() -> Result<(), anyhow::Error> {
        let data = ten_lines();
        assert_eq!(plan_bytes(&data, 100)?, vec![0, 40]);
        assert_eq!(plan_bytes(&data, 40)?, vec![0, 40]);
        Ok(())
    }

    #[test]
    fn test_target_inside_records() -> Result<(), anyhow::Error> {
        let data = ten_lines();
        assert_eq!(plan_bytes(&data, 10)?, vec![0, 12, 24, 36, 40]);
        assert_eq!(plan_bytes(&data, 5)?, vec![0, 8, 16, 24, 32, 40]);
        Ok(())
    }

    #[test]
    fn test_tiny_targets_cut_every_record() -> Result<(), anyhow::Error> {
        let data = ten_lines();
        let every_line: Vec<u64> = (0..=10).map(|i| i * 4).collect();
        assert_eq!(plan_bytes(&data, 1)?, every_line);
        assert_eq!(plan_bytes(&data, 0)?, every_line);
        Ok(())
    }

    #[test]
    fn test_empty_file() -> Result<(), anyhow::Error> {
        let ranges = compute_ranges(0, 10, |_| Ok(None))?;
        assert!(ranges.is_empty());
        Ok(())
    }

    #[test]
    fn test_no_separator() -> Result<(), anyhow::Error> {
        let ranges = compute_ranges(50, 10, |_| Ok(None))?;
        assert_eq!(ranges, vec![Range::new(0, 50)]);
        Ok(())
    }

    #[test]
    fn test_retry_past_stuck_boundary() -> Result<(), anyhow::Error> {
        // the first answer does not advance, the retry from last + 1 does
        let mut calls = vec![];
        let ranges = compute_ranges(30, 10, |from| {
            calls.push(from);
            Ok(match calls.len() {
                1 => Some(0),
                2 => Some(15),
                _ => None,
            })
        })?;
        assert_eq!(calls, vec![10, 1, 25]);
        assert_eq!(ranges, vec![Range::new(0, 15), Range::new(15, 30)]);
        Ok(())
    }

    #[test]
    fn test_stuck_retry_degrades() -> Result<(), anyhow::Error> {
        let ranges = compute_ranges(30, 10, |_| Ok(Some(0)))?;
        assert_eq!(ranges, vec![Range::new(0, 30)]);
        Ok(())
    }

    #[test]
    fn test_plan_by_parts() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.txt");
        let mut file = File::create(&input)?;
        file.write_all(&ten_lines())?;
        drop(file);

        let planner = SplitPlanner::new(Separator::newline());
        let plan = planner.plan_by_parts(&input, &PathBuf::from("out"), 3)?;
        assert_eq!(plan.ranges().len(), 3);
        assert_eq!(plan.ranges()[0].start(), 0);
        assert_eq!(plan.ranges()[2].end(), 40);
        for w in plan.ranges().windows(2) {
            assert_eq!(w[0].end(), w[1].start());
            assert_eq!(w[0].end() % 4, 0);
        }
        assert!(planner.plan_by_parts(&input, &PathBuf::from("out"), 0).is_err());
        Ok(())
    }

    #[test]
    fn test_more_parts_than_records() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("three.txt");
        std::fs::write(&input, b"a\nb\nc\n")?;
        let plan = SplitPlanner::new(Separator::newline()).plan_by_parts(&input, dir.path(), 10)?;
        assert!(plan.ranges().len() <= 3);
        assert_eq!(plan.ranges().last().map(|r| r.end()), Some(6));
        Ok(())
    }

    #[test]
    fn test_missing_input() {
        let planner = SplitPlanner::new(Separator::newline());
        assert!(planner.plan_by_max_bytes(&PathBuf::from("./target/does-not-exist"), &PathBuf::from("out"), 10).is_err());
    }
}
