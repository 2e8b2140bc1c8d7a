use std::cmp::min;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Context};
use command_executor::command::Command;

use crate::charset::Charset;
use crate::error::SortError;
use crate::line_decoder::LineDecoder;
use crate::part_writer::PartWriterFactory;
use crate::separator::ByteSource;
use crate::split_plan::Range;

/// Failure of the lowest numbered range, shared by all commands of one run
pub(crate) type FirstFailure = Arc<Mutex<Option<(usize, anyhow::Error)>>>;

#[derive(Clone)]
pub(crate) enum RangeMode {
    /// copy the range verbatim
    Raw,
    /// decode the range into lines and hand them to a fresh writer
    Lines {
        factory: Arc<dyn PartWriterFactory>,
        charset: Charset,
    },
}

/// Writes one planned range of the shared input to its own part file.
pub(crate) struct RangeCommand {
    index: usize,
    input: Arc<File>,
    input_path: PathBuf,
    range: Range,
    output: PathBuf,
    buffer_size: usize,
    mode: RangeMode,
    first_failure: FirstFailure,
}

impl RangeCommand {
    pub(crate) fn new(
        index: usize,
        input: Arc<File>,
        input_path: PathBuf,
        range: Range,
        output: PathBuf,
        buffer_size: usize,
        mode: RangeMode,
        first_failure: FirstFailure,
    ) -> RangeCommand {
        RangeCommand {
            index,
            input,
            input_path,
            range,
            output,
            buffer_size,
            mode,
            first_failure,
        }
    }

    fn copy_range(&self) -> Result<(), anyhow::Error> {
        let mut output = File::create(&self.output)
            .with_context(|| anyhow!("path: {}", self.output.display()))?;
        copy_range(&self.input, &self.input_path, self.range, &mut output, &self.output, self.buffer_size)
    }

    fn split_lines(&self, factory: &Arc<dyn PartWriterFactory>, charset: Charset) -> Result<(), anyhow::Error> {
        let mut writer = factory.create();
        let mut decoder = LineDecoder::new(charset);
        let mut buf = vec![0_u8; buffer_len(self.buffer_size, self.range.len())];
        let mut position = self.range.start();
        while position < self.range.end() {
            let want = min(buf.len() as u64, self.range.end() - position) as usize;
            let read = self.input.read_at(position, &mut buf[..want])
                .with_context(|| anyhow!("path: {}, offset: {}", self.input_path.display(), position))?;
            if read == 0 {
                return Err(
                    anyhow::Error::new(io::Error::from(io::ErrorKind::UnexpectedEof))
                        .context(format!("path: {}, offset: {}", self.input_path.display(), position))
                );
            }
            decoder.feed(&buf[..read], |record, _| {
                let (line, ending) = record.into_parts();
                writer.accept_line(line, ending)
            })?;
            position += read as u64;
        }
        decoder.finish(|record, _| {
            let (line, ending) = record.into_parts();
            writer.accept_line(line, ending)
        })?;
        writer.end_part(&self.output)
    }

    fn record_failure(&self, e: anyhow::Error) -> Result<(), anyhow::Error> {
        let mut slot = self.first_failure.lock()
            .map_err(|_| anyhow!("failure slot poisoned, range: {}", self.index))?;
        let replace = match slot.as_ref() {
            None => true,
            Some((index, _)) => self.index < *index,
        };
        if replace {
            *slot = Some((self.index, e));
        }
        Ok(())
    }
}

impl Command for RangeCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        log::debug!(
            "Start range {} [{}, {}) -> {}, thread: {}",
            self.index + 1,
            self.range.start(),
            self.range.end(),
            self.output.display(),
            thread::current().name().unwrap_or("unnamed")
        );
        let result = match &self.mode {
            RangeMode::Raw => self.copy_range(),
            RangeMode::Lines { factory, charset } => self.split_lines(factory, *charset),
        };
        match result {
            Ok(()) => {
                log::debug!("Finish range {}, thread: {}", self.index + 1, thread::current().name().unwrap_or("unnamed"));
                Ok(())
            }
            Err(e) => {
                log::error!("Range {} failed: {:#}", self.index + 1, e);
                // reported by the splitter once the pool is drained
                self.record_failure(e)
            }
        }
    }
}

pub(crate) fn buffer_len(buffer_size: usize, range_len: u64) -> usize {
    std::cmp::max(1, min(buffer_size as u64, range_len) as usize)
}

/// Copy `range` of `input` to the current position of `output`. On Linux the bytes move with
/// `copy_file_range(2)` at an explicit input offset, falling back to positional reads when the kernel
/// cannot copy between the two files.
pub(crate) fn copy_range(
    input: &File,
    input_path: &Path,
    range: Range,
    output: &mut File,
    output_path: &Path,
    buffer_size: usize,
) -> Result<(), anyhow::Error> {
    #[cfg(target_os = "linux")]
    let position = match kernel_copy(input, range, output, output_path)? {
        KernelCopy::Done => return Ok(()),
        KernelCopy::Unsupported(position) => position,
    };
    #[cfg(not(target_os = "linux"))]
    let position = range.start();

    buffered_copy(input, input_path, Range::new(position, range.end()), output, output_path, buffer_size)
}

#[cfg(target_os = "linux")]
enum KernelCopy {
    Done,
    /// the kernel refused the file pair, the rest has to be copied from this offset on
    Unsupported(u64),
}

#[cfg(target_os = "linux")]
fn kernel_copy(input: &File, range: Range, output: &File, output_path: &Path) -> Result<KernelCopy, anyhow::Error> {
    use std::os::unix::io::AsRawFd;

    let mut position = range.start();
    while position < range.end() {
        let remaining = range.end() - position;
        let to_copy = min(remaining, isize::MAX as u64) as usize;
        let mut offset_in = position as libc::loff_t;
        // SAFETY: both descriptors are open for the duration of the call and offset_in is a valid
        // pointer. An explicit input offset leaves the shared input's cursor untouched.
        let ret = unsafe {
            libc::copy_file_range(
                input.as_raw_fd(),
                &mut offset_in,
                output.as_raw_fd(),
                std::ptr::null_mut(),
                to_copy,
                0,
            )
        };
        if ret < 0 {
            let e = io::Error::last_os_error();
            return match e.raw_os_error() {
                Some(libc::EINVAL | libc::ENOSYS | libc::EXDEV | libc::EOPNOTSUPP) => {
                    log::debug!("copy_file_range unavailable for {}: {}", output_path.display(), e);
                    Ok(KernelCopy::Unsupported(position))
                }
                _ => Err(e).with_context(|| anyhow!("copy_file_range to {}, offset: {}", output_path.display(), position)),
            };
        }
        if ret == 0 {
            return Err(
                SortError::NoProgress {
                    path: output_path.to_path_buf(),
                    position,
                    remaining,
                }.into()
            );
        }
        position += ret as u64;
    }
    Ok(KernelCopy::Done)
}

fn buffered_copy(
    input: &File,
    input_path: &Path,
    range: Range,
    output: &mut File,
    output_path: &Path,
    buffer_size: usize,
) -> Result<(), anyhow::Error> {
    let mut buf = vec![0_u8; buffer_len(buffer_size, range.len())];
    let mut position = range.start();
    while position < range.end() {
        let remaining = range.end() - position;
        let want = min(buf.len() as u64, remaining) as usize;
        let read = input.read_at(position, &mut buf[..want])
            .with_context(|| anyhow!("path: {}, offset: {}", input_path.display(), position))?;
        if read == 0 {
            return Err(
                SortError::NoProgress {
                    path: output_path.to_path_buf(),
                    position,
                    remaining,
                }.into()
            );
        }
        output.write_all(&buf[..read])
            .with_context(|| anyhow!("path: {}", output_path.display()))?;
        position += read as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use command_executor::command::Command;

    use crate::charset::Charset;
    use crate::error::SortError;
    use crate::key_spec::{KeySpec, LineComparator};
    use crate::part_writer::{InMemorySortingPartWriter, PartWriter};
    use crate::range_command::{buffered_copy, copy_range, FirstFailure, RangeCommand, RangeMode};
    use crate::split_plan::Range;

    fn input_file(dir: &std::path::Path, content: &[u8]) -> Result<(std::path::PathBuf, File), anyhow::Error> {
        let path = dir.join("input.txt");
        let mut file = File::create(&path)?;
        file.write_all(content)?;
        drop(file);
        Ok((path.clone(), File::open(&path)?))
    }

    #[test]
    fn test_copy_range() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (input_path, input) = input_file(dir.path(), b"0123456789")?;
        let output_path = dir.path().join("out.txt");
        let mut output = File::create(&output_path)?;
        copy_range(&input, &input_path, Range::new(2, 7), &mut output, &output_path, 2)?;
        drop(output);
        assert_eq!(std::fs::read(&output_path)?, b"23456");
        Ok(())
    }

    #[test]
    fn test_buffered_copy_no_progress() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (input_path, input) = input_file(dir.path(), b"0123")?;
        let output_path = dir.path().join("out.txt");
        let mut output = File::create(&output_path)?;
        let e = buffered_copy(&input, &input_path, Range::new(2, 10), &mut output, &output_path, 4)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
        match e.downcast_ref::<SortError>() {
            Some(SortError::NoProgress { position, remaining, .. }) => {
                assert_eq!(*position, 4);
                assert_eq!(*remaining, 6);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_lines_mode_and_first_failure() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (input_path, _) = input_file(dir.path(), b"c\r\nb\r\na\r\n")?;
        let input = Arc::new(File::open(&input_path)?);
        let factory = Arc::new(|| -> Box<dyn PartWriter> {
            Box::new(InMemorySortingPartWriter::new(LineComparator::new(KeySpec::whole_line()), Charset::Utf8))
        });
        let mode = RangeMode::Lines { factory, charset: Charset::Utf8 };
        let failure: FirstFailure = Arc::new(Mutex::new(None));

        let ok = RangeCommand::new(
            0,
            input.clone(),
            input_path.clone(),
            Range::new(0, 9),
            dir.path().join("part-0001.txt"),
            2,
            mode.clone(),
            failure.clone(),
        );
        ok.execute()?;
        assert_eq!(std::fs::read(dir.path().join("part-0001.txt"))?, b"a\r\nb\r\nc");

        for index in [5, 3, 4] {
            let failing = RangeCommand::new(
                index,
                input.clone(),
                input_path.clone(),
                Range::new(0, 9),
                dir.path().join("missing").join("part.txt"),
                2,
                mode.clone(),
                failure.clone(),
            );
            failing.execute()?;
        }
        let slot = failure.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        assert_eq!(slot.as_ref().map(|(index, _)| *index), Some(3));
        Ok(())
    }
}
