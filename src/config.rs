use std::path::{Path, PathBuf};

use crate::error::SortError;

pub(crate) const QUEUE_SIZE: usize = 4096;
const DEFAULT_COPY_BUFFER_BYTES: usize = 64 * 1024;

/// I/O settings shared by the splitters.
///
/// # Examples
/// ```
/// use record_split_sort::config::IoConfig;
///
/// // 1 MB copy buffer, 4 worker threads, parallel mode, files named "run-0001.dat", ...
/// let io = IoConfig::new(1 << 20, 4, false, "run-", ".dat").unwrap();
/// assert_eq!(io.part_file_name(1), "run-0001.dat");
/// ```
#[derive(Clone, Debug)]
pub struct IoConfig {
    copy_buffer_bytes: usize,
    parallelism: usize,
    prefer_sequential: bool,
    file_prefix: String,
    file_extension: String,
}

impl IoConfig {
    /// Create a validated [IoConfig]
    ///
    /// # Arguments
    /// * `copy_buffer_bytes` - size of the read buffers, must be greater than zero
    /// * `parallelism` - number of worker threads, must be greater than zero unless `prefer_sequential`
    ///   is set
    /// * `prefer_sequential` - use the single reader streaming splitter instead of planning and
    ///   splitting in parallel
    /// * `file_prefix` - part file name prefix, must not be blank
    /// * `file_extension` - part file name extension, may be empty
    pub fn new(
        copy_buffer_bytes: usize,
        parallelism: usize,
        prefer_sequential: bool,
        file_prefix: &str,
        file_extension: &str,
    ) -> Result<IoConfig, anyhow::Error> {
        if copy_buffer_bytes == 0 {
            return Err(SortError::invalid_config("copy_buffer_bytes must be positive"));
        }
        if !prefer_sequential && parallelism == 0 {
            return Err(SortError::invalid_config("parallelism must be positive"));
        }
        if file_prefix.trim().is_empty() {
            return Err(SortError::invalid_config("file_prefix is required"));
        }
        Ok(
            IoConfig {
                copy_buffer_bytes,
                parallelism,
                prefer_sequential,
                file_prefix: file_prefix.to_string(),
                file_extension: file_extension.to_string(),
            }
        )
    }

    pub fn copy_buffer_bytes(&self) -> usize {
        self.copy_buffer_bytes
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn prefer_sequential(&self) -> bool {
        self.prefer_sequential
    }

    pub fn file_prefix(&self) -> &String {
        &self.file_prefix
    }

    pub fn file_extension(&self) -> &String {
        &self.file_extension
    }

    /// A copy of this configuration running in parallel mode with `parallelism` workers
    pub fn with_parallelism(&self, parallelism: usize) -> Result<IoConfig, anyhow::Error> {
        IoConfig::new(
            self.copy_buffer_bytes,
            parallelism,
            false,
            &self.file_prefix,
            &self.file_extension,
        )
    }

    /// Part file name for a 1 based `index`, e.g. `part-0007.txt`
    pub fn part_file_name(&self, index: usize) -> String {
        format!("{}{:04}{}", self.file_prefix, index, self.file_extension)
    }

    pub fn part_path(&self, output_dir: &Path, index: usize) -> PathBuf {
        output_dir.join(self.part_file_name(index))
    }
}

impl Default for IoConfig {
    /// 64 KB buffers, all cores, parallel mode, `part-NNNN.txt` files
    fn default() -> Self {
        IoConfig {
            copy_buffer_bytes: DEFAULT_COPY_BUFFER_BYTES,
            parallelism: num_cpus::get(),
            prefer_sequential: false,
            file_prefix: "part-".to_string(),
            file_extension: ".txt".to_string(),
        }
    }
}
