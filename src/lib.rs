//! This crate splits, sorts and merges very large delimited text files. For example CSV, TSV or
//! log files with billions of lines.
//!
//! The building blocks can be used on their own or together:
//!
//! * [split_plan::SplitPlanner] cuts a file into byte ranges that end on record boundaries without
//! reading more than a few bytes around each cut.
//! * [parallel_splitter::ParallelRangeSplitter] copies the planned ranges into part files on a thread
//! pool, and [streaming_splitter::SequentialStreamingSplitter] does the same in a single streaming pass.
//! * [part_writer::InMemorySortingPartWriter] sorts each part in memory before writing it, which
//! [split_engine::SortedSplitEngine] uses to turn a file into sorted runs.
//! * [merge::MergeEngine] merges sorted runs into one output with a stable k-way merge.
//! * [sort::Sort] drives the complete external sort.
//!
//! Records are compared by a [key_spec::KeySpec], a list of character ranges or delimiter based
//! segments of each line, optionally with a custom comparator for the extracted key.
//!
//! # Examples
//! ```
//! use std::path::PathBuf;
//! use record_split_sort::key_spec::KeySpec;
//! use record_split_sort::segment::Segment;
//! use record_split_sort::sort::Sort;
//!
//! // optimized for use with Jemalloc
//! use tikv_jemallocator::Jemalloc;
//! #[global_allocator]
//! static GLOBAL: Jemalloc = Jemalloc;
//!
//! // parallel record sort
//! fn sort_records(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut record_sort = Sort::new(vec![input.clone()], output.clone());
//!
//!     // sort by the text following the first tab
//!     record_sort.with_key_spec(KeySpec::new(vec![Segment::after_delimiter('\t', 0, None)?])?);
//!
//!     // set number of CPU cores the sort will attempt to use. When given the number that exceeds
//!     // the number of available CPU cores the work will be split among available cores with
//!     // somewhat degraded performance. The default is to use all available cores.
//!     record_sort.with_tasks(2);
//!
//!     // set the directory for intermediate results. The default is the system temp dir -
//!     // std::env::temp_dir(), however, for large files it is recommended to provide a dedicated
//!     // directory for intermediate files, preferably on the same file system as the output result.
//!     record_sort.with_tmp_dir(tmp);
//!
//!     record_sort.sort()
//! }
//! ```
//!

pub(crate) mod line_decoder;
pub(crate) mod range_command;
pub(crate) mod chunk_reader;
pub(crate) mod heap_item;

pub mod error;
pub mod config;
pub mod charset;
pub mod segment;
pub mod key_spec;
pub mod separator;
pub mod line_record;
pub mod split_plan;
pub mod part_writer;
pub mod parallel_splitter;
pub mod streaming_splitter;
pub mod merge;
pub mod split_engine;
pub mod sort;
