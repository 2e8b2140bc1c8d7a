use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Error;
use simple_logger::SimpleLogger;

use record_split_sort::charset::Charset;
use record_split_sort::config::IoConfig;
use record_split_sort::key_spec::{KeySpec, LineComparator};
use record_split_sort::merge::MergeEngine;
use record_split_sort::segment::Segment;
use record_split_sort::separator::Separator;
use record_split_sort::sort::Sort;
use record_split_sort::split_engine::{SortedSplitEngine, SplitEngine};

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn create_input(path: &Path, lines: u64) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for i in 0..lines {
        // scrambled ids, the row number keeps lines unique
        let id = i.wrapping_mul(2_654_435_761) % 1_000_003;
        writeln!(writer, "{:07}|name-{}|{}", id, id % 97, i)?;
    }
    writer.flush()?;
    Ok(())
}

fn split(input_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let io = IoConfig::new(1 << 20, 4, false, "chunk-", ".txt")?;
    SplitEngine::new().split_by_parts(input_path, output_dir, 8, &Separator::newline(), &io)
}

fn sort_runs_and_merge(input_path: &Path, runs_dir: &Path, output_path: &Path) -> Result<u64, Error> {
    // order by the name field, then by id
    let key_spec = KeySpec::new(vec![
        Segment::after_delimiter('|', 0, None)?,
        Segment::range(0, 7)?,
    ])?;
    let comparator = LineComparator::new(key_spec);
    let runs = SortedSplitEngine::new(comparator.clone(), Charset::Utf8)
        .split_by_max_bytes(input_path, runs_dir, 1_000_000, &Separator::newline(), &IoConfig::default())?;
    MergeEngine::new().k_way_merge(&runs, output_path, &comparator, Charset::Utf8, &Separator::newline())
}

fn sort_lines(input_path: &Path, output_path: &Path, tmp_path: &Path) -> Result<bool, Error> {
    let mut text_file_sort = Sort::new(vec![input_path.to_path_buf()], output_path.to_path_buf());
    text_file_sort.with_tmp_dir(tmp_path.to_path_buf());
    text_file_sort.with_chunk_size_mb(2);
    text_file_sort.sort()?;
    Sort::new(vec![output_path.to_path_buf()], PathBuf::new()).check()
}

// cargo run -r --example split_sort_merge
pub fn main() -> Result<(), Error> {
    SimpleLogger::new().init()?;
    let demo_dir = PathBuf::from("./target/demo");
    fs::create_dir_all(&demo_dir)?;
    let input_path = demo_dir.join("records.txt");
    create_input(&input_path, 500_000)?;

    let chunks = split(&input_path, &demo_dir.join("chunks"))?;
    log::info!("Split into {} chunks", chunks.len());

    let merged = sort_runs_and_merge(&input_path, &demo_dir.join("runs"), &demo_dir.join("by-name.txt"))?;
    log::info!("Merged {} records", merged);

    let sorted = sort_lines(&input_path, &demo_dir.join("sorted.txt"), &demo_dir)?;
    log::info!("Sorted: {}", sorted);
    Ok(())
}
