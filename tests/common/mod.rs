use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use data_encoding::HEXLOWER;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn setup() {
    let results_dir_path = PathBuf::from_str("./target/results/").unwrap();

    if !results_dir_path.exists() {
        fs::create_dir_all(&results_dir_path).unwrap_or_else(|_|
            panic!("Failed to create results directory: {:?}", results_dir_path)
        );
    }
    // several test binaries share the process wide logger setup, the first one wins
    let _ = simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Warn).init();
}

#[allow(dead_code)]
pub fn read_lines(path: &Path) -> Result<Vec<String>, anyhow::Error> {
    let reader = BufReader::new(File::open(path)?);
    let lines = reader.lines().collect::<Result<Vec<String>, std::io::Error>>()?;
    Ok(lines)
}

#[allow(dead_code)]
pub fn temp_file_name(dir: &str) -> PathBuf {
    let mut result = PathBuf::from(dir);
    let name = HEXLOWER.encode(&rand::random::<[u8; 16]>());
    result.push(name);
    result
}

#[allow(dead_code)]
pub fn temp_dir_name(dir: &str) -> Result<PathBuf, anyhow::Error> {
    let path = temp_file_name(dir);
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Tab separated records: a random id, a random hex tag and a row number. Returns the lines
/// as written, without their line feed.
#[allow(dead_code)]
pub fn write_records(path: &Path, count: usize, seed: u64) -> Result<Vec<String>, anyhow::Error> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut writer = BufWriter::new(File::create(path)?);
    let mut lines = Vec::with_capacity(count);
    for row in 0..count {
        let id: u32 = rng.gen_range(0..100_000);
        let tag = HEXLOWER.encode(&rng.gen::<[u8; 4]>());
        let line = format!("{:06}\t{}\t{}", id, tag, row);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        lines.push(line);
    }
    writer.flush()?;
    Ok(lines)
}

#[allow(dead_code)]
pub fn concat(parts: &[PathBuf]) -> Result<Vec<u8>, anyhow::Error> {
    let mut all = Vec::new();
    for part in parts {
        all.extend(fs::read(part)?);
    }
    Ok(all)
}
