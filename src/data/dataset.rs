use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::info;
use serde::de::DeserializeOwned;

use crate::{Result, TrainErr};

/// Reads one example per line from a JSON lines file. Blank lines are skipped.
///
/// # Errors
/// `TrainErr::Io` if the file cannot be read, `TrainErr::Dataset` naming the first malformed
/// line (1-based).
pub fn load_jsonl<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut examples = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let example = serde_json::from_str(&line).map_err(|e| TrainErr::Dataset {
            path: path.to_path_buf(),
            line: i + 1,
            msg: e.to_string(),
        })?;
        examples.push(example);
    }

    info!("loaded {} examples from {}", examples.len(), path.display());
    Ok(examples)
}
