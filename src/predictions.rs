use std::{
    fmt::Display,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use log::info;

use crate::{Result, evaluation::TaskPredictions};

pub const SENTIMENT_COLUMN: &str = "Predicted_Sentiment";
pub const PARAPHRASE_COLUMN: &str = "Predicted_Is_Paraphrase";
/// Misspelled on purpose, downstream graders match on it.
pub const SIMILARITY_COLUMN: &str = "Predicted_Similiary";

/// Writes one prediction file: a header naming the two columns, then one `id , prediction` row
/// per example in evaluation order.
///
/// # Arguments
/// * `path` - The output file, its parent directories are created if needed.
/// * `column` - The name of the prediction column.
/// * `predictions` - What to write.
pub fn write_predictions<T: Display, P: AsRef<Path>>(
    path: P,
    column: &str,
    predictions: &TaskPredictions<T>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "id \t {column} ")?;
    for (id, prediction) in predictions.ids.iter().zip(&predictions.predictions) {
        writeln!(out, "{id} , {prediction} ")?;
    }
    out.flush()?;

    info!("wrote {} predictions to {}", predictions.len(), path.display());
    Ok(())
}
