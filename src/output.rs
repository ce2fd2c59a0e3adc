//! Report table output.
//!
//! Tables are written as CSV (header row first) or pretty-printed JSON, to a
//! file or to stdout.

use std::fmt::Debug;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Writes `rows` as CSV with a header row.
pub fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `rows` as a pretty-printed JSON array.
pub fn write_json<T: Serialize, W: Write>(rows: &[T], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, rows).map_err(io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes `rows` in `format` to `path`, or to stdout when `path` is `None`.
#[tracing::instrument(skip_all, fields(?format, path = ?path, rows = rows.len()))]
pub fn write_table<T: Serialize>(rows: &[T], format: OutputFormat, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), rows = rows.len(), ?format, "Writing report");
            let file = File::create(path)?;
            write_to(rows, format, file)
        }
        None => write_to(rows, format, io::stdout().lock()),
    }
}

fn write_to<T: Serialize, W: Write>(rows: &[T], format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(rows, writer),
        OutputFormat::Json => write_json(rows, writer),
    }
}
