// src/table/mod.rs

pub mod parquet;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// A row of one of the flat CSV tables the pipeline reads or writes.
pub trait TableRow: Serialize {
    /// Header, in serialization order. Written on its own when a table has no rows.
    const COLUMNS: &'static [&'static str];
}

/// Read every row of a CSV table with a header line.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("opening table {}", path.display()))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize().enumerate() {
        let row: T = rec
            .with_context(|| format!("CSV parse error in {} at record {}", path.display(), idx))?;
        rows.push(row);
    }
    debug!(path = %path.display(), rows = rows.len(), "read table");
    Ok(rows)
}

/// Write `rows` to `path`, replacing any existing file.
/// Writes go to a dot-prefixed tmp file first and are renamed into place.
#[instrument(level = "debug", skip(rows), fields(path = %path.display(), rows = rows.len()))]
pub fn write_table<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
    }
    let tmp_path = tmp_path_for(path);
    {
        let file = File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        serialize_rows(BufWriter::new(file), rows, true)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

/// Append `rows` to `path`, creating it (with header) when `with_header` is set.
pub fn append_rows<T: TableRow>(path: &Path, rows: &[T], with_header: bool) -> Result<()> {
    let file = if with_header {
        File::create(path)
    } else {
        OpenOptions::new().append(true).create(true).open(path)
    }
    .with_context(|| format!("opening {} for append", path.display()))?;
    serialize_rows(BufWriter::new(file), rows, with_header)
        .with_context(|| format!("appending to {}", path.display()))
}

fn serialize_rows<W: std::io::Write, T: TableRow>(
    out: W,
    rows: &[T],
    with_header: bool,
) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
    if with_header {
        wtr.write_record(T::COLUMNS)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".into());
    path.with_file_name(format!(".{}.tmp", name))
}
