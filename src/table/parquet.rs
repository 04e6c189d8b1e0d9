// src/table/parquet.rs

use anyhow::{Context, Result};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::json::ReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
    sync::Arc,
};
use tracing::instrument;

const BATCH_ROWS: usize = 8192;

/// A view row with a fixed Arrow schema.
/// Field names must match the row's serde names.
pub trait ColumnarRow: Serialize {
    fn schema() -> ArrowSchema;
}

pub fn utf8(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Utf8, nullable)
}

pub fn float(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Float64, nullable)
}

pub fn int32(name: &str) -> Field {
    Field::new(name, DataType::Int32, false)
}

pub fn uint64(name: &str) -> Field {
    Field::new(name, DataType::UInt64, false)
}

/// Write `rows` as a single Snappy-compressed Parquet file, via tmp + rename.
#[instrument(level = "debug", skip(rows), fields(path = %path.display(), rows = rows.len()))]
pub fn write_parquet<R: ColumnarRow>(path: &Path, rows: &[R]) -> Result<()> {
    let schema = Arc::new(R::schema());
    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(BATCH_ROWS)
        .build_decoder()
        .context("building row decoder")?;

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema, Some(props))
        .context("creating Arrow writer")?;

    for chunk in rows.chunks(BATCH_ROWS) {
        decoder
            .serialize(chunk)
            .with_context(|| format!("encoding rows for {}", path.display()))?;
        if let Some(batch) = decoder.flush()? {
            writer.write(&batch).context("writing record batch")?;
        }
    }
    writer.close().context("closing parquet writer")?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
