// src/award/source.rs

use anyhow::{Context, Result};
use glob::glob;
use std::{
    borrow::Cow,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Where one fiscal year's raw award documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearSource {
    /// `<root>/<year>/*.json`
    Directory(PathBuf),
    /// `<root>/<year>.zip`, JSON entries at any depth
    Archive(PathBuf),
    Missing,
}

#[derive(Debug, Clone)]
pub struct YearPartition {
    pub year: i32,
    pub source: YearSource,
}

/// A raw document, either still on disk or already buffered from an archive.
#[derive(Debug)]
pub enum RawDocument {
    File(PathBuf),
    Buffered { name: String, bytes: Vec<u8> },
}

impl RawDocument {
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            RawDocument::File(p) => p.to_string_lossy(),
            RawDocument::Buffered { name, .. } => Cow::Borrowed(name),
        }
    }

    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            RawDocument::File(p) => {
                let buf = fs::read(p).with_context(|| format!("reading {}", p.display()))?;
                Ok(Cow::Owned(buf))
            }
            RawDocument::Buffered { bytes, .. } => Ok(Cow::Borrowed(bytes)),
        }
    }
}

/// Locate the partition for `year`; a directory wins over an archive.
pub fn discover_year(raw_root: &Path, year: i32) -> YearPartition {
    let dir = raw_root.join(year.to_string());
    let archive = raw_root.join(format!("{}.zip", year));
    let source = if dir.is_dir() {
        YearSource::Directory(dir)
    } else if archive.is_file() {
        YearSource::Archive(archive)
    } else {
        YearSource::Missing
    };
    YearPartition { year, source }
}

impl YearPartition {
    /// All documents of the partition, sorted by name so extraction output is stable.
    pub fn documents(&self) -> Result<Vec<RawDocument>> {
        let mut docs = match &self.source {
            YearSource::Directory(dir) => list_json_files(dir)?,
            YearSource::Archive(path) => load_json_archive(path)?,
            YearSource::Missing => {
                warn!(year = self.year, "no raw award partition found");
                Vec::new()
            }
        };
        docs.sort_by(|a, b| a.name().cmp(&b.name()));
        debug!(year = self.year, documents = docs.len(), "listed partition");
        Ok(docs)
    }
}

fn list_json_files(dir: &Path) -> Result<Vec<RawDocument>> {
    let pattern = format!("{}/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut docs = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("bad glob pattern {}", pattern))? {
        let path = entry.with_context(|| format!("listing {}", dir.display()))?;
        if path.is_file() {
            docs.push(RawDocument::File(path));
        }
    }
    Ok(docs)
}

/// Buffer every `.json` entry of a zip archive in memory.
fn load_json_archive(path: &Path) -> Result<Vec<RawDocument>> {
    let file = File::open(path).with_context(|| format!("Failed to open ZIP file: {:?}", path))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("Failed to read ZIP archive: {:?}", path))?;

    let mut docs = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{} in {:?}", i, path))?;
        let name = entry.name().to_string();
        if !entry.is_file() || !name.to_lowercase().ends_with(".json") {
            continue;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {} into memory", name))?;
        docs.push(RawDocument::Buffered { name, bytes });
    }
    Ok(docs)
}
