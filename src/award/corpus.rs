// src/award/corpus.rs

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, instrument};

use super::source::{discover_year, YearPartition};
use super::{parse_award_document, Award, Exclusion, Extraction};
use crate::config::YearRange;
use crate::names::clean_names;
use crate::table::append_rows;

/// Administrative units dropped from the corpus; they are not research programs.
pub const EXCLUDED_DIRECTORATES: &[&str] = &["IRM", "BFA", "NSB", "OCIO"];

/// Result of running the extractor over one fiscal year.
#[derive(Debug, Default)]
pub struct YearExtract {
    pub year: i32,
    pub documents: usize,
    pub awards: Vec<Award>,
    pub excluded: BTreeMap<Exclusion, usize>,
}

/// Extract every document of a partition on the rayon pool.
/// Output order follows the sorted document list.
#[instrument(level = "info", skip(partition), fields(year = partition.year))]
pub fn extract_year(partition: &YearPartition) -> Result<YearExtract> {
    let start = Instant::now();
    let year = partition.year;
    let docs = partition.documents()?;

    let results: Vec<Extraction> = docs
        .par_iter()
        .map(|doc| {
            let bytes = doc.bytes()?;
            parse_award_document(&bytes, year).with_context(|| format!("parsing {}", doc.name()))
        })
        .collect::<Result<_>>()?;

    let mut out = YearExtract {
        year,
        documents: docs.len(),
        ..Default::default()
    };
    for res in results {
        match res {
            Extraction::Kept(award) => out.awards.push(award),
            Extraction::Excluded(reason) => *out.excluded.entry(reason).or_default() += 1,
        }
    }
    info!(
        documents = out.documents,
        kept = out.awards.len(),
        excluded = ?out.excluded,
        elapsed = ?start.elapsed(),
        "extracted year"
    );
    Ok(out)
}

/// The consolidated award table, grown one fiscal year at a time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AwardCorpus {
    awards: Vec<Award>,
}

impl AwardCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one year's rows into the corpus.
    pub fn extended(mut self, rows: Vec<Award>) -> Self {
        self.awards.extend(rows);
        self
    }

    /// Corpus-wide cleanup: drop administrative units, then clean display names.
    pub fn cleaned(self) -> Self {
        let awards = self
            .awards
            .into_iter()
            .filter(|a| {
                a.directorate_abbr
                    .as_deref()
                    .map_or(true, |abbr| !EXCLUDED_DIRECTORATES.contains(&abbr))
            })
            .map(|mut a| {
                clean_names(&mut a.directorate, &mut a.division);
                a
            })
            .collect();
        Self { awards }
    }

    pub fn awards(&self) -> &[Award] {
        &self.awards
    }

    pub fn len(&self) -> usize {
        self.awards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.awards.is_empty()
    }

    pub fn into_awards(self) -> Vec<Award> {
        self.awards
    }
}

/// Incremental on-disk copy of the corpus: the first non-empty year
/// truncates the file and writes the header, later years append.
pub struct CorpusCheckpoint {
    path: PathBuf,
    header_written: bool,
}

impl CorpusCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header_written: false,
        }
    }

    pub fn append(&mut self, rows: &[Award]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        append_rows(&self.path, rows, !self.header_written)?;
        self.header_written = true;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Extract every year in `years`, checkpointing after each, and return the cleaned corpus.
/// The caller owns the final write.
#[instrument(level = "info", skip(raw_root, checkpoint), fields(root = %raw_root.display()))]
pub fn build_corpus(
    raw_root: &Path,
    years: YearRange,
    checkpoint: &mut CorpusCheckpoint,
) -> Result<AwardCorpus> {
    let mut corpus = AwardCorpus::new();
    for year in years.iter() {
        let partition = discover_year(raw_root, year);
        let extract = extract_year(&partition)?;
        checkpoint
            .append(&extract.awards)
            .with_context(|| format!("checkpointing year {}", year))?;
        corpus = corpus.extended(extract.awards);
        info!(year, total = corpus.len(), "{} completed", year);
    }
    let raw_len = corpus.len();
    let corpus = corpus.cleaned();
    info!(
        kept = corpus.len(),
        dropped = raw_len - corpus.len(),
        "applied corpus cleanup"
    );
    Ok(corpus)
}
