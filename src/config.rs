// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::cancel::reconcile::{default_manual_fixes, FieldPatch};

/// Inclusive range of fiscal years the pipeline covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearRange {
    pub first: i32,
    pub last: i32,
}

impl Default for YearRange {
    fn default() -> Self {
        Self {
            first: 2021,
            last: 2025,
        }
    }
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.first..=self.last).contains(&year)
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> {
        self.first..=self.last
    }

    /// Number of fiscal years in the range, used to turn totals into yearly averages.
    pub fn len(&self) -> usize {
        if self.last < self.first {
            0
        } else {
            (self.last - self.first + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where inputs are read from and outputs are written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding one `<year>/` directory (or `<year>.zip`) of award JSON documents
    /// per fiscal year.
    pub raw_awards_dir: PathBuf,
    pub cancellations_feed: PathBuf,
    pub states_reference: PathBuf,
    pub clean_dir: PathBuf,
    pub awards_file: String,
    pub cancellations_file: String,
    pub views_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_awards_dir: PathBuf::from("raw_data/full_nsf_awards_data"),
            cancellations_feed: PathBuf::from(
                "raw_data/original_data/nsf_terminations_airtable.csv",
            ),
            states_reference: PathBuf::from("clean_data/us_states.csv"),
            clean_dir: PathBuf::from("clean_data"),
            awards_file: "nsf_awards_full.csv".into(),
            cancellations_file: "nsf_cancellations.csv".into(),
            views_dir: "views".into(),
        }
    }
}

impl PathsConfig {
    pub fn awards_path(&self) -> PathBuf {
        self.clean_dir.join(&self.awards_file)
    }

    pub fn cancellations_path(&self) -> PathBuf {
        self.clean_dir.join(&self.cancellations_file)
    }

    pub fn views_path(&self) -> PathBuf {
        self.clean_dir.join(&self.views_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Write "Possibly Terminated"/"Possibly Reinstated" as their base status.
    pub collapse_possibly: bool,
    /// Per-award corrections applied last, always overwriting.
    pub manual_fixes: BTreeMap<String, FieldPatch>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            collapse_possibly: true,
            manual_fixes: default_manual_fixes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Minimum number of awards over the whole period for a directorate to be shown in rate views.
    pub major_threshold: u64,
    /// Year value tagging "All Years" rows.
    pub all_years_sentinel: i32,
    pub write_parquet: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            major_threshold: 100,
            all_years_sentinel: 0,
            write_parquet: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub years: YearRange,
    pub reconcile: ReconcileConfig,
    pub views: ViewConfig,
}

impl PipelineConfig {
    /// Load from a YAML file; with no path the defaults are used as-is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}
