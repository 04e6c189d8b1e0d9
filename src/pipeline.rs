// src/pipeline.rs

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::{info, instrument};

use crate::aggregate::{build_views, Views};
use crate::award::corpus::{build_corpus, CorpusCheckpoint};
use crate::award::Award;
use crate::cancel::reconcile::{reconcile, ReconcileReport};
use crate::cancel::{collapse_statuses, read_feed, Cancellation};
use crate::config::PipelineConfig;
use crate::reference::StateReference;
use crate::table::parquet::{write_parquet, ColumnarRow};
use crate::table::{read_table, write_table, TableRow};

/// Build the award table from the raw per-year documents.
#[instrument(level = "info", skip_all)]
pub fn run_awards(config: &PipelineConfig) -> Result<Vec<Award>> {
    let paths = &config.paths;
    fs::create_dir_all(&paths.clean_dir)
        .with_context(|| format!("creating {}", paths.clean_dir.display()))?;

    let out = paths.awards_path();
    let mut checkpoint = CorpusCheckpoint::new(&out);
    let corpus = build_corpus(&paths.raw_awards_dir, config.years, &mut checkpoint)?;
    // the checkpoint holds pre-cleanup rows; replace it with the final table
    write_table(&out, corpus.awards())?;
    info!(rows = corpus.len(), path = %out.display(), "wrote award table");
    Ok(corpus.into_awards())
}

/// Build the cancellation table from the feed and the award table on disk.
#[instrument(level = "info", skip_all)]
pub fn run_cancellations(config: &PipelineConfig) -> Result<(Vec<Cancellation>, ReconcileReport)> {
    let paths = &config.paths;
    let awards: Vec<Award> = read_table(&paths.awards_path())?;
    let raw = read_feed(&paths.cancellations_feed)?;

    let (mut rows, report) = reconcile(raw, &awards, config.years, &config.reconcile);
    if config.reconcile.collapse_possibly {
        collapse_statuses(&mut rows);
    }

    let out = paths.cancellations_path();
    write_table(&out, &rows)?;
    info!(rows = rows.len(), path = %out.display(), "wrote cancellation table");
    Ok((rows, report))
}

/// Derive every view from the two tables and the state reference, and write them out.
#[instrument(level = "info", skip_all)]
pub fn run_views(config: &PipelineConfig) -> Result<Views> {
    let paths = &config.paths;
    let reference = StateReference::load(&paths.states_reference)?;
    let awards: Vec<Award> = read_table(&paths.awards_path())?;
    let cancellations: Vec<Cancellation> = read_table(&paths.cancellations_path())?;

    let views = build_views(&awards, &cancellations, &reference, config.years, &config.views);
    write_views(&views, &paths.views_path(), config.views.write_parquet)?;
    Ok(views)
}

/// Run all three stages in order.
pub fn run_all(config: &PipelineConfig) -> Result<()> {
    run_awards(config)?;
    run_cancellations(config)?;
    run_views(config)?;
    Ok(())
}

/// Write each view as `<dir>/<name>.csv`, plus `<name>.parquet` when asked.
#[instrument(level = "info", skip(views), fields(dir = %dir.display()))]
pub fn write_views(views: &Views, dir: &Path, parquet: bool) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_view(dir, "complete_awards", &views.complete, parquet)?;
    write_view(dir, "state_grants", &views.state_grants, parquet)?;
    write_view(dir, "state_grants_all_years", &views.state_grants_all_years, parquet)?;
    write_view(dir, "state_cancellations", &views.state_cancellations, parquet)?;
    write_view(dir, "directorate_rates", &views.rates.directorates, parquet)?;
    write_view(dir, "division_rates", &views.rates.divisions, parquet)?;
    write_view(dir, "budget_evolution", &views.budget_evolution, parquet)?;
    write_view(dir, "state_grant_evolution", &views.state_grant_evolution, parquet)?;
    Ok(())
}

fn write_view<R: TableRow + ColumnarRow>(
    dir: &Path,
    name: &str,
    rows: &[R],
    parquet: bool,
) -> Result<()> {
    write_table(&dir.join(format!("{name}.csv")), rows)?;
    if parquet {
        write_parquet(&dir.join(format!("{name}.parquet")), rows)
            .with_context(|| format!("writing view {name} as parquet"))?;
    }
    info!(view = name, rows = rows.len(), "wrote view");
    Ok(())
}
