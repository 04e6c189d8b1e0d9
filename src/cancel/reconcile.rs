// src/cancel/reconcile.rs
//
// Backfills the normalized cancellation feed against the award corpus.
// Resolvers run in a fixed order; each declares whether it only fills
// empty fields or overwrites whatever is there.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument};

use super::{normalize_feed, Cancellation, PendingCancellation, RawCancellation};
use crate::award::Award;
use crate::config::{ReconcileConfig, YearRange};
use crate::names::clean_names;

static ADVANCE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)advance").expect("valid ADVANCE regex"));

/// How a resolver treats a field that already has a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    FillIfNull,
    Overwrite,
}

/// Category values a resolver proposes for one row. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FieldPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directorate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directorate_abbr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division_abbr: Option<String>,
}

impl FieldPatch {
    /// Apply to `row` under `policy`; true when any field changed.
    pub fn apply(&self, row: &mut Cancellation, policy: FillPolicy) -> bool {
        let mut changed = false;
        changed |= set_field(&mut row.directorate, &self.directorate, policy);
        changed |= set_field(&mut row.directorate_abbr, &self.directorate_abbr, policy);
        changed |= set_field(&mut row.division, &self.division, policy);
        changed |= set_field(&mut row.division_abbr, &self.division_abbr, policy);
        changed
    }
}

fn set_field(slot: &mut Option<String>, value: &Option<String>, policy: FillPolicy) -> bool {
    let Some(v) = value else {
        return false;
    };
    match policy {
        FillPolicy::FillIfNull if slot.is_some() => false,
        _ if slot.as_ref() == Some(v) => false,
        _ => {
            *slot = Some(v.clone());
            true
        }
    }
}

fn patch(dir: &str, abbr: &str, div: &str, div_abbr: &str) -> FieldPatch {
    FieldPatch {
        directorate: Some(dir.into()),
        directorate_abbr: Some(abbr.into()),
        division: Some(div.into()),
        division_abbr: Some(div_abbr.into()),
    }
}

/// Corrections for award IDs whose upstream categories are known to be wrong,
/// taken from the NSF award pages.
pub fn default_manual_fixes() -> BTreeMap<String, FieldPatch> {
    let mut fixes = BTreeMap::new();
    fixes.insert(
        "1943467".to_string(),
        FieldPatch {
            division: Some("Division of Information & Intelligent Systems".into()),
            division_abbr: Some("IIS".into()),
            ..Default::default()
        },
    );
    fixes.insert(
        "2007891".to_string(),
        patch(
            "Directorate for Computer and Information Science and Engineering",
            "CSE",
            "Division of Computing and Communication Foundations",
            "CCF",
        ),
    );
    fixes.insert(
        "2008428".to_string(),
        patch(
            "Directorate for STEM Education",
            "EDU",
            "Div. of Equity for Excellence in STEM",
            "EES",
        ),
    );
    fixes.insert(
        "2020709".to_string(),
        FieldPatch {
            division: Some("Div. of Equity for Excellence in STEM".into()),
            division_abbr: Some("EES".into()),
            ..Default::default()
        },
    );
    fixes
}

/// Lookups over the award corpus, keyed by text award ID.
/// Where an ID repeats, the first row in corpus order wins.
/// Blank IDs are never indexed, so they never match.
pub struct AwardIndex<'a> {
    by_id: HashMap<&'a str, &'a Award>,
    directorate_by_abbr: HashMap<&'a str, &'a str>,
}

impl<'a> AwardIndex<'a> {
    pub fn new(awards: &'a [Award]) -> Self {
        let mut by_id = HashMap::with_capacity(awards.len());
        let mut directorate_by_abbr = HashMap::new();
        for a in awards {
            if !a.award_id.is_empty() {
                by_id.entry(a.award_id.as_str()).or_insert(a);
            }
            if let (Some(abbr), Some(dir)) =
                (a.directorate_abbr.as_deref(), a.directorate.as_deref())
            {
                directorate_by_abbr.entry(abbr).or_insert(dir);
            }
        }
        Self {
            by_id,
            directorate_by_abbr,
        }
    }

    pub fn get(&self, award_id: &str) -> Option<&'a Award> {
        self.by_id.get(award_id).copied()
    }

    pub fn contains(&self, award_id: &str) -> bool {
        self.by_id.contains_key(award_id)
    }

    pub fn directorate_for(&self, abbr: &str) -> Option<&'a str> {
        self.directorate_by_abbr.get(abbr).copied()
    }
}

/// One named step of the category backfill cascade.
pub trait Resolver {
    fn name(&self) -> &'static str;
    fn policy(&self) -> FillPolicy;
    fn propose(&self, row: &PendingCancellation) -> Option<FieldPatch>;
}

/// Division and directorate code of the matching award.
pub struct CorpusJoin<'a, 'b> {
    pub index: &'b AwardIndex<'a>,
}

impl Resolver for CorpusJoin<'_, '_> {
    fn name(&self) -> &'static str {
        "corpus_join"
    }

    fn policy(&self) -> FillPolicy {
        FillPolicy::FillIfNull
    }

    fn propose(&self, row: &PendingCancellation) -> Option<FieldPatch> {
        let award = self.index.get(&row.record.award_id)?;
        Some(FieldPatch {
            directorate: None,
            directorate_abbr: award.directorate_abbr.clone(),
            division: award.division.clone(),
            division_abbr: award.division_abbr.clone(),
        })
    }
}

/// Full directorate name from its code, first name seen in the corpus.
pub struct DirectorateByAbbr<'a, 'b> {
    pub index: &'b AwardIndex<'a>,
}

impl Resolver for DirectorateByAbbr<'_, '_> {
    fn name(&self) -> &'static str {
        "directorate_by_abbr"
    }

    fn policy(&self) -> FillPolicy {
        FillPolicy::FillIfNull
    }

    fn propose(&self, row: &PendingCancellation) -> Option<FieldPatch> {
        if row.record.directorate.is_some() {
            return None;
        }
        let abbr = row.record.directorate_abbr.as_deref()?;
        let name = self.index.directorate_for(abbr)?;
        Some(FieldPatch {
            directorate: Some(name.to_string()),
            ..Default::default()
        })
    }
}

/// ADVANCE grants missing their categories belong to STEM Education / EES.
pub struct AdvanceProgram;

impl Resolver for AdvanceProgram {
    fn name(&self) -> &'static str {
        "advance_program"
    }

    fn policy(&self) -> FillPolicy {
        FillPolicy::FillIfNull
    }

    fn propose(&self, row: &PendingCancellation) -> Option<FieldPatch> {
        let title = row.project_title.as_deref()?;
        if !ADVANCE_TITLE.is_match(title) {
            return None;
        }
        if row.record.directorate_abbr.is_some() && row.record.division.is_some() {
            return None;
        }
        Some(patch(
            "Directorate for STEM Education",
            "EDU",
            "Div. of Equity for Excellence in STEM",
            "EES",
        ))
    }
}

/// Configured per-award corrections.
pub struct ManualOverrides<'a> {
    pub fixes: &'a BTreeMap<String, FieldPatch>,
}

impl Resolver for ManualOverrides<'_> {
    fn name(&self) -> &'static str {
        "manual_overrides"
    }

    fn policy(&self) -> FillPolicy {
        FillPolicy::Overwrite
    }

    fn propose(&self, row: &PendingCancellation) -> Option<FieldPatch> {
        self.fixes.get(&row.record.award_id).cloned()
    }
}

/// Counters collected while reconciling; logged, never raised.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub read: usize,
    pub filtered: usize,
    pub kept: usize,
    pub matched: usize,
    pub budget_mismatches: usize,
    pub stages: Vec<(&'static str, usize)>,
}

/// The corpus budget replaces the feed budget for every matched row.
/// Returns how many rows actually disagreed.
pub fn apply_corpus_budgets(rows: &mut [PendingCancellation], index: &AwardIndex<'_>) -> usize {
    let mut mismatches = 0;
    for row in rows.iter_mut() {
        if let Some(award) = index.get(&row.record.award_id) {
            if row.record.estimated_budget != Some(award.estimated_budget) {
                mismatches += 1;
            }
            row.record.estimated_budget = Some(award.estimated_budget);
        }
    }
    mismatches
}

/// Run one resolver over all rows; returns the number of rows it changed.
pub fn run_resolver(resolver: &dyn Resolver, rows: &mut [PendingCancellation]) -> usize {
    let policy = resolver.policy();
    let mut touched = 0;
    for row in rows.iter_mut() {
        if let Some(p) = resolver.propose(row) {
            if p.apply(&mut row.record, policy) {
                touched += 1;
            }
        }
    }
    touched
}

/// Backfill and budget-align normalized feed rows against the corpus,
/// then drop the title and clean display names.
pub fn resolve(
    mut rows: Vec<PendingCancellation>,
    awards: &[Award],
    config: &ReconcileConfig,
    report: &mut ReconcileReport,
) -> Vec<Cancellation> {
    let index = AwardIndex::new(awards);
    report.matched = rows
        .iter()
        .filter(|r| index.contains(&r.record.award_id))
        .count();

    let join = CorpusJoin { index: &index };
    let touched = run_resolver(&join, &mut rows);
    report.stages.push((join.name(), touched));

    report.budget_mismatches = apply_corpus_budgets(&mut rows, &index);

    let by_abbr = DirectorateByAbbr { index: &index };
    let manual = ManualOverrides {
        fixes: &config.manual_fixes,
    };
    let rest: [&dyn Resolver; 3] = [&by_abbr, &AdvanceProgram, &manual];
    for resolver in rest {
        let touched = run_resolver(resolver, &mut rows);
        report.stages.push((resolver.name(), touched));
    }

    rows.into_iter()
        .map(|p| {
            let mut rec = p.record;
            clean_names(&mut rec.directorate, &mut rec.division);
            rec
        })
        .collect()
}

/// Build the cancellation table from the raw feed and the award corpus.
#[instrument(level = "info", skip_all, fields(feed_rows = raw.len(), awards = awards.len()))]
pub fn reconcile(
    raw: Vec<RawCancellation>,
    awards: &[Award],
    years: YearRange,
    config: &ReconcileConfig,
) -> (Vec<Cancellation>, ReconcileReport) {
    let feed = normalize_feed(raw, years);
    let mut report = ReconcileReport {
        read: feed.read,
        filtered: feed.no_year + feed.out_of_range + feed.territory,
        ..Default::default()
    };
    let rows = resolve(feed.rows, awards, config, &mut report);
    report.kept = rows.len();

    info!(
        read = report.read,
        filtered = report.filtered,
        kept = report.kept,
        matched = report.matched,
        unmatched = report.kept - report.matched,
        budget_mismatches = report.budget_mismatches,
        stages = ?report.stages,
        "reconciled cancellations"
    );
    (rows, report)
}
