// src/aggregate/evolution.rs

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;

use super::{CompleteAward, StateGrants};
use crate::table::parquet::{float, int32, utf8, ColumnarRow};
use crate::table::TableRow;
use arrow::datatypes::Schema as ArrowSchema;

pub const ALL_GROUP: &str = "All";
pub const ALL_STATES_AVG: &str = "All States (Avg)";

/// Summed budget for a year, overall or for one party.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BudgetTotal {
    pub year: i32,
    pub group: String,
    pub total_budget: f64,
}

impl TableRow for BudgetTotal {
    const COLUMNS: &'static [&'static str] = &["Year", "Group", "TotalBudget"];
}

impl ColumnarRow for BudgetTotal {
    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![int32("Year"), utf8("Group", false), float("TotalBudget", false)])
    }
}

/// Per-year `All` totals followed by per-(year, party) totals. Missing budgets count as zero.
#[instrument(level = "debug", skip_all, fields(rows = complete.len()))]
pub fn budget_evolution(complete: &[CompleteAward]) -> Vec<BudgetTotal> {
    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    let mut by_party: BTreeMap<(i32, &str), f64> = BTreeMap::new();
    for row in complete {
        let budget = row.estimated_budget.unwrap_or(0.0);
        *by_year.entry(row.year).or_default() += budget;
        *by_party.entry((row.year, row.party.as_str())).or_default() += budget;
    }

    let overall = by_year.into_iter().map(|(year, total)| BudgetTotal {
        year,
        group: ALL_GROUP.to_string(),
        total_budget: total,
    });
    let parties = by_party.into_iter().map(|((year, party), total)| BudgetTotal {
        year,
        group: party.to_string(),
        total_budget: total,
    });
    overall.chain(parties).collect()
}

/// One point of the state grant trend lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateGrantTrend {
    pub year: i32,
    pub group: String,
    pub grant_count: f64,
    pub state_name: String,
    pub state_code: Option<String>,
    pub party: Option<String>,
}

impl TableRow for StateGrantTrend {
    const COLUMNS: &'static [&'static str] =
        &["Year", "Group", "GrantCount", "StateName", "StateCode", "Party"];
}

impl ColumnarRow for StateGrantTrend {
    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            int32("Year"),
            utf8("Group", false),
            float("GrantCount", false),
            utf8("StateName", false),
            utf8("StateCode", true),
            utf8("Party", true),
        ])
    }
}

/// The cross-state yearly mean, then every per-state row grouped under its party.
#[instrument(level = "debug", skip_all, fields(rows = per_year.len()))]
pub fn state_grant_evolution(per_year: &[StateGrants]) -> Vec<StateGrantTrend> {
    let mut sums: BTreeMap<i32, (u64, usize)> = BTreeMap::new();
    for row in per_year {
        let entry = sums.entry(row.year).or_default();
        entry.0 += row.grant_count;
        entry.1 += 1;
    }

    let mut out: Vec<StateGrantTrend> = sums
        .into_iter()
        .map(|(year, (total, states))| StateGrantTrend {
            year,
            group: ALL_GROUP.to_string(),
            grant_count: total as f64 / states as f64,
            state_name: ALL_STATES_AVG.to_string(),
            state_code: None,
            party: None,
        })
        .collect();
    out.extend(per_year.iter().map(|row| StateGrantTrend {
        year: row.year,
        group: row.party.clone(),
        grant_count: row.grant_count as f64,
        state_name: row.state_name.clone(),
        state_code: Some(row.state_code.clone()),
        party: Some(row.party.clone()),
    }));
    out
}
