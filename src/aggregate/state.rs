// src/aggregate/state.rs

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::CompleteAward;
use crate::cancel::{Cancellation, Status};
use crate::reference::StateReference;
use crate::table::parquet::{float, int32, uint64, utf8, ColumnarRow};
use crate::table::TableRow;
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};

/// Grant count and share of one state in one year (or across all years).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateGrants {
    #[serde(rename = "StateCode")]
    pub state_code: String,
    #[serde(rename = "StateName")]
    pub state_name: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "GrantCount")]
    pub grant_count: u64,
    /// Percent of that year's grants.
    #[serde(rename = "GrantRate")]
    pub grant_rate: f64,
    pub id: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(rename = "Party")]
    pub party: String,
}

impl TableRow for StateGrants {
    const COLUMNS: &'static [&'static str] = &[
        "StateCode",
        "StateName",
        "Year",
        "GrantCount",
        "GrantRate",
        "id",
        "latitude",
        "longitude",
        "Party",
    ];
}

impl ColumnarRow for StateGrants {
    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            utf8("StateCode", false),
            utf8("StateName", false),
            int32("Year"),
            uint64("GrantCount"),
            float("GrantRate", false),
            Field::new("id", DataType::UInt32, true),
            float("latitude", true),
            float("longitude", true),
            utf8("Party", false),
        ])
    }
}

/// Per-(state, year) grant counts; shares are relative to that year's total only.
#[instrument(level = "debug", skip_all, fields(rows = complete.len()))]
pub fn state_grants(complete: &[CompleteAward], reference: &StateReference) -> Vec<StateGrants> {
    let mut counts: BTreeMap<(&str, &str, i32), u64> = BTreeMap::new();
    for row in complete {
        let Some(name) = row.state_name.as_deref() else {
            continue;
        };
        *counts.entry((row.state_code.as_str(), name, row.year)).or_default() += 1;
    }

    let mut year_totals: BTreeMap<i32, u64> = BTreeMap::new();
    for ((_, _, year), n) in &counts {
        *year_totals.entry(*year).or_default() += n;
    }

    let rows: Vec<StateGrants> = counts
        .into_iter()
        .map(|((code, name, year), n)| {
            let info = reference.get(code);
            StateGrants {
                state_code: code.to_string(),
                state_name: name.to_string(),
                year,
                grant_count: n,
                grant_rate: percent(n as f64, year_totals[&year] as f64),
                id: info.and_then(|s| s.id),
                latitude: info.and_then(|s| s.latitude),
                longitude: info.and_then(|s| s.longitude),
                party: reference.party(code, year),
            }
        })
        .collect();
    debug!(rows = rows.len(), years = year_totals.len(), "state grant shares");
    rows
}

/// The per-year rows followed by one "All Years" row per state,
/// tagged with `sentinel` and the 2020-epoch party.
pub fn with_all_years(
    per_year: &[StateGrants],
    reference: &StateReference,
    sentinel: i32,
) -> Vec<StateGrants> {
    let mut sums: BTreeMap<(&str, &str), (u64, &StateGrants)> = BTreeMap::new();
    for row in per_year {
        sums.entry((row.state_code.as_str(), row.state_name.as_str()))
            .or_insert((0, row))
            .0 += row.grant_count;
    }
    let grand_total: u64 = sums.values().map(|(n, _)| n).sum();

    let mut out = per_year.to_vec();
    out.extend(sums.into_iter().map(|((code, name), (n, first))| StateGrants {
        state_code: code.to_string(),
        state_name: name.to_string(),
        year: sentinel,
        grant_count: n,
        grant_rate: percent(n as f64, grand_total as f64),
        id: first.id,
        latitude: first.latitude,
        longitude: first.longitude,
        party: reference.party_2020(code),
    }));
    out
}

/// Cancellations per (year, state, status).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateCancellations {
    pub year: i32,
    pub state_code: String,
    pub state_name: String,
    pub status: Status,
    pub count: u64,
    pub party: String,
}

impl TableRow for StateCancellations {
    const COLUMNS: &'static [&'static str] =
        &["Year", "StateCode", "StateName", "Status", "Count", "Party"];
}

impl ColumnarRow for StateCancellations {
    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            int32("Year"),
            utf8("StateCode", false),
            utf8("StateName", false),
            utf8("Status", false),
            uint64("Count"),
            utf8("Party", false),
        ])
    }
}

pub fn cancellations_by_state(
    cancellations: &[Cancellation],
    reference: &StateReference,
) -> Vec<StateCancellations> {
    let mut counts: BTreeMap<(i32, &str, &str, &Status), u64> = BTreeMap::new();
    for c in cancellations {
        let (Some(code), Some(status)) = (c.state_code.as_deref(), c.status.as_ref()) else {
            continue;
        };
        let Some(name) = reference.name(code) else {
            continue;
        };
        *counts.entry((c.year, code, name, status)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((year, code, name, status), n)| StateCancellations {
            year,
            state_code: code.to_string(),
            state_name: name.to_string(),
            status: status.clone(),
            count: n,
            party: reference.party(code, year),
        })
        .collect()
}

pub(crate) fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixtures::cancellation;
    use crate::reference::fixtures::reference;

    fn complete(id: usize, state: &str, year: i32) -> CompleteAward {
        CompleteAward {
            award_id: id.to_string(),
            state_code: state.into(),
            state_name: Some(format!("{state}-name")),
            year,
            estimated_budget: Some(1.0),
            party: String::new(),
        }
    }

    fn sample() -> Vec<CompleteAward> {
        let mut rows = Vec::new();
        let plan = [
            ("CA", 2021, 3),
            ("OH", 2021, 1),
            ("CA", 2022, 1),
            ("AZ", 2022, 3),
            ("OH", 2025, 2),
        ];
        let mut id = 0;
        for (st, year, n) in plan {
            for _ in 0..n {
                rows.push(complete(id, st, year));
                id += 1;
            }
        }
        rows
    }

    #[test]
    fn shares_sum_to_100_within_each_year() {
        let rows = state_grants(&sample(), &reference());
        let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
        for r in &rows {
            *by_year.entry(r.year).or_default() += r.grant_rate;
        }
        for (year, total) in by_year {
            assert!((total - 100.0).abs() < 1e-9, "year {year} sums to {total}");
        }
        let ca21 = rows.iter().find(|r| r.state_code == "CA" && r.year == 2021).unwrap();
        assert_eq!(ca21.grant_count, 3);
        assert_eq!(ca21.grant_rate, 75.0);
        assert_eq!(ca21.id, Some(6));
        assert_eq!(ca21.party, "Democrat");
    }

    #[test]
    fn rows_without_state_name_are_not_grouped() {
        let mut rows = sample();
        rows[0].state_name = None;
        let out = state_grants(&rows, &reference());
        let ca21 = out.iter().find(|r| r.state_code == "CA" && r.year == 2021).unwrap();
        assert_eq!(ca21.grant_count, 2);
    }

    #[test]
    fn all_years_rows_are_appended_with_sentinel() {
        let r = reference();
        let per_year = state_grants(&sample(), &r);
        let combined = with_all_years(&per_year, &r, 0);
        assert_eq!(&combined[..per_year.len()], &per_year[..]);

        let all: Vec<&StateGrants> = combined.iter().filter(|g| g.year == 0).collect();
        assert_eq!(all.len(), 3);
        let total: f64 = all.iter().map(|g| g.grant_rate).sum();
        assert!((total - 100.0).abs() < 1e-9);

        let oh = all.iter().find(|g| g.state_code == "OH").unwrap();
        assert_eq!(oh.grant_count, 3);
        assert_eq!(oh.grant_rate, 30.0);
        let az = all.iter().find(|g| g.state_code == "AZ").unwrap();
        assert_eq!(az.party, "Republican", "all-years rows use the 2020 epoch");
    }

    #[test]
    fn cancellations_grouped_by_state_year_status() {
        let rows = vec![
            cancellation("1", Some("CA"), 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("2", Some("CA"), 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("3", Some("CA"), 2025, Status::Reinstated, "MPS", "PHY"),
            cancellation("4", Some("ZZ"), 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("5", None, 2025, Status::Terminated, "MPS", "PHY"),
        ];
        let out = cancellations_by_state(&rows, &reference());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].status, Status::Terminated);
        assert_eq!(out[0].count, 2);
        assert_eq!(out[0].state_name, "California");
        assert_eq!(out[1].status, Status::Reinstated);
        assert_eq!(out[1].count, 1);
    }
}
