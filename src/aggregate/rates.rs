// src/aggregate/rates.rs

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use super::state::percent;
use crate::award::Award;
use crate::cancel::{Cancellation, Status};
use crate::config::{ViewConfig, YearRange};
use crate::table::parquet::{float, int32, uint64, utf8, ColumnarRow};
use crate::table::TableRow;
use arrow::datatypes::{Field, Schema as ArrowSchema};

/// Volume and cancellation statistics for one directorate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectorateRate {
    pub directorate_abbr: String,
    pub directorate: String,
    pub year: i32,
    /// Yearly average on "All Years" rows, raw count otherwise.
    pub total_grants: f64,
    pub terminated: u64,
    pub reinstated: u64,
    pub cancelled: u64,
    pub cancel_rate: f64,
    pub termination_rate: f64,
}

/// Volume and cancellation statistics for one division.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DivisionRate {
    pub directorate_abbr: String,
    pub directorate: String,
    pub division_abbr: String,
    pub division: String,
    pub year: i32,
    /// Yearly average on "All Years" rows, raw count otherwise.
    pub total_grants: f64,
    pub terminated: u64,
    pub reinstated: u64,
    pub cancelled: u64,
    pub cancel_rate: f64,
    pub termination_rate: f64,
}

const STAT_COLUMNS: [&str; 6] = [
    "TotalGrants",
    "Terminated",
    "Reinstated",
    "Cancelled",
    "CancelRate",
    "TerminationRate",
];

fn stat_fields() -> Vec<Field> {
    vec![
        float("TotalGrants", false),
        uint64("Terminated"),
        uint64("Reinstated"),
        uint64("Cancelled"),
        float("CancelRate", false),
        float("TerminationRate", false),
    ]
}

impl TableRow for DirectorateRate {
    const COLUMNS: &'static [&'static str] = &[
        "DirectorateAbbr",
        "Directorate",
        "Year",
        STAT_COLUMNS[0],
        STAT_COLUMNS[1],
        STAT_COLUMNS[2],
        STAT_COLUMNS[3],
        STAT_COLUMNS[4],
        STAT_COLUMNS[5],
    ];
}

impl ColumnarRow for DirectorateRate {
    fn schema() -> ArrowSchema {
        let mut fields = vec![
            utf8("DirectorateAbbr", false),
            utf8("Directorate", false),
            int32("Year"),
        ];
        fields.extend(stat_fields());
        ArrowSchema::new(fields)
    }
}

impl TableRow for DivisionRate {
    const COLUMNS: &'static [&'static str] = &[
        "DirectorateAbbr",
        "Directorate",
        "DivisionAbbr",
        "Division",
        "Year",
        STAT_COLUMNS[0],
        STAT_COLUMNS[1],
        STAT_COLUMNS[2],
        STAT_COLUMNS[3],
        STAT_COLUMNS[4],
        STAT_COLUMNS[5],
    ];
}

impl ColumnarRow for DivisionRate {
    fn schema() -> ArrowSchema {
        let mut fields = vec![
            utf8("DirectorateAbbr", false),
            utf8("Directorate", false),
            utf8("DivisionAbbr", false),
            utf8("Division", false),
            int32("Year"),
        ];
        fields.extend(stat_fields());
        ArrowSchema::new(fields)
    }
}

/// Cancelled count plus cancellation and termination percentages.
fn derived(total_grants: f64, terminated: u64, reinstated: u64) -> (u64, f64, f64) {
    let cancelled = terminated + reinstated;
    let termination_rate = if cancelled > 0 {
        terminated as f64 / cancelled as f64 * 100.0
    } else {
        0.0
    };
    (cancelled, percent(cancelled as f64, total_grants), termination_rate)
}

impl DirectorateRate {
    fn new(
        abbr: String,
        directorate: String,
        year: i32,
        total_grants: f64,
        terminated: u64,
        reinstated: u64,
    ) -> Self {
        let (cancelled, cancel_rate, termination_rate) =
            derived(total_grants, terminated, reinstated);
        Self {
            directorate_abbr: abbr,
            directorate,
            year,
            total_grants,
            terminated,
            reinstated,
            cancelled,
            cancel_rate,
            termination_rate,
        }
    }
}

impl DivisionRate {
    fn new(
        (abbr, directorate): (String, String),
        (division_abbr, division): (String, String),
        year: i32,
        total_grants: f64,
        terminated: u64,
        reinstated: u64,
    ) -> Self {
        let (cancelled, cancel_rate, termination_rate) =
            derived(total_grants, terminated, reinstated);
        Self {
            directorate_abbr: abbr,
            directorate,
            division_abbr,
            division,
            year,
            total_grants,
            terminated,
            reinstated,
            cancelled,
            cancel_rate,
            termination_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateViews {
    /// "All Years" rows first, then per-year rows; major directorates only.
    pub directorates: Vec<DirectorateRate>,
    /// Same layout, divisions of major directorates only.
    pub divisions: Vec<DivisionRate>,
}

fn count_by<'a, T, K: Ord>(
    rows: &'a [T],
    key: impl Fn(&'a T) -> Option<K>,
) -> BTreeMap<K, u64> {
    let mut out = BTreeMap::new();
    for row in rows {
        if let Some(k) = key(row) {
            *out.entry(k).or_default() += 1;
        }
    }
    out
}

/// Directorate codes with at least `threshold` awards over the whole period.
pub fn major_directorates(awards: &[Award], threshold: u64) -> BTreeSet<String> {
    count_by(awards, |a| a.directorate_abbr.as_deref())
        .into_iter()
        .filter(|(_, n)| *n >= threshold)
        .map(|(abbr, _)| abbr.to_string())
        .collect()
}

fn with_status<'a>(cancellations: &'a [Cancellation], wanted: &Status) -> Vec<&'a Cancellation> {
    cancellations
        .iter()
        .filter(|c| c.status.as_ref().map(Status::base).as_ref() == Some(wanted))
        .collect()
}

type DirKey<'a> = (&'a str, &'a str);
type DivKey<'a> = (&'a str, &'a str, &'a str, &'a str);

fn dir_key(a: &Award) -> Option<DirKey<'_>> {
    Some((a.directorate_abbr.as_deref()?, a.directorate.as_deref()?))
}

fn div_key(a: &Award) -> Option<DivKey<'_>> {
    Some((
        a.directorate_abbr.as_deref()?,
        a.directorate.as_deref()?,
        a.division_abbr.as_deref()?,
        a.division.as_deref()?,
    ))
}

/// Directorate and division rate tables, each with "All Years" and per-year rows.
/// Totals come from the award corpus; terminated/reinstated counts from the
/// cancellation table, joined on the directorate (and division) code.
#[instrument(
    level = "info",
    skip_all,
    fields(awards = awards.len(), cancellations = cancellations.len())
)]
pub fn rate_views(
    awards: &[Award],
    cancellations: &[Cancellation],
    years: YearRange,
    config: &ViewConfig,
) -> RateViews {
    let n_years = years.len().max(1) as f64;
    let sentinel = config.all_years_sentinel;
    let major = major_directorates(awards, config.major_threshold);

    let terminated = with_status(cancellations, &Status::Terminated);
    let reinstated = with_status(cancellations, &Status::Reinstated);

    // directorates
    let c_abbr = |c: &&Cancellation| c.directorate_abbr.clone();
    let c_abbr_year = |c: &&Cancellation| Some((c.directorate_abbr.clone()?, c.year));
    let term_all = count_by(&terminated, c_abbr);
    let rein_all = count_by(&reinstated, c_abbr);
    let term_year = count_by(&terminated, c_abbr_year);
    let rein_year = count_by(&reinstated, c_abbr_year);

    let mut directorates = Vec::new();
    for ((abbr, name), total) in count_by(awards, dir_key) {
        let key = abbr.to_string();
        directorates.push(DirectorateRate::new(
            key.clone(),
            name.to_string(),
            sentinel,
            total as f64 / n_years,
            term_all.get(&key).copied().unwrap_or(0),
            rein_all.get(&key).copied().unwrap_or(0),
        ));
    }
    for ((abbr, name, year), total) in count_by(awards, |a| {
        let (abbr, name) = dir_key(a)?;
        Some((abbr, name, a.year))
    }) {
        let key = (abbr.to_string(), year);
        directorates.push(DirectorateRate::new(
            key.0.clone(),
            name.to_string(),
            year,
            total as f64,
            term_year.get(&key).copied().unwrap_or(0),
            rein_year.get(&key).copied().unwrap_or(0),
        ));
    }
    directorates.retain(|d| major.contains(&d.directorate_abbr));

    // divisions
    let c_div = |c: &&Cancellation| Some((c.directorate_abbr.clone()?, c.division_abbr.clone()?));
    let c_div_year = |c: &&Cancellation| {
        Some((c.directorate_abbr.clone()?, c.division_abbr.clone()?, c.year))
    };
    let term_all = count_by(&terminated, c_div);
    let rein_all = count_by(&reinstated, c_div);
    let term_year = count_by(&terminated, c_div_year);
    let rein_year = count_by(&reinstated, c_div_year);

    let mut divisions = Vec::new();
    for ((abbr, name, div_abbr, div), total) in count_by(awards, div_key) {
        let key = (abbr.to_string(), div_abbr.to_string());
        divisions.push(DivisionRate::new(
            (key.0.clone(), name.to_string()),
            (key.1.clone(), div.to_string()),
            sentinel,
            total as f64 / n_years,
            term_all.get(&key).copied().unwrap_or(0),
            rein_all.get(&key).copied().unwrap_or(0),
        ));
    }
    for ((abbr, name, div_abbr, div, year), total) in count_by(awards, |a| {
        let (abbr, name, div_abbr, div) = div_key(a)?;
        Some((abbr, name, div_abbr, div, a.year))
    }) {
        let key = (abbr.to_string(), div_abbr.to_string(), year);
        divisions.push(DivisionRate::new(
            (key.0.clone(), name.to_string()),
            (key.1.clone(), div.to_string()),
            year,
            total as f64,
            term_year.get(&key).copied().unwrap_or(0),
            rein_year.get(&key).copied().unwrap_or(0),
        ));
    }
    divisions.retain(|d| major.contains(&d.directorate_abbr));

    debug!(
        major = major.len(),
        directorate_rows = directorates.len(),
        division_rows = divisions.len(),
        "rate views"
    );
    RateViews {
        directorates,
        divisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixtures::{award, cancellation};

    fn awards_for(abbr: &str, div: &str, per_year: &[(i32, usize)]) -> Vec<Award> {
        let mut out = Vec::new();
        for (year, n) in per_year {
            for i in 0..*n {
                out.push(award(&format!("{abbr}-{div}-{year}-{i}"), "CA", *year, abbr, div, 1.0));
            }
        }
        out
    }

    fn cfg() -> ViewConfig {
        ViewConfig::default()
    }

    #[test]
    fn major_threshold_is_inclusive_at_100() {
        let mut awards = awards_for("BIG", "B1", &[(2021, 100)]);
        awards.extend(awards_for("SML", "S1", &[(2021, 99)]));
        let major = major_directorates(&awards, 100);
        assert!(major.contains("BIG"));
        assert!(!major.contains("SML"));

        let views = rate_views(&awards, &[], YearRange::default(), &cfg());
        assert!(views.directorates.iter().all(|d| d.directorate_abbr == "BIG"));
        assert!(views.divisions.iter().all(|d| d.directorate_abbr == "BIG"));
        assert!(!views.directorates.is_empty());
    }

    #[test]
    fn all_years_total_is_average_of_yearly_totals() {
        let awards = awards_for(
            "MPS",
            "PHY",
            &[(2021, 30), (2022, 25), (2023, 20), (2024, 15), (2025, 10)],
        );
        let views = rate_views(&awards, &[], YearRange::default(), &cfg());
        let all = views.directorates.iter().find(|d| d.year == 0).unwrap();
        let yearly_sum: f64 = views
            .directorates
            .iter()
            .filter(|d| d.year != 0)
            .map(|d| d.total_grants)
            .sum();
        assert_eq!(all.total_grants, yearly_sum / 5.0);
        assert_eq!(all.total_grants, 20.0);

        let div_all = views.divisions.iter().find(|d| d.year == 0).unwrap();
        assert_eq!(div_all.total_grants, 20.0);
        assert_eq!(div_all.division_abbr, "PHY");
    }

    #[test]
    fn rates_use_row_specific_denominators() {
        let awards = awards_for("MPS", "PHY", &[(2021, 50), (2025, 50)]);
        let cancellations = vec![
            cancellation("a", Some("CA"), 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("b", Some("CA"), 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("c", Some("CA"), 2025, Status::PossiblyTerminated, "MPS", "PHY"),
            cancellation("d", Some("CA"), 2025, Status::Reinstated, "MPS", "PHY"),
            cancellation("e", Some("CA"), 2025, Status::Other("Unknown".into()), "MPS", "PHY"),
        ];
        let views = rate_views(&awards, &cancellations, YearRange::default(), &cfg());

        let all = views.directorates.iter().find(|d| d.year == 0).unwrap();
        assert_eq!(all.terminated, 3);
        assert_eq!(all.reinstated, 1);
        assert_eq!(all.cancelled, 4);
        assert_eq!(all.total_grants, 20.0);
        assert_eq!(all.cancel_rate, 20.0);
        assert_eq!(all.termination_rate, 75.0);

        let y25 = views.directorates.iter().find(|d| d.year == 2025).unwrap();
        assert_eq!(y25.total_grants, 50.0);
        assert_eq!(y25.cancel_rate, 8.0);

        let y21 = views.directorates.iter().find(|d| d.year == 2021).unwrap();
        assert_eq!(y21.cancelled, 0);
        assert_eq!(y21.cancel_rate, 0.0);
        assert_eq!(y21.termination_rate, 0.0);

        let div25 = views.divisions.iter().find(|d| d.year == 2025).unwrap();
        assert_eq!(div25.terminated, 3);
    }

    #[test]
    fn all_years_rows_come_first() {
        let mut awards = awards_for("ENG", "E1", &[(2021, 60), (2022, 60)]);
        awards.extend(awards_for("BIO", "B1", &[(2023, 120)]));
        let views = rate_views(&awards, &[], YearRange::default(), &cfg());
        let years: Vec<i32> = views.directorates.iter().map(|d| d.year).collect();
        assert_eq!(years, vec![0, 0, 2023, 2021, 2022]);
        assert_eq!(views.directorates[0].directorate_abbr, "BIO");
    }

    #[test]
    fn divisions_follow_parent_directorate_filter() {
        // tiny division inside a major directorate stays
        let mut awards = awards_for("GEO", "OCE", &[(2022, 150)]);
        awards.extend(awards_for("GEO", "TINY", &[(2022, 1)]));
        let views = rate_views(&awards, &[], YearRange::default(), &cfg());
        assert!(views.divisions.iter().any(|d| d.division_abbr == "TINY"));
    }
}
