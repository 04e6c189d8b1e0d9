// src/cancel/mod.rs

pub mod fiscal;
pub mod reconcile;
pub mod status;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, instrument};

pub use status::Status;

use crate::award::normalize_award_id;
use crate::config::YearRange;
use crate::table::TableRow;

/// Territories removed from the cancellation feed.
pub const EXCLUDED_FEED_LOCATIONS: &[&str] = &["AS", "GU", "MP", "PR", "VI"];

/// Feed directorate labels renamed to the award table's spelling.
const DIRECTORATE_RENAMES: &[(&str, &str)] = &[
    ("Office of the Director", "Office Of The Director"),
    (
        "Technology, Innovation and Partnerships",
        "Directorate for Technology, Innovation, and Partnerships",
    ),
];

/// Legacy directorate codes in the feed, mapped to current ones.
const ABBR_REMAPS: &[(&str, &str)] = &[("CISE", "CSE"), ("OD", "O/D")];

/// Feed columns the pipeline requires.
pub const FEED_COLUMNS: &[&str] = &[
    "grant_id",
    "status",
    "nsf_start_date",
    "project_title",
    "org_state",
    "estimated_budget",
    "directorate",
    "dir",
];

/// One row of the cancellation feed, source column names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCancellation {
    pub grant_id: Option<String>,
    pub status: Option<String>,
    pub nsf_start_date: Option<String>,
    pub project_title: Option<String>,
    pub org_state: Option<String>,
    pub estimated_budget: Option<String>,
    pub directorate: Option<String>,
    pub dir: Option<String>,
}

/// One row of the normalized cancellation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cancellation {
    #[serde(rename = "AwardID")]
    pub award_id: String,
    pub status: Option<Status>,
    pub year: i32,
    pub state_code: Option<String>,
    pub estimated_budget: Option<f64>,
    pub directorate: Option<String>,
    pub directorate_abbr: Option<String>,
    pub division: Option<String>,
    pub division_abbr: Option<String>,
}

impl TableRow for Cancellation {
    const COLUMNS: &'static [&'static str] = &[
        "AwardID",
        "Status",
        "Year",
        "StateCode",
        "EstimatedBudget",
        "Directorate",
        "DirectorateAbbr",
        "Division",
        "DivisionAbbr",
    ];
}

/// A cancellation mid-reconciliation; the project title only feeds the
/// title heuristic and is dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCancellation {
    pub record: Cancellation,
    pub project_title: Option<String>,
}

/// Read the feed, checking the required columns are present.
pub fn read_feed(path: &Path) -> Result<Vec<RawCancellation>> {
    let file = File::open(path)
        .with_context(|| format!("opening cancellation feed {}", path.display()))?;
    parse_feed(file).with_context(|| format!("reading cancellation feed {}", path.display()))
}

pub fn parse_feed<R: Read>(input: R) -> Result<Vec<RawCancellation>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    // exports sometimes pad header names; deserialization matches them exactly
    let headers: StringRecord = rdr.headers()?.iter().map(str::trim).collect();
    rdr.set_headers(headers.clone());
    let missing: Vec<&str> = FEED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        bail!("cancellation feed is missing columns {:?}", missing);
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize().enumerate() {
        let row: RawCancellation = rec.with_context(|| format!("feed record {}", idx))?;
        rows.push(row);
    }
    debug!(rows = rows.len(), "read cancellation feed");
    Ok(rows)
}

/// Outcome of the feed normalization steps.
#[derive(Debug, Default)]
pub struct NormalizedFeed {
    pub rows: Vec<PendingCancellation>,
    pub read: usize,
    pub no_year: usize,
    pub out_of_range: usize,
    pub territory: usize,
}

/// Map the feed onto the cancellation schema and drop rows outside the
/// covered years or in excluded territories.
#[instrument(level = "info", skip(raw), fields(rows = raw.len()))]
pub fn normalize_feed(raw: Vec<RawCancellation>, years: YearRange) -> NormalizedFeed {
    let mut out = NormalizedFeed {
        read: raw.len(),
        ..Default::default()
    };
    for row in raw {
        let Some(year) = row.nsf_start_date.as_deref().and_then(fiscal::fiscal_year_of) else {
            out.no_year += 1;
            continue;
        };
        if !years.contains(year) {
            out.out_of_range += 1;
            continue;
        }
        let state_code = non_blank(row.org_state);
        if state_code
            .as_deref()
            .map_or(false, |s| EXCLUDED_FEED_LOCATIONS.contains(&s))
        {
            out.territory += 1;
            continue;
        }

        let directorate = non_blank(row.directorate).map(|d| rename(&d, DIRECTORATE_RENAMES));
        let directorate_abbr = non_blank(row.dir).map(|d| rename(&d, ABBR_REMAPS));

        out.rows.push(PendingCancellation {
            record: Cancellation {
                award_id: row.grant_id.as_deref().map(normalize_award_id).unwrap_or_default(),
                status: non_blank(row.status).map(|s| Status::parse(&s)),
                year,
                state_code,
                estimated_budget: row.estimated_budget.as_deref().and_then(parse_budget),
                directorate,
                directorate_abbr,
                division: None,
                division_abbr: None,
            },
            project_title: non_blank(row.project_title),
        });
    }
    debug!(
        kept = out.rows.len(),
        no_year = out.no_year,
        out_of_range = out.out_of_range,
        territory = out.territory,
        "normalized feed"
    );
    out
}

fn rename(value: &str, table: &[(&str, &str)]) -> String {
    table
        .iter()
        .find(|(from, _)| *from == value)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| value.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Budgets may carry currency formatting; unparseable values are treated as missing.
fn parse_budget(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned.parse().ok()
}

/// Project tentative statuses onto their base status for output.
pub fn collapse_statuses(rows: &mut [Cancellation]) {
    for row in rows {
        if let Some(s) = row.status.as_mut() {
            *s = s.base();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"grant_id,status,nsf_start_date,project_title,org_state,estimated_budget,directorate,dir,extra
2007891,❌ Terminated,2024-10-15,Some project,CA,"$1,250.00",Office of the Director,OD,x
2100002,🔄 Possibly Reinstated,2024-09-15,ADVANCE Partnership,NY,500,,,x
2100003,❌ Terminated,2019-05-01,Old,TX,1,,CISE,x
2100004,❌ Terminated,2022-05-01,Island,PR,1,,,x
2100005,❌ Terminated,not a date,Bad,OH,1,,,x
2100006,Reinstated,2023-03-01,No state,,,"Technology, Innovation and Partnerships",TIP,x
"#;

    #[test]
    fn padded_headers_still_deserialize() {
        let input = "grant_id, status ,nsf_start_date,project_title,org_state,estimated_budget,directorate, dir\n\
                     2400001,Terminated,2024-01-10,T,OH,10,,ENG\n";
        let raw = parse_feed(input.as_bytes()).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].status.as_deref(), Some("Terminated"));
        assert_eq!(raw[0].dir.as_deref(), Some("ENG"));
    }

    #[test]
    fn parse_feed_requires_columns() {
        let err = parse_feed("grant_id,status\n1,x\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing columns"));
    }

    #[test]
    fn normalize_applies_renames_years_and_filters() {
        let raw = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(raw.len(), 6);
        let feed = normalize_feed(raw, YearRange::default());
        assert_eq!(feed.read, 6);
        assert_eq!(feed.no_year, 1);
        assert_eq!(feed.out_of_range, 1);
        assert_eq!(feed.territory, 1);
        assert_eq!(feed.rows.len(), 3);

        let first = &feed.rows[0].record;
        assert_eq!(first.award_id, "2007891");
        assert_eq!(first.year, 2025);
        assert_eq!(first.status, Some(Status::Terminated));
        assert_eq!(first.estimated_budget, Some(1250.0));
        assert_eq!(first.directorate.as_deref(), Some("Office Of The Director"));
        assert_eq!(first.directorate_abbr.as_deref(), Some("O/D"));

        let second = &feed.rows[1];
        assert_eq!(second.record.year, 2024);
        assert_eq!(second.record.status, Some(Status::PossiblyReinstated));
        assert_eq!(second.project_title.as_deref(), Some("ADVANCE Partnership"));
        assert!(second.record.directorate.is_none());

        let third = &feed.rows[2].record;
        assert_eq!(third.award_id, "2100006");
        assert_eq!(
            third.directorate.as_deref(),
            Some("Directorate for Technology, Innovation, and Partnerships")
        );
    }

    #[test]
    fn missing_state_survives_territory_filter() {
        let raw = vec![RawCancellation {
            grant_id: Some("9".into()),
            nsf_start_date: Some("2023-03-01".into()),
            directorate: Some("Technology, Innovation and Partnerships".into()),
            dir: Some("CISE".into()),
            ..Default::default()
        }];
        let feed = normalize_feed(raw, YearRange::default());
        assert_eq!(feed.rows.len(), 1);
        let rec = &feed.rows[0].record;
        assert!(rec.state_code.is_none());
        assert_eq!(
            rec.directorate.as_deref(),
            Some("Directorate for Technology, Innovation, and Partnerships")
        );
        assert_eq!(rec.directorate_abbr.as_deref(), Some("CSE"));
    }

    #[test]
    fn collapse_projects_to_base() {
        let mut rows = vec![Cancellation {
            award_id: "1".into(),
            status: Some(Status::PossiblyTerminated),
            year: 2025,
            state_code: None,
            estimated_budget: None,
            directorate: None,
            directorate_abbr: None,
            division: None,
            division_abbr: None,
        }];
        collapse_statuses(&mut rows);
        assert_eq!(rows[0].status, Some(Status::Terminated));
    }
}
