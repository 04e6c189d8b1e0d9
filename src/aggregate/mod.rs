// src/aggregate/mod.rs

pub mod evolution;
pub mod rates;
pub mod state;

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::award::Award;
use crate::cancel::Cancellation;
use crate::config::{ViewConfig, YearRange};
use crate::reference::StateReference;
use crate::table::parquet::{float, int32, utf8, ColumnarRow};
use crate::table::TableRow;
use arrow::datatypes::Schema as ArrowSchema;

pub use evolution::{BudgetTotal, StateGrantTrend};
pub use rates::{DirectorateRate, DivisionRate, RateViews};
pub use state::{StateCancellations, StateGrants};

/// An award, or a cancellation with no award behind it, tagged with its state's party.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompleteAward {
    #[serde(rename = "AwardID")]
    pub award_id: String,
    pub state_code: String,
    pub state_name: Option<String>,
    pub year: i32,
    pub estimated_budget: Option<f64>,
    pub party: String,
}

impl TableRow for CompleteAward {
    const COLUMNS: &'static [&'static str] =
        &["AwardID", "StateCode", "StateName", "Year", "EstimatedBudget", "Party"];
}

impl ColumnarRow for CompleteAward {
    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            utf8("AwardID", false),
            utf8("StateCode", false),
            utf8("StateName", true),
            int32("Year"),
            float("EstimatedBudget", true),
            utf8("Party", false),
        ])
    }
}

/// Union of the award corpus and the cancellations it does not contain,
/// limited to covered years and rows with a state code.
#[instrument(
    level = "info",
    skip_all,
    fields(awards = awards.len(), cancellations = cancellations.len())
)]
pub fn unified_awards(
    awards: &[Award],
    cancellations: &[Cancellation],
    reference: &StateReference,
    years: YearRange,
) -> Vec<CompleteAward> {
    let known: HashSet<&str> = awards
        .iter()
        .map(|a| a.award_id.as_str())
        .filter(|id| !id.is_empty())
        .collect();

    let from_awards = awards.iter().filter_map(|a| {
        let code = a.state_code.as_ref()?;
        years.contains(a.year).then(|| CompleteAward {
            award_id: a.award_id.clone(),
            state_code: code.clone(),
            state_name: a.state_name.clone(),
            year: a.year,
            estimated_budget: Some(a.estimated_budget),
            party: reference.party(code, a.year),
        })
    });

    let mut missing = 0usize;
    let from_cancellations = cancellations
        .iter()
        .filter(|c| !known.contains(c.award_id.as_str()) && years.contains(c.year))
        .filter_map(|c| {
            let code = c.state_code.as_ref()?;
            missing += 1;
            Some(CompleteAward {
                award_id: c.award_id.clone(),
                state_code: code.clone(),
                state_name: reference.name(code).map(str::to_string),
                year: c.year,
                estimated_budget: c.estimated_budget,
                party: reference.party(code, c.year),
            })
        });

    let mut out: Vec<CompleteAward> = from_awards.collect();
    out.extend(from_cancellations);
    info!(rows = out.len(), cancellations_added = missing, "built unified award set");
    out
}

/// Every table handed to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct Views {
    pub complete: Vec<CompleteAward>,
    pub state_grants: Vec<StateGrants>,
    pub state_grants_all_years: Vec<StateGrants>,
    pub state_cancellations: Vec<StateCancellations>,
    pub rates: RateViews,
    pub budget_evolution: Vec<BudgetTotal>,
    pub state_grant_evolution: Vec<StateGrantTrend>,
}

/// Derive all views from the two normalized tables and the reference table.
#[instrument(level = "info", skip_all)]
pub fn build_views(
    awards: &[Award],
    cancellations: &[Cancellation],
    reference: &StateReference,
    years: YearRange,
    config: &ViewConfig,
) -> Views {
    let complete = unified_awards(awards, cancellations, reference, years);
    let state_grants = state::state_grants(&complete, reference);
    let state_grants_all_years =
        state::with_all_years(&state_grants, reference, config.all_years_sentinel);
    let state_cancellations = state::cancellations_by_state(cancellations, reference);
    let rates = rates::rate_views(awards, cancellations, years, config);
    let budget_evolution = evolution::budget_evolution(&complete);
    let state_grant_evolution = evolution::state_grant_evolution(&state_grants);

    Views {
        complete,
        state_grants,
        state_grants_all_years,
        state_cancellations,
        rates,
        budget_evolution,
        state_grant_evolution,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::cancel::Status;
    use crate::reference::{fixtures::reference, UNKNOWN_PARTY};

    #[test]
    fn unified_adds_only_unknown_cancellations() {
        let awards = vec![award("1", "CA", 2023, "MPS", "PHY", 100.0)];
        let cancellations = vec![
            cancellation("1", Some("CA"), 2023, Status::Terminated, "MPS", "PHY"),
            cancellation("2", Some("AZ"), 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("3", None, 2025, Status::Terminated, "MPS", "PHY"),
            cancellation("4", Some("OH"), 2019, Status::Terminated, "MPS", "PHY"),
            cancellation("5", Some("ZZ"), 2022, Status::Reinstated, "MPS", "PHY"),
        ];
        let out = unified_awards(&awards, &cancellations, &reference(), YearRange::default());
        let ids: Vec<&str> = out.iter().map(|r| r.award_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "5"]);

        assert_eq!(out[0].party, "Democrat");
        assert_eq!(out[0].estimated_budget, Some(100.0));
        assert_eq!(out[1].party, "Democrat", "AZ uses the 2025 epoch in 2025");
        assert_eq!(out[1].state_name.as_deref(), Some("Arizona"));
        assert_eq!(out[2].party, UNKNOWN_PARTY);
        assert_eq!(out[2].state_name, None);
    }

    #[test]
    fn blank_id_cancellation_is_not_hidden_by_blank_award() {
        let awards = vec![award("", "OH", 2023, "GEO", "OCE", 777.0)];
        let cancellations = vec![cancellation(
            "",
            Some("CA"),
            2024,
            Status::Terminated,
            "GEO",
            "OCE",
        )];
        let out = unified_awards(&awards, &cancellations, &reference(), YearRange::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].state_code, "CA");
        assert_eq!(out[1].estimated_budget, Some(10.0));
    }

    #[test]
    fn build_views_is_deterministic() {
        let awards: Vec<Award> = (0..30)
            .map(|i| {
                let st = ["CA", "OH", "AZ"][i % 3];
                award(&i.to_string(), st, 2021 + (i % 5) as i32, "MPS", "PHY", i as f64)
            })
            .collect();
        let cancellations = vec![cancellation(
            "3",
            Some("CA"),
            2024,
            Status::Terminated,
            "MPS",
            "PHY",
        )];
        let cfg = ViewConfig::default();
        let a = build_views(&awards, &cancellations, &reference(), YearRange::default(), &cfg);
        let b = build_views(&awards, &cancellations, &reference(), YearRange::default(), &cfg);
        assert_eq!(a.state_grants_all_years, b.state_grants_all_years);
        assert_eq!(a.budget_evolution, b.budget_evolution);
        assert_eq!(a.rates, b.rates);
    }
}
