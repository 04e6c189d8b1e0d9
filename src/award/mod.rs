// src/award/mod.rs

pub mod corpus;
pub mod source;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::table::TableRow;

/// The only institution country kept.
pub const US_COUNTRY: &str = "United States";

/// Territories, plus two known-bad state values of the award source.
pub const EXCLUDED_AWARD_LOCATIONS: &[&str] = &["AS", "GU", "MP", "PR", "VI", "BM-07", "GENEVA"];

/// One row of the consolidated award table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Award {
    #[serde(rename = "AwardID")]
    pub award_id: String,
    pub directorate: Option<String>,
    pub directorate_abbr: Option<String>,
    pub division: Option<String>,
    pub division_abbr: Option<String>,
    pub state_code: Option<String>,
    pub state_name: Option<String>,
    pub year: i32,
    pub estimated_budget: f64,
}

impl TableRow for Award {
    const COLUMNS: &'static [&'static str] = &[
        "AwardID",
        "Directorate",
        "DirectorateAbbr",
        "Division",
        "DivisionAbbr",
        "StateCode",
        "StateName",
        "Year",
        "EstimatedBudget",
    ];
}

/// The fields of a raw NSF award document the pipeline consumes.
/// Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RawAward {
    #[serde(default)]
    pub awd_id: Value,
    pub org_dir_long_name: Option<String>,
    pub dir_abbr: Option<String>,
    pub org_div_long_name: Option<String>,
    pub div_abbr: Option<String>,
    #[serde(default)]
    pub tot_intn_awd_amt: Value,
    #[serde(default)]
    pub awd_amount: Value,
    pub inst: Option<RawInstitution>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawInstitution {
    pub inst_country_name: Option<String>,
    pub inst_state_code: Option<String>,
    pub inst_state_name: Option<String>,
}

/// Why a document was left out of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exclusion {
    NonUsCountry,
    ExcludedTerritory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Kept(Award),
    Excluded(Exclusion),
}

/// Parse one JSON award document and extract it for `year`.
pub fn parse_award_document(bytes: &[u8], year: i32) -> Result<Extraction> {
    let raw: RawAward = serde_json::from_slice(bytes).context("invalid award document")?;
    extract_award(&raw, year)
}

/// Apply the country/territory filters and build the normalized award.
/// `year` comes from the partition the document was stored in.
pub fn extract_award(raw: &RawAward, year: i32) -> Result<Extraction> {
    let inst = raw.inst.as_ref();

    if inst.and_then(|i| i.inst_country_name.as_deref()) != Some(US_COUNTRY) {
        return Ok(Extraction::Excluded(Exclusion::NonUsCountry));
    }
    let state_code = inst.and_then(|i| i.inst_state_code.clone());
    if let Some(code) = state_code.as_deref() {
        if EXCLUDED_AWARD_LOCATIONS.contains(&code) {
            return Ok(Extraction::Excluded(Exclusion::ExcludedTerritory));
        }
    }

    let intl = amount_or_zero(&raw.tot_intn_awd_amt).context("tot_intn_awd_amt")?;
    let amount = amount_or_zero(&raw.awd_amount).context("awd_amount")?;

    Ok(Extraction::Kept(Award {
        award_id: award_id_text(&raw.awd_id),
        directorate: raw.org_dir_long_name.clone(),
        directorate_abbr: raw.dir_abbr.clone(),
        division: raw.org_div_long_name.clone(),
        division_abbr: raw.div_abbr.clone(),
        state_code,
        state_name: inst.and_then(|i| i.inst_state_name.clone()),
        year,
        estimated_budget: intl.max(amount),
    }))
}

/// Award IDs are opaque text, whatever type the source used.
pub fn award_id_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => normalize_award_id(s),
        Value::Number(n) => match n.as_u64() {
            Some(u) => u.to_string(),
            None => normalize_award_id(&n.to_string()),
        },
        other => other.to_string(),
    }
}

/// Trim, and drop a float artefact like `"2007891.0"` so text joins line up.
pub fn normalize_award_id(raw: &str) -> String {
    let id = raw.trim();
    match id.strip_suffix(".0") {
        Some(head) if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) => {
            head.to_string()
        }
        _ => id.to_string(),
    }
}

/// Null, absent, empty and zero all count as 0; other strings must be numeric.
fn amount_or_zero(value: &Value) -> Result<f64> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(false) => Ok(0.0),
        Value::Bool(true) => Ok(1.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| anyhow!("amount {} is not representable", n)),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("amount {:?} is not numeric", s)),
        other => Err(anyhow!("unexpected amount value {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(country: &str, state: &str) -> Value {
        json!({
            "awd_id": 2012345,
            "org_dir_long_name": "Directorate for Engineering",
            "dir_abbr": "ENG",
            "org_div_long_name": "Division of Civil, Mechanical, and Manufacturing Innovation",
            "div_abbr": "CMMI",
            "tot_intn_awd_amt": 150000,
            "awd_amount": 200000,
            "inst": {
                "inst_country_name": country,
                "inst_state_code": state,
                "inst_state_name": "Ohio"
            }
        })
    }

    fn extract(v: Value, year: i32) -> Extraction {
        parse_award_document(v.to_string().as_bytes(), year).unwrap()
    }

    #[test]
    fn keeps_us_award_and_takes_larger_amount() {
        let Extraction::Kept(award) = extract(doc("United States", "OH"), 2023) else {
            panic!("expected award to be kept");
        };
        assert_eq!(award.award_id, "2012345");
        assert_eq!(award.year, 2023);
        assert_eq!(award.estimated_budget, 200000.0);
        assert_eq!(award.state_code.as_deref(), Some("OH"));
        assert_eq!(award.directorate_abbr.as_deref(), Some("ENG"));
    }

    #[test]
    fn missing_amounts_default_to_zero() {
        let v = json!({
            "awd_id": "2100001",
            "tot_intn_awd_amt": null,
            "inst": {"inst_country_name": "United States", "inst_state_code": "CA"}
        });
        let Extraction::Kept(award) = extract(v, 2021) else {
            panic!("expected award to be kept");
        };
        assert_eq!(award.estimated_budget, 0.0);
        assert!(award.directorate.is_none());
    }

    #[test]
    fn string_amounts_are_parsed() {
        let v = json!({
            "awd_id": "1",
            "tot_intn_awd_amt": "75000.50",
            "awd_amount": "",
            "inst": {"inst_country_name": "United States", "inst_state_code": "TX"}
        });
        let Extraction::Kept(award) = extract(v, 2022) else {
            panic!("expected award to be kept");
        };
        assert_eq!(award.estimated_budget, 75000.5);
    }

    #[test]
    fn non_numeric_amount_is_malformed() {
        let v = json!({
            "awd_id": "1",
            "awd_amount": "lots",
            "inst": {"inst_country_name": "United States", "inst_state_code": "TX"}
        });
        assert!(parse_award_document(v.to_string().as_bytes(), 2022).is_err());
    }

    #[test]
    fn excludes_foreign_and_missing_country() {
        assert_eq!(
            extract(doc("Canada", "ON"), 2021),
            Extraction::Excluded(Exclusion::NonUsCountry)
        );
        let v = json!({"awd_id": 1, "inst": {"inst_state_code": "OH"}});
        assert_eq!(extract(v, 2021), Extraction::Excluded(Exclusion::NonUsCountry));
        let v = json!({"awd_id": 1});
        assert_eq!(extract(v, 2021), Extraction::Excluded(Exclusion::NonUsCountry));
    }

    #[test]
    fn excludes_every_listed_territory() {
        for code in EXCLUDED_AWARD_LOCATIONS {
            assert_eq!(
                extract(doc("United States", code), 2024),
                Extraction::Excluded(Exclusion::ExcludedTerritory),
                "{code} should be excluded"
            );
        }
        assert!(matches!(extract(doc("United States", "DC"), 2024), Extraction::Kept(_)));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_award_document(b"{not json", 2021).is_err());
    }

    #[test]
    fn award_ids_stay_text() {
        assert_eq!(award_id_text(&json!(2007891)), "2007891");
        assert_eq!(award_id_text(&json!("0012345")), "0012345");
        assert_eq!(award_id_text(&json!("2007891.0")), "2007891");
        assert_eq!(award_id_text(&json!(2007891.0)), "2007891");
        assert_eq!(award_id_text(&Value::Null), "");
        assert_eq!(normalize_award_id(" AB.0 "), "AB.0");
    }
}
