// src/reference.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use tracing::info;

use crate::table::read_table;

pub const UNKNOWN_PARTY: &str = "Unknown";

/// Last fiscal year governed by the 2020-epoch party assignment.
pub const FIRST_EPOCH_LAST_YEAR: i32 = 2024;

/// One row of the static state table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateInfo {
    #[serde(rename = "StateCode")]
    pub code: String,
    #[serde(rename = "Party2020")]
    pub party_2020: Option<String>,
    #[serde(rename = "Party2025")]
    pub party_2025: Option<String>,
    #[serde(rename = "StateName")]
    pub name: Option<String>,
    /// Numeric map-topology id.
    #[serde(rename = "Id")]
    pub id: Option<u32>,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StateReference {
    states: HashMap<String, StateInfo>,
}

impl StateReference {
    pub fn load(path: &Path) -> Result<Self> {
        let rows: Vec<StateInfo> =
            read_table(path).with_context(|| format!("loading states {}", path.display()))?;
        info!(states = rows.len(), "loaded state reference");
        Ok(Self::from_states(rows))
    }

    pub fn from_states(rows: impl IntoIterator<Item = StateInfo>) -> Self {
        let mut states = HashMap::new();
        for row in rows {
            states.entry(row.code.clone()).or_insert(row);
        }
        Self { states }
    }

    pub fn get(&self, code: &str) -> Option<&StateInfo> {
        self.states.get(code)
    }

    pub fn name(&self, code: &str) -> Option<&str> {
        self.get(code).and_then(|s| s.name.as_deref())
    }

    /// Governing party for a state in a fiscal year.
    pub fn party(&self, code: &str, year: i32) -> String {
        let party = self.get(code).and_then(|s| {
            if year <= FIRST_EPOCH_LAST_YEAR {
                s.party_2020.as_deref()
            } else {
                s.party_2025.as_deref()
            }
        });
        party.unwrap_or(UNKNOWN_PARTY).to_string()
    }

    /// The fixed party used by "All Years" rows.
    pub fn party_2020(&self, code: &str) -> String {
        self.get(code)
            .and_then(|s| s.party_2020.as_deref())
            .unwrap_or(UNKNOWN_PARTY)
            .to_string()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn state(code: &str, name: &str, p2020: &str, p2025: &str, id: u32) -> StateInfo {
        StateInfo {
            code: code.into(),
            party_2020: Some(p2020.into()),
            party_2025: Some(p2025.into()),
            name: Some(name.into()),
            id: Some(id),
            latitude: Some(40.0),
            longitude: Some(-90.0),
        }
    }

    pub fn reference() -> StateReference {
        StateReference::from_states(vec![
            state("CA", "California", "Democrat", "Democrat", 6),
            state("OH", "Ohio", "Republican", "Republican", 39),
            state("AZ", "Arizona", "Republican", "Democrat", 4),
        ])
    }
}
