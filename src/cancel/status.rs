// src/cancel/status.rs

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// Decorative glyphs the feed puts in front of status labels, in both
// proper UTF-8 and the mis-decoded form seen in older exports.
const GLYPH_PREFIXES: &[&str] = &["❌ ", "🔄 ", "âŒ ", "ðŸ”„ "];

const POSSIBLY: &str = "Possibly ";

/// Outcome of a grant cancellation review.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Terminated,
    Reinstated,
    PossiblyTerminated,
    PossiblyReinstated,
    Other(String),
}

impl Status {
    /// Parse a feed label, dropping glyph prefixes.
    pub fn parse(raw: &str) -> Status {
        let mut text = raw.trim();
        while let Some(rest) = GLYPH_PREFIXES.iter().find_map(|g| text.strip_prefix(g)) {
            text = rest.trim_start();
        }
        let (tentative, base) = match text.strip_prefix(POSSIBLY) {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };
        match (tentative, base) {
            (false, "Terminated") => Status::Terminated,
            (false, "Reinstated") => Status::Reinstated,
            (true, "Terminated") => Status::PossiblyTerminated,
            (true, "Reinstated") => Status::PossiblyReinstated,
            _ => Status::Other(text.to_string()),
        }
    }

    /// The confirmed status a tentative one stands for.
    pub fn base(&self) -> Status {
        match self {
            Status::PossiblyTerminated => Status::Terminated,
            Status::PossiblyReinstated => Status::Reinstated,
            other => other.clone(),
        }
    }

    pub fn is_tentative(&self) -> bool {
        matches!(self, Status::PossiblyTerminated | Status::PossiblyReinstated)
    }

    pub fn label(&self) -> &str {
        match self {
            Status::Terminated => "Terminated",
            Status::Reinstated => "Reinstated",
            Status::PossiblyTerminated => "Possibly Terminated",
            Status::PossiblyReinstated => "Possibly Reinstated",
            Status::Other(s) => s,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Status::parse(&s))
    }
}
