// src/names.rs
//
// Display-name cleanup shared by the award and cancellation tables.

use once_cell::sync::Lazy;
use regex::Regex;

static DIRECTORATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Directorate for ").expect("valid directorate prefix regex"));

// Applied in order; each one only touches names carrying its own prefix.
static DIVISION_PREFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^Division [Oo]f ", r"^OIA-", r"^Div\. of "]
        .iter()
        .map(|p| Regex::new(p).expect("valid division prefix regex"))
        .collect()
});

// A repeated division abbreviation baked into the display name, e.g. " (CCF)".
static DIVISION_ABBR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \([A-Z/&]+\)$").expect("valid division suffix regex"));

pub fn clean_directorate(name: &str) -> String {
    DIRECTORATE_PREFIX.replace(name, "").into_owned()
}

pub fn clean_division(name: &str) -> String {
    let mut out = name.to_string();
    for re in DIVISION_PREFIXES.iter() {
        out = re.replace(&out, "").into_owned();
    }
    DIVISION_ABBR_SUFFIX.replace(&out, "").into_owned()
}

/// Clean both optional names in place.
pub fn clean_names(directorate: &mut Option<String>, division: &mut Option<String>) {
    if let Some(d) = directorate.as_mut() {
        *d = clean_directorate(d);
    }
    if let Some(d) = division.as_mut() {
        *d = clean_division(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directorate_prefix() {
        assert_eq!(
            clean_directorate("Directorate for STEM Education"),
            "STEM Education"
        );
        assert_eq!(
            clean_directorate("Office Of The Director"),
            "Office Of The Director"
        );
    }

    #[test]
    fn strips_each_division_prefix() {
        assert_eq!(
            clean_division("Division of Computing and Communication Foundations"),
            "Computing and Communication Foundations"
        );
        assert_eq!(clean_division("Division Of Physics"), "Physics");
        assert_eq!(
            clean_division("OIA-Office of Integrative Activities"),
            "Office of Integrative Activities"
        );
        assert_eq!(
            clean_division("Div. of Equity for Excellence in STEM"),
            "Equity for Excellence in STEM"
        );
    }

    #[test]
    fn strips_repeated_abbreviation_suffix() {
        assert_eq!(
            clean_division("Division of Information & Intelligent Systems (IIS)"),
            "Information & Intelligent Systems"
        );
        assert_eq!(clean_division("Ocean Sciences (OCE/GEO)"), "Ocean Sciences");
        // lowercase content is not an abbreviation
        assert_eq!(clean_division("Polar Programs (polar)"), "Polar Programs (polar)");
    }

    #[test]
    fn prefix_only_matches_at_start() {
        assert_eq!(
            clean_division("Materials Research Division of Science"),
            "Materials Research Division of Science"
        );
    }
}
