// src/cancel/fiscal.rs

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// NSF fiscal year: Oct 1 .. Sep 30, labelled by the year it ends in.
pub fn fiscal_year(date: NaiveDate) -> i32 {
    if date.month() >= 10 {
        date.year() + 1
    } else {
        date.year()
    }
}

/// Parse the feed's start date. Returns `None` for anything unrecognised.
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

pub fn fiscal_year_of(raw: &str) -> Option<i32> {
    parse_start_date(raw).map(fiscal_year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn october_rolls_forward() {
        assert_eq!(fiscal_year_of("2024-10-15"), Some(2025));
        assert_eq!(fiscal_year_of("2024-10-01"), Some(2025));
        assert_eq!(fiscal_year_of("2024-09-15"), Some(2024));
        assert_eq!(fiscal_year_of("2024-09-30"), Some(2024));
        assert_eq!(fiscal_year_of("2023-01-02"), Some(2023));
    }

    #[test]
    fn accepts_common_layouts() {
        assert_eq!(fiscal_year_of("2022/11/03"), Some(2023));
        assert_eq!(fiscal_year_of("12/01/2020"), Some(2021));
        assert_eq!(fiscal_year_of("2021-06-01 00:00:00"), Some(2021));
        assert_eq!(fiscal_year_of("2021-10-01T12:00:00Z"), Some(2022));
    }

    #[test]
    fn garbage_has_no_year() {
        assert_eq!(fiscal_year_of(""), None);
        assert_eq!(fiscal_year_of("not a date"), None);
        assert_eq!(fiscal_year_of("2024-13-01"), None);
    }
}
