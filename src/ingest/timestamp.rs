//! Relative and absolute timestamp normalization.
//!
//! Scraped timestamps look like `"2w • 2 weeks ago • Visible to anyone on or off LinkedIn"`.
//! Relative ages only mean something against the time the page was scraped, so
//! the scrape time is always an explicit input. The wall clock is never read here,
//! which keeps re-processing the same document deterministic.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How precisely `approx_instant` is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Exact,
    Hour,
    Day,
    Week,
    Month,
    Year,
    Unknown,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Exact => "exact",
            Precision::Hour => "hour",
            Precision::Day => "day",
            Precision::Week => "week",
            Precision::Month => "month",
            Precision::Year => "year",
            Precision::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "exact" => Precision::Exact,
            "hour" => Precision::Hour,
            "day" => Precision::Day,
            "week" => Precision::Week,
            "month" => Precision::Month,
            "year" => Precision::Year,
            _ => Precision::Unknown,
        }
    }

    /// Width of the uncertainty window below `approx_instant`.
    pub fn span(self) -> Option<TimeDelta> {
        match self {
            Precision::Exact => Some(TimeDelta::zero()),
            Precision::Hour => TimeDelta::try_hours(1),
            Precision::Day => TimeDelta::try_days(1),
            Precision::Week => TimeDelta::try_weeks(1),
            Precision::Month => TimeDelta::try_days(30),
            Precision::Year => TimeDelta::try_days(365),
            Precision::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTimestamp {
    /// Raw input, kept for audit.
    pub raw: String,
    pub observed_at: DateTime<Utc>,
    pub approx_instant: Option<DateTime<Utc>>,
    pub precision: Precision,
    /// Canonical relative age token such as `2w` or `5mo`.
    pub relative_age: Option<String>,
    pub visibility: Option<String>,
    pub edited: bool,
}

impl NormalizedTimestamp {
    /// Earliest and latest instants consistent with the raw string.
    ///
    /// Platforms floor relative ages ("2w" covers two to three weeks), so the
    /// window extends one precision span before `approx_instant`.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let latest = self.approx_instant?;
        let earliest = latest.checked_sub_signed(self.precision.span()?)?;
        Some((earliest, latest))
    }
}

fn short_age_re() -> &'static Regex {
    static SHORT_AGE_RE: OnceLock<Regex> = OnceLock::new();
    SHORT_AGE_RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d{1,6})\s*(mo|yr|y|w|d|h|m|s)$").expect("valid short age regex")
    })
}

fn long_age_re() -> &'static Regex {
    static LONG_AGE_RE: OnceLock<Regex> = OnceLock::new();
    LONG_AGE_RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d{1,6})\s+(second|minute|hour|day|week|month|year)s?(\s+ago)?$")
            .expect("valid long age regex")
    })
}

/// Normalize a free-text timestamp against the time it was scraped.
/// Never fails: unrecognised input yields `Precision::Unknown`.
pub fn normalize_timestamp(raw: &str, observed_at: DateTime<Utc>) -> NormalizedTimestamp {
    let mut normalized = NormalizedTimestamp {
        raw: raw.to_string(),
        observed_at,
        approx_instant: None,
        precision: Precision::Unknown,
        relative_age: None,
        visibility: None,
        edited: false,
    };

    for segment in raw.split('•').map(str::trim).filter(|s| !s.is_empty()) {
        let lower = segment.to_lowercase();

        if lower.contains("visible to") {
            normalized.visibility.get_or_insert_with(|| segment.to_string());
            continue;
        }
        if lower.starts_with("edited") {
            normalized.edited = true;
            continue;
        }
        if normalized.precision != Precision::Unknown {
            continue;
        }

        if let Some((amount, unit)) = relative_age(&lower) {
            if let Some(instant) = age_to_instant(amount, unit, observed_at) {
                normalized.approx_instant = Some(instant);
                normalized.precision = unit_precision(unit);
                normalized.relative_age = Some(format!("{amount}{unit}"));
            }
        } else if let Some((instant, precision)) = absolute_instant(segment) {
            normalized.approx_instant = Some(instant);
            normalized.precision = precision;
        }
    }

    if normalized.precision == Precision::Unknown {
        tracing::debug!("Unparseable timestamp retained for audit: {:?}", raw);
    }

    normalized
}

/// Returns the amount and canonical unit (`s`, `m`, `h`, `d`, `w`, `mo`, `y`).
fn relative_age(lower: &str) -> Option<(i64, &'static str)> {
    if matches!(lower, "now" | "just now") {
        return Some((0, "m"));
    }

    if let Some(caps) = short_age_re().captures(lower) {
        let amount = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "s" => "s",
            "m" => "m",
            "h" => "h",
            "d" => "d",
            "w" => "w",
            "mo" => "mo",
            _ => "y",
        };
        return Some((amount, unit));
    }

    if let Some(caps) = long_age_re().captures(lower) {
        let amount = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "second" => "s",
            "minute" => "m",
            "hour" => "h",
            "day" => "d",
            "week" => "w",
            "month" => "mo",
            _ => "y",
        };
        return Some((amount, unit));
    }

    None
}

fn unit_precision(unit: &str) -> Precision {
    match unit {
        "s" | "m" | "h" => Precision::Hour,
        "d" => Precision::Day,
        "w" => Precision::Week,
        "mo" => Precision::Month,
        _ => Precision::Year,
    }
}

fn age_to_instant(amount: i64, unit: &str, observed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let age = match unit {
        "s" => TimeDelta::try_seconds(amount)?,
        "m" => TimeDelta::try_minutes(amount)?,
        "h" => TimeDelta::try_hours(amount)?,
        "d" => TimeDelta::try_days(amount)?,
        "w" => TimeDelta::try_weeks(amount)?,
        "mo" => TimeDelta::try_days(amount.checked_mul(30)?)?,
        _ => TimeDelta::try_days(amount.checked_mul(365)?)?,
    };
    observed_at.checked_sub_signed(age)
}

fn absolute_instant(segment: &str) -> Option<(DateTime<Utc>, Precision)> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(segment) {
        return Some((instant.with_timezone(&Utc), Precision::Exact));
    }
    let date = NaiveDate::parse_from_str(segment, "%Y-%m-%d").ok()?;
    Some((date.and_hms_opt(0, 0, 0)?.and_utc(), Precision::Day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn observed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn linkedin_post_timestamp() {
        let ts = normalize_timestamp(
            "2w • 2 weeks ago • Visible to anyone on or off LinkedIn",
            observed(),
        );
        assert_eq!(ts.precision, Precision::Week);
        assert_eq!(ts.relative_age.as_deref(), Some("2w"));
        assert_eq!(ts.approx_instant, Some(observed() - TimeDelta::weeks(2)));
        assert_eq!(
            ts.visibility.as_deref(),
            Some("Visible to anyone on or off LinkedIn")
        );
        assert!(!ts.edited);
    }

    #[test]
    fn edited_marker_and_months() {
        let ts = normalize_timestamp("5mo • Edited •", observed());
        assert_eq!(ts.precision, Precision::Month);
        assert!(ts.edited);
        assert_eq!(ts.relative_age.as_deref(), Some("5mo"));
    }

    #[test]
    fn minutes_are_not_months() {
        let ts = normalize_timestamp("12m", observed());
        assert_eq!(ts.precision, Precision::Hour);
        assert_eq!(ts.approx_instant, Some(observed() - TimeDelta::minutes(12)));
    }

    #[test]
    fn long_form_only() {
        let ts = normalize_timestamp("3 days ago", observed());
        assert_eq!(ts.precision, Precision::Day);
        assert_eq!(ts.relative_age.as_deref(), Some("3d"));
    }

    #[test]
    fn absolute_instants() {
        let ts = normalize_timestamp("2025-05-01T08:30:00Z", observed());
        assert_eq!(ts.precision, Precision::Exact);
        let ts = normalize_timestamp("2025-05-01", observed());
        assert_eq!(ts.precision, Precision::Day);
    }

    #[test]
    fn garbage_is_unknown_and_kept() {
        let ts = normalize_timestamp("sometime last spring", observed());
        assert_eq!(ts.precision, Precision::Unknown);
        assert_eq!(ts.approx_instant, None);
        assert_eq!(ts.raw, "sometime last spring");
        assert_eq!(ts.bounds(), None);
    }

    #[test]
    fn bounds_cover_one_span() {
        let ts = normalize_timestamp("1d", observed());
        let (earliest, latest) = ts.bounds().unwrap();
        assert_eq!(latest - earliest, TimeDelta::days(1));
        assert_eq!(latest, observed() - TimeDelta::days(1));
    }

    #[test]
    fn same_input_same_output() {
        let a = normalize_timestamp("3h", observed());
        let b = normalize_timestamp("3h", observed());
        assert_eq!(a, b);
    }
}
