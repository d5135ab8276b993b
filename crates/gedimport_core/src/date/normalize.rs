//! Free-form genealogical date parsing.
//!
//! # Responsibility
//! - Turn qualifier-laden date text (`ABT 1822`, `BET 1820 AND 1825`) into a
//!   [`DateValue`] with a sortable calendar date.
//!
//! # Invariants
//! - `normalize` never fails; unparseable input yields `is_valid == false`.
//! - Every value with a recognizable year gets a sortable date.
//! - Numeric slash dates are always month/day/year.

use crate::date::value::{DatePrecision, DateQualifier, DateValue, MONTH_ABBREVIATIONS};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

const MONTH_NAMES: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

static DAY_MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}) ([A-Z]+)\.? (\d{3,4})$").expect("valid day-month-year regex")
});
static MONTH_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+)\.? (\d{3,4})$").expect("valid month-year regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3,4})$").expect("valid year regex"));
static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid iso date regex"));
static SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid slash date regex"));

/// Components extracted by a syntactic matcher, before calendar validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawComponents {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
}

/// Normalizes one raw date expression.
///
/// The sortable date falls back to the first day of the month and then to
/// January 1 when the supplied components do not form a real calendar date.
/// Components dropped by that fallback are removed from the result so that
/// `precision` and [`DateValue::display`] never claim them.
pub fn normalize(raw: &str) -> DateValue {
    let working = raw.trim().to_uppercase();
    let tokens: Vec<&str> = working.split_whitespace().collect();
    if tokens.is_empty() {
        return DateValue::invalid(raw);
    }

    let (qualifier, rest) = strip_qualifier(&tokens);

    if let Some(split_at) = range_separator(qualifier, rest) {
        return normalize_range(raw, &rest[..split_at], &rest[split_at + 1..]);
    }

    let qualifier = match qualifier {
        LeadingQualifier::Known(value) => value,
        LeadingQualifier::From => DateQualifier::After,
        LeadingQualifier::To => DateQualifier::Before,
        LeadingQualifier::Absent => DateQualifier::None,
    };

    let mut value = normalize_simple(raw, &rest.join(" "));
    value.qualifier = qualifier;
    value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadingQualifier {
    Absent,
    Known(DateQualifier),
    From,
    To,
}

fn strip_qualifier<'a>(tokens: &'a [&'a str]) -> (LeadingQualifier, &'a [&'a str]) {
    let Some(first) = tokens.first() else {
        return (LeadingQualifier::Absent, tokens);
    };

    let keyword = first.trim_end_matches('.');
    let qualifier = match keyword {
        "ABT" | "ABOUT" | "CIRCA" | "CA" | "C" => LeadingQualifier::Known(DateQualifier::About),
        "BEF" | "BEFORE" => LeadingQualifier::Known(DateQualifier::Before),
        "AFT" | "AFTER" => LeadingQualifier::Known(DateQualifier::After),
        "BET" | "BETWEEN" => LeadingQualifier::Known(DateQualifier::Between),
        "EST" => LeadingQualifier::Known(DateQualifier::Estimated),
        "CALC" | "CAL" => LeadingQualifier::Known(DateQualifier::Calculated),
        "FROM" => LeadingQualifier::From,
        "TO" => LeadingQualifier::To,
        _ => return (LeadingQualifier::Absent, tokens),
    };
    (qualifier, &tokens[1..])
}

fn range_separator(qualifier: LeadingQualifier, rest: &[&str]) -> Option<usize> {
    if let Some(index) = rest.iter().position(|token| *token == "AND") {
        return Some(index);
    }
    if qualifier == LeadingQualifier::From {
        return rest.iter().position(|token| *token == "TO");
    }
    None
}

fn normalize_range(raw: &str, start_tokens: &[&str], end_tokens: &[&str]) -> DateValue {
    let start = normalize(&start_tokens.join(" "));
    let end = normalize(&end_tokens.join(" "));

    if !start.is_valid || !end.is_valid {
        let mut value = DateValue::invalid(raw);
        value.qualifier = DateQualifier::Between;
        return value;
    }

    DateValue {
        original: raw.to_string(),
        sortable_date: start.sortable_date,
        year: start.year,
        month: start.month,
        day: start.day,
        qualifier: DateQualifier::Between,
        end_year: end.year,
        precision: start.precision,
        is_valid: true,
    }
}

fn normalize_simple(raw: &str, text: &str) -> DateValue {
    let Some(components) = match_components(text) else {
        return DateValue::invalid(raw);
    };

    let Some((sortable, month, day)) = compose_sortable(components) else {
        return DateValue::invalid(raw);
    };

    let precision = if day.is_some() {
        DatePrecision::Day
    } else if month.is_some() {
        DatePrecision::Month
    } else {
        DatePrecision::Year
    };

    DateValue {
        original: raw.to_string(),
        sortable_date: Some(sortable),
        year: Some(components.year),
        month,
        day,
        qualifier: DateQualifier::None,
        end_year: None,
        precision: Some(precision),
        is_valid: true,
    }
}

/// Tries each fixed format in order; the first syntactic match wins.
fn match_components(text: &str) -> Option<RawComponents> {
    if let Some(caps) = DAY_MONTH_YEAR_RE.captures(text) {
        let month = month_from_name(&caps[2]);
        return Some(RawComponents {
            year: caps[3].parse().ok()?,
            day: month.and(caps[1].parse().ok()),
            month,
        });
    }

    if let Some(caps) = MONTH_YEAR_RE.captures(text) {
        return Some(RawComponents {
            year: caps[2].parse().ok()?,
            month: month_from_name(&caps[1]),
            day: None,
        });
    }

    if let Some(caps) = YEAR_RE.captures(text) {
        return Some(RawComponents {
            year: caps[1].parse().ok()?,
            month: None,
            day: None,
        });
    }

    if let Some(caps) = ISO_RE.captures(text) {
        return Some(RawComponents {
            year: caps[1].parse().ok()?,
            month: caps[2].parse().ok(),
            day: caps[3].parse().ok(),
        });
    }

    if let Some(caps) = SLASH_RE.captures(text) {
        return Some(RawComponents {
            year: caps[3].parse().ok()?,
            month: caps[1].parse().ok(),
            day: caps[2].parse().ok(),
        });
    }

    None
}

/// Returns the sortable date plus the month/day that survived validation.
fn compose_sortable(
    components: RawComponents,
) -> Option<(NaiveDate, Option<u32>, Option<u32>)> {
    let RawComponents { year, month, day } = components;
    let month_or_first = month.unwrap_or(1);

    if let Some(date) = NaiveDate::from_ymd_opt(year, month_or_first, day.unwrap_or(1)) {
        return Some((date, month, day));
    }
    if let Some(date) = NaiveDate::from_ymd_opt(year, month_or_first, 1) {
        return Some((date, month, None));
    }
    NaiveDate::from_ymd_opt(year, 1, 1).map(|date| (date, None, None))
}

fn month_from_name(name: &str) -> Option<u32> {
    let index = MONTH_ABBREVIATIONS
        .iter()
        .position(|abbr| *abbr == name)
        .or_else(|| {
            if name.len() < 3 {
                return None;
            }
            MONTH_NAMES.iter().position(|full| full.starts_with(name))
        })?;
    u32::try_from(index + 1).ok()
}

#[cfg(test)]
mod tests {
    use super::{month_from_name, normalize};
    use crate::date::value::{DatePrecision, DateQualifier};
    use chrono::{Datelike, NaiveDate};

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn full_date_keeps_day_precision() {
        let value = normalize("2 OCT 1822");
        assert!(value.is_valid);
        assert_eq!(value.sortable_date, Some(ymd(1822, 10, 2)));
        assert_eq!(value.precision, Some(DatePrecision::Day));
        assert_eq!(value.qualifier, DateQualifier::None);
        assert_eq!(value.display(), "2 OCT 1822");
    }

    #[test]
    fn qualified_year_defaults_to_first_of_january() {
        let value = normalize("ABT 1822");
        assert!(value.is_valid);
        assert_eq!(value.qualifier, DateQualifier::About);
        assert_eq!(value.sortable_date, Some(ymd(1822, 1, 1)));
        assert_eq!(value.precision, Some(DatePrecision::Year));
        assert_eq!(value.month, None);
        assert_eq!(value.day, None);
        assert_eq!(value.display(), "ABT 1822");
    }

    #[test]
    fn between_range_is_anchored_at_start() {
        let value = normalize("BET 1820 AND 1825");
        assert!(value.is_valid);
        assert_eq!(value.qualifier, DateQualifier::Between);
        assert_eq!(value.sortable_date, Some(ymd(1820, 1, 1)));
        assert_eq!(value.end_year, Some(1825));
        assert_eq!(value.display(), "BET 1820 AND 1825");
    }

    #[test]
    fn range_with_unparseable_side_is_invalid() {
        let value = normalize("BET 1820 AND sometime");
        assert!(!value.is_valid);
        assert!(value.sortable_date.is_none());
        assert_eq!(value.original, "BET 1820 AND sometime");

        let dangling = normalize("BET 1820 AND");
        assert!(!dangling.is_valid);
    }

    #[test]
    fn empty_input_is_invalid_and_preserved() {
        let value = normalize("");
        assert!(!value.is_valid);
        assert!(value.sortable_date.is_none());
        assert_eq!(value.original, "");

        let blank = normalize("   ");
        assert!(!blank.is_valid);
        assert_eq!(blank.original, "   ");
    }

    #[test]
    fn qualifier_table_is_case_insensitive() {
        let cases = [
            ("abt 1900", DateQualifier::About),
            ("circa 1900", DateQualifier::About),
            ("ca. 1900", DateQualifier::About),
            ("bef 1900", DateQualifier::Before),
            ("After 1900", DateQualifier::After),
            ("EST 1900", DateQualifier::Estimated),
            ("calc 1900", DateQualifier::Calculated),
        ];
        for (raw, expected) in cases {
            let value = normalize(raw);
            assert!(value.is_valid, "{raw} should parse");
            assert_eq!(value.qualifier, expected, "{raw}");
            assert_eq!(value.year, Some(1900));
        }
    }

    #[test]
    fn from_to_is_treated_as_range() {
        let value = normalize("FROM 1850 TO 1860");
        assert!(value.is_valid);
        assert_eq!(value.qualifier, DateQualifier::Between);
        assert_eq!(value.year, Some(1850));
        assert_eq!(value.end_year, Some(1860));

        let open = normalize("FROM MAR 1850");
        assert_eq!(open.qualifier, DateQualifier::After);
        assert_eq!(open.precision, Some(DatePrecision::Month));

        let closed = normalize("TO 1850");
        assert_eq!(closed.qualifier, DateQualifier::Before);
    }

    #[test]
    fn month_year_has_month_precision() {
        let value = normalize("MAR 1845");
        assert_eq!(value.sortable_date, Some(ymd(1845, 3, 1)));
        assert_eq!(value.precision, Some(DatePrecision::Month));
        assert_eq!(value.day, None);
        assert_eq!(value.display(), "MAR 1845");
    }

    #[test]
    fn full_month_names_are_accepted() {
        let value = normalize("14 September 1901");
        assert_eq!(value.sortable_date, Some(ymd(1901, 9, 14)));
        assert_eq!(value.display(), "14 SEP 1901");
        assert_eq!(month_from_name("SEPT"), Some(9));
        assert_eq!(month_from_name("MA"), None);
    }

    #[test]
    fn iso_and_slash_formats_parse() {
        let iso = normalize("1822-10-02");
        assert_eq!(iso.sortable_date, Some(ymd(1822, 10, 2)));
        assert_eq!(iso.precision, Some(DatePrecision::Day));

        let slash = normalize("10/02/1822");
        assert_eq!(slash.sortable_date, Some(ymd(1822, 10, 2)));
        assert_eq!(slash.month, Some(10));
        assert_eq!(slash.day, Some(2));
    }

    #[test]
    fn impossible_day_degrades_to_first_of_month() {
        let value = normalize("32 OCT 1822");
        assert!(value.is_valid);
        assert_eq!(value.sortable_date, Some(ymd(1822, 10, 1)));
        assert_eq!(value.day, None);
        assert_eq!(value.precision, Some(DatePrecision::Month));
        assert_eq!(value.display(), "OCT 1822");

        let leap = normalize("29 FEB 1821");
        assert_eq!(leap.sortable_date, Some(ymd(1821, 2, 1)));
    }

    #[test]
    fn impossible_month_degrades_to_year() {
        let value = normalize("1822-13-40");
        assert!(value.is_valid);
        assert_eq!(value.sortable_date, Some(ymd(1822, 1, 1)));
        assert_eq!(value.precision, Some(DatePrecision::Year));
        assert_eq!(value.display(), "1822");
    }

    #[test]
    fn unknown_month_name_keeps_year_only() {
        let value = normalize("VEND 1799");
        assert!(value.is_valid);
        assert_eq!(value.year, Some(1799));
        assert_eq!(value.month, None);
        assert_eq!(value.precision, Some(DatePrecision::Year));
    }

    #[test]
    fn text_without_year_is_invalid() {
        for raw in ["unknown", "(in the war)", "OCT", "12 OCT"] {
            let value = normalize(raw);
            assert!(!value.is_valid, "{raw} should be invalid");
            assert!(value.sortable_date.is_none());
            assert_eq!(value.original, raw);
        }
    }

    #[test]
    fn day_month_year_sortable_round_trips() {
        let mut date = ymd(1799, 1, 1);
        let end = ymd(1802, 12, 31);
        while date <= end {
            let text = date.format("%-d %b %Y").to_string().to_uppercase();
            let value = normalize(&text);
            assert_eq!(value.sortable_date, Some(date), "{text}");

            let reparsed = normalize(&value.display());
            assert_eq!(reparsed.sortable_date, Some(date), "{text}");
            date = date.succ_opt().unwrap();
        }
    }

    #[test]
    fn dates_without_day_never_display_a_day() {
        for raw in ["1822", "JUN 1822", "ABT JUN 1822", "BEF 1822", "EST 1700"] {
            let value = normalize(raw);
            assert!(matches!(
                value.precision,
                Some(DatePrecision::Month) | Some(DatePrecision::Year)
            ));
            let shown = value.display();
            let sortable_day = value.sortable_date.unwrap().day().to_string();
            assert!(
                !shown.split(' ').any(|part| part == sortable_day),
                "{raw} displayed as {shown}"
            );
        }
    }
}
