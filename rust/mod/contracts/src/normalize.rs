//! Date and money normalization for form input.
//!
//! Everything here is pure: no storage access, no clock.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};

/// IVA rate applied when the caller gives none (or a non-positive one).
pub const DEFAULT_IVA_PERCENT: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// Largest amount accepted from a form, in either direction: 10^15.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse a date-like string. Empty or unparsable input yields `None`.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Optional variant of [`normalize_date`].
pub fn normalize_opt_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(normalize_date)
}

/// `YYYY-MM-DD`.
pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Round to cents, half away from zero.
pub fn round2(d: Decimal) -> Decimal {
    let mut r = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    r.rescale(2);
    r
}

/// Coerce a numeric-like string to a 2-decimal amount; garbage becomes `0.00`.
///
/// Accepts `1234.5`, `1,234.50`, `1.234,50`, `1234,5`, a leading `$` and
/// surrounding whitespace.
pub fn normalize_amount(raw: &str) -> Decimal {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let canonical = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both separators: whichever comes last is the decimal point.
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(comma), None) => {
            let single = cleaned.matches(',').count() == 1;
            let digits_after = cleaned.len() - comma - 1;
            if single && digits_after != 3 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        _ => cleaned,
    };

    round2(Decimal::from_str(&canonical).unwrap_or(Decimal::ZERO))
}

/// Optional variant of [`normalize_amount`]; absent or blank input is `None`.
pub fn normalize_opt_amount(raw: Option<&str>) -> Option<Decimal> {
    raw.filter(|s| !s.trim().is_empty()).map(normalize_amount)
}

/// Fixed two-decimal rendering used for storage: `115.00`.
pub fn format_amount(d: Decimal) -> String {
    round2(d).to_string()
}

/// Parse a stored amount column back into a decimal.
pub fn parse_stored_amount(s: &str) -> Decimal {
    Decimal::from_str(s.trim()).map(round2).unwrap_or(Decimal::ZERO)
}

/// IVA percentage actually applied: non-positive or missing means the default.
pub fn effective_iva_percent(pct: Option<Decimal>) -> Decimal {
    match pct {
        Some(p) if p > Decimal::ZERO => round2(p),
        _ => round2(DEFAULT_IVA_PERCENT),
    }
}

/// `base × pct / 100`, rounded to cents. `None` on overflow.
pub fn derive_iva(base: Decimal, pct: Decimal) -> Option<Decimal> {
    base.checked_mul(pct)?
        .checked_div(Decimal::ONE_HUNDRED)
        .map(round2)
}

/// `base + iva`, rounded to cents. `None` on overflow.
pub fn derive_total(base: Decimal, iva: Decimal) -> Option<Decimal> {
    base.checked_add(iva).map(round2)
}

/// Use `supplied` when it is strictly positive, otherwise `derived()`.
pub fn supplied_or(
    supplied: Option<Decimal>,
    derived: impl FnOnce() -> Option<Decimal>,
) -> Option<Decimal> {
    match supplied {
        Some(v) if v > Decimal::ZERO => Some(round2(v)),
        _ => derived(),
    }
}

/// Whether `amount` lies outside `±MAX_AMOUNT`.
pub fn exceeds_limit(amount: Decimal) -> bool {
    amount.abs() > MAX_AMOUNT
}

/// Final service-id set for a contract.
///
/// Keeps positive ids in first-seen order without duplicates, and makes sure
/// the primary service is a member. An empty candidate list resolves to the
/// primary service alone.
pub fn resolve_service_ids(candidates: &[i64], primary: i64) -> Vec<i64> {
    let mut ids: Vec<i64> = Vec::with_capacity(candidates.len() + 1);
    if primary > 0 {
        ids.push(primary);
    }
    for &id in candidates {
        if id > 0 && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Deduplicated positive ids in first-seen order.
pub fn positive_unique(ids: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::with_capacity(ids.len());
    for &id in ids {
        if id > 0 && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates_in_common_shapes() {
        assert_eq!(normalize_date("2024-03-15"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date(" 2024-03-15 10:30:00 "), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("2024-03-15T10:30"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("2024-03-15T10:30:00-05:00"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("15/03/2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("15-03-2024"), Some(ymd(2024, 3, 15)));
    }

    #[test]
    fn bad_dates_are_none() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("   "), None);
        assert_eq!(normalize_date("0000-00-00"), None);
        assert_eq!(normalize_date("2024-02-30"), None);
        assert_eq!(normalize_date("mañana"), None);
        assert_eq!(normalize_opt_date(None), None);
        assert_eq!(format_date(ymd(2024, 1, 5)), "2024-01-05");
    }

    #[test]
    fn amounts_in_common_shapes() {
        assert_eq!(format_amount(normalize_amount("100")), "100.00");
        assert_eq!(format_amount(normalize_amount(" $1,234.5 ")), "1234.50");
        assert_eq!(format_amount(normalize_amount("1.234,56")), "1234.56");
        assert_eq!(format_amount(normalize_amount("99,9")), "99.90");
        assert_eq!(format_amount(normalize_amount("12,345")), "12345.00");
        assert_eq!(format_amount(normalize_amount("0.005")), "0.01");
        assert_eq!(format_amount(normalize_amount("abc")), "0.00");
        assert_eq!(format_amount(normalize_amount("")), "0.00");
        assert_eq!(normalize_opt_amount(Some("  ")), None);
        assert_eq!(normalize_opt_amount(None), None);
    }

    #[test]
    fn stored_amounts_round_trip() {
        assert_eq!(parse_stored_amount("115.00"), dec("115.00"));
        assert_eq!(parse_stored_amount("garbage"), Decimal::ZERO);
    }

    #[test]
    fn iva_defaults_to_fifteen_percent() {
        assert_eq!(effective_iva_percent(None), dec("15.00"));
        assert_eq!(effective_iva_percent(Some(Decimal::ZERO)), dec("15.00"));
        assert_eq!(effective_iva_percent(Some(dec("-3"))), dec("15.00"));
        assert_eq!(effective_iva_percent(Some(dec("12"))), dec("12.00"));

        let base = dec("100.00");
        let iva = derive_iva(base, effective_iva_percent(None)).unwrap();
        assert_eq!(format_amount(iva), "15.00");
        assert_eq!(format_amount(derive_total(base, iva).unwrap()), "115.00");
    }

    #[test]
    fn derivation_overflow_is_none() {
        assert_eq!(derive_iva(Decimal::MAX, dec("15")), None);
        assert_eq!(derive_total(Decimal::MAX, dec("1")), None);
        assert!(exceeds_limit(dec("1000000000000000.01")));
        assert!(exceeds_limit(dec("-1000000000000000.01")));
        assert!(!exceeds_limit(MAX_AMOUNT));
        assert_eq!(MAX_AMOUNT, dec("1000000000000000"));
    }

    #[test]
    fn supplied_values_win_only_when_positive() {
        assert_eq!(supplied_or(Some(dec("999")), || Some(dec("1"))), Some(dec("999.00")));
        assert_eq!(supplied_or(Some(Decimal::ZERO), || Some(dec("1"))), Some(dec("1")));
        assert_eq!(supplied_or(None, || None), None);
    }

    #[test]
    fn service_ids_resolution() {
        assert_eq!(resolve_service_ids(&[], 7), vec![7]);
        assert_eq!(resolve_service_ids(&[3, 3, -1, 0, 5], 3), vec![3, 5]);
        assert_eq!(resolve_service_ids(&[4, 5], 1), vec![1, 4, 5]);
        assert_eq!(resolve_service_ids(&[], 0), Vec::<i64>::new());
        assert_eq!(positive_unique(&[2, 2, 0, 9]), vec![2, 9]);
    }
}
