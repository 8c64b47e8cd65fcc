//! Number formatting and prefix/suffix interpolation.

use chrono::{NaiveDate, NaiveDateTime};

use basis_core::{DomainError, DomainResult};

/// Zero-pad `number` to `padding` digits.
pub fn format_number(prefix: &str, number: i64, padding: usize, suffix: &str) -> String {
    format!("{prefix}{number:0padding$}{suffix}")
}

/// Expand `%(key)s` placeholders in a prefix or suffix.
///
/// Plain keys (`year`, `month`, ...) are taken from `at`; `range_*` keys from
/// the start of the date range the number was drawn from (or `at` when the
/// sequence has no date ranges).
pub fn interpolate(
    template: &str,
    at: NaiveDateTime,
    range_start: Option<NaiveDate>,
) -> DomainResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find(")s")
            .ok_or_else(|| invalid(template))?;
        let key = &after[..end];
        out.push_str(&expand_key(key, at, range_start).ok_or_else(|| invalid(template))?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn expand_key(key: &str, at: NaiveDateTime, range_start: Option<NaiveDate>) -> Option<String> {
    let (source, key) = match key.strip_prefix("range_") {
        Some(k) => (
            range_start
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or(at),
            k,
        ),
        None => (at, key),
    };
    let pattern = match key {
        "year" => "%Y",
        "y" => "%y",
        "month" => "%m",
        "day" => "%d",
        "doy" => "%j",
        "woy" => "%W",
        "weekday" => "%w",
        "h24" => "%H",
        "h12" => "%I",
        "min" => "%M",
        "sec" => "%S",
        _ => return None,
    };
    Some(source.format(pattern).to_string())
}

fn invalid(template: &str) -> DomainError {
    DomainError::validation(format!("invalid prefix or suffix for sequence: '{template}'"))
}
