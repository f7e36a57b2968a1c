#![forbid(unsafe_code)]

//! Raw input coercion applied before a value is stored.

use formctl_core::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Coerce to a number. Blank or unparseable text becomes `NaN`; nullish
/// values pass through.
#[must_use]
pub fn value_as_number(value: &Value) -> Value {
    match value {
        Value::Number(_) | Value::Undefined | Value::Null => value.clone(),
        Value::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => Value::Number(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        _ => Value::Number(f64::NAN),
    }
}

/// Coerce text to a date. Unparseable text becomes `Null`.
#[must_use]
pub fn value_as_date(value: &Value) -> Value {
    match value {
        Value::String(s) => parse_date(s).map_or(Value::Null, Value::Date),
        other => other.clone(),
    }
}

/// Parse RFC 3339 timestamps, `YYYY-MM-DDTHH:MM[:SS]` local date-times
/// (taken as UTC), and plain `YYYY-MM-DD` dates (midnight UTC).
#[must_use]
pub fn parse_date(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(stamp) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(stamp);
    }
    let minutes = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    let seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    for format in [seconds, minutes] {
        if let Ok(local) = PrimitiveDateTime::parse(text, format) {
            return Some(local.assume_offset(UtcOffset::UTC));
        }
    }
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_offset(UtcOffset::UTC))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn numbers_from_text() {
        assert_eq!(value_as_number(&Value::from(" 42 ")), Value::from(42.0));
        assert!(value_as_number(&Value::from("")).as_f64().is_some_and(f64::is_nan));
        assert!(value_as_number(&Value::from("abc")).as_f64().is_some_and(f64::is_nan));
        assert_eq!(value_as_number(&Value::Null), Value::Null);
    }

    #[test]
    fn dates_from_text() {
        assert_eq!(
            parse_date("2024-02-29"),
            Some(datetime!(2024-02-29 0:00 UTC))
        );
        assert_eq!(
            parse_date("2024-02-29T13:45"),
            Some(datetime!(2024-02-29 13:45 UTC))
        );
        assert_eq!(
            parse_date("2024-02-29T13:45:00+02:00"),
            Some(datetime!(2024-02-29 11:45 UTC))
        );
        assert_eq!(value_as_date(&Value::from("nope")), Value::Null);
    }
}
