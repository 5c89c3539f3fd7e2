use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use super::{ClassHierarchy, ContainerKind, EnumType, ScalarKind, TypeDescriptor, is_of_type};
use crate::error::Error;
use crate::value::{EnumValue, Value};

/// Formats tried, in order, when a string is cast to a date.
pub const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// A failed cast hands the untouched value back so the caller can keep it.
#[derive(Debug)]
pub struct CastFailure {
    pub value: Value,
    pub error: Error,
}

fn failure(value: Value, target: &TypeDescriptor, reason: impl Into<String>) -> CastFailure {
    let error = Error::Typecast {
        value: format!("{value:?}"),
        target: target.display_name(),
        reason: reason.into(),
    };
    CastFailure { value, error }
}

/// Converts `value` to `target`.
///
/// A value that already belongs to `target` is moved straight back out.
pub fn typecast(value: Value, target: &TypeDescriptor, h: &dyn ClassHierarchy) -> Result<Value, CastFailure> {
    typecast_with(value, target, h, &[])
}

/// Like [`typecast`], trying `extra_date_formats` before the defaults.
pub fn typecast_with(
    value: Value,
    target: &TypeDescriptor,
    h: &dyn ClassHierarchy,
    extra_date_formats: &[String],
) -> Result<Value, CastFailure> {
    if is_of_type(&value, target, h) {
        return Ok(value);
    }
    match target {
        TypeDescriptor::Optional(inner) => {
            if matches!(&value, Value::Str(s) if s.trim().is_empty()) {
                return Ok(Value::None);
            }
            typecast_with(value, inner, h, extra_date_formats)
        }
        TypeDescriptor::Union(variants) => {
            let mut value = value;
            for variant in variants {
                match typecast_with(value, variant, h, extra_date_formats) {
                    Ok(converted) => return Ok(converted),
                    Err(fail) => value = fail.value,
                }
            }
            Err(failure(value, target, "no variant accepts the value"))
        }
        TypeDescriptor::Scalar(kind) => cast_scalar(value, *kind, extra_date_formats)
            .map_err(|(value, reason)| failure(value, target, reason)),
        TypeDescriptor::Enum(e) => cast_enum(value, e).map_err(|value| {
            let reason = format!("expected one of {}", e.variants.join(", "));
            failure(value, target, reason)
        }),
        TypeDescriptor::Container { kind, args } => {
            cast_container(value, *kind, args, target, h, extra_date_formats)
        }
        _ => Err(failure(value, target, "no conversion available")),
    }
}

fn cast_scalar(value: Value, kind: ScalarKind, formats: &[String]) -> Result<Value, (Value, String)> {
    let converted = match (&value, kind) {
        (Value::Str(s), ScalarKind::Int) => parse_int(s.trim()),
        (Value::Float(f), ScalarKind::Int) => float_to_int(f.0).map(Value::Int),
        (Value::Bool(b), ScalarKind::Int) => Some(Value::Int(*b as i64)),

        (Value::Str(s), ScalarKind::Float) => parse_float(s.trim()).map(Value::float),
        (Value::Int(i), ScalarKind::Float) => Some(Value::float(*i as f64)),

        (Value::Str(s), ScalarKind::Bool) => parse_bool(s.trim()).map(Value::Bool),
        (Value::Int(0), ScalarKind::Bool) => Some(Value::Bool(false)),
        (Value::Int(1), ScalarKind::Bool) => Some(Value::Bool(true)),

        (Value::Str(s), ScalarKind::Date) => parse_date(s.trim(), formats).map(Value::Date),
        (Value::DateTime(dt), ScalarKind::Date) => Some(Value::Date(dt.date())),
        (Value::Int(_) | Value::Float(_), ScalarKind::Date) => {
            serial_to_datetime(&value).map(|dt| Value::Date(dt.date()))
        }

        (Value::Str(s), ScalarKind::DateTime) => parse_datetime(s.trim(), formats).map(Value::DateTime),
        (Value::Date(d), ScalarKind::DateTime) => Some(Value::DateTime(d.and_time(NaiveTime::MIN))),
        (Value::Int(_) | Value::Float(_), ScalarKind::DateTime) => {
            serial_to_datetime(&value).map(Value::DateTime)
        }

        (Value::Str(s), ScalarKind::Bytes) => Some(Value::Bytes(s.as_bytes().to_vec())),

        (
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Date(_) | Value::DateTime(_) | Value::Enum(_),
            ScalarKind::Str,
        ) => Some(Value::Str(value.to_cell_text())),
        (Value::Bytes(b), ScalarKind::Str) => String::from_utf8(b.clone()).ok().map(Value::Str),
        _ => None,
    };
    match converted {
        Some(v) => Ok(v),
        None => {
            let reason = format!("{} is not convertible to {}", value.type_label(), kind.name());
            Err((value, reason))
        }
    }
}

fn parse_int(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    // spreadsheets hand integers over as "5.0"
    parse_float(s).and_then(float_to_int).map(Value::Int)
}

/// Whole floats within `i64` range; `as` would saturate everything else.
fn float_to_int(f: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (f.is_finite() && f.fract() == 0.0 && (-BOUND..BOUND).contains(&f)).then_some(f as i64)
}

fn parse_float(s: &str) -> Option<f64> {
    s.parse::<f64>()
        .ok()
        .or_else(|| if s.contains('.') { None } else { s.replacen(',', ".", 1).parse().ok() })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str, extra: &[String]) -> Option<NaiveDate> {
    let formats = extra.iter().map(String::as_str).chain(DEFAULT_DATE_FORMATS.iter().copied());
    for fmt in formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    parse_datetime_only(s).map(|dt| dt.date())
}

fn parse_datetime(s: &str, extra: &[String]) -> Option<NaiveDateTime> {
    parse_datetime_only(s).or_else(|| parse_date(s, extra).map(|d| d.and_time(NaiveTime::MIN)))
}

fn parse_datetime_only(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Spreadsheet serial dates count days from 1899-12-30.
fn serial_to_datetime(value: &Value) -> Option<NaiveDateTime> {
    let serial = match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => f.0,
        _ => return None,
    };
    if !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}

fn cast_enum(value: Value, e: &EnumType) -> Result<Value, Value> {
    let text = match &value {
        Value::Str(s) => s.trim(),
        Value::Enum(ev) => ev.variant.as_str(),
        _ => return Err(value),
    };
    let found = e
        .variants
        .iter()
        .find(|v| v.as_str() == text)
        .or_else(|| e.variants.iter().find(|v| v.eq_ignore_ascii_case(text)))
        .cloned();
    match found {
        Some(variant) => Ok(Value::Enum(EnumValue::new(e.name.clone(), variant))),
        None => Err(value),
    }
}

fn cast_container(
    value: Value,
    kind: ContainerKind,
    args: &[TypeDescriptor],
    target: &TypeDescriptor,
    h: &dyn ClassHierarchy,
    formats: &[String],
) -> Result<Value, CastFailure> {
    let items = match (&value, kind) {
        (Value::List(xs) | Value::Set(xs), ContainerKind::List | ContainerKind::Set) => xs.clone(),
        _ => return Err(failure(value, target, "not a compatible collection")),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let converted = match args.first() {
            Some(item_type) => match typecast_with(item, item_type, h, formats) {
                Ok(v) => v,
                Err(fail) => {
                    return Err(CastFailure { value, error: fail.error });
                }
            },
            None => item,
        };
        match kind {
            ContainerKind::Set => {
                Value::set_insert(&mut out, converted);
            }
            _ => out.push(converted),
        }
    }
    Ok(match kind {
        ContainerKind::Set => Value::Set(out),
        _ => Value::List(out),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::Flat;

    fn cast(value: Value, target: &TypeDescriptor) -> Result<Value, CastFailure> {
        typecast(value, target, &Flat)
    }

    #[test]
    fn value_already_of_target_type_is_returned_unchanged() {
        let text = String::from("unchanged");
        let ptr = text.as_ptr();
        match cast(Value::Str(text), &TypeDescriptor::string()) {
            Ok(Value::Str(s)) => assert_eq!(s.as_ptr(), ptr, "no reallocation on the fast path"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strings_become_scalars() {
        assert_eq!(cast(Value::str(" 42 "), &TypeDescriptor::int()).unwrap(), Value::Int(42));
        assert_eq!(cast(Value::str("5.0"), &TypeDescriptor::int()).unwrap(), Value::Int(5));
        assert_eq!(cast(Value::str("2,5"), &TypeDescriptor::float()).unwrap(), Value::float(2.5));
        assert_eq!(cast(Value::str("Yes"), &TypeDescriptor::boolean()).unwrap(), Value::Bool(true));
        assert_eq!(
            cast(Value::str("2021-01-01"), &TypeDescriptor::date()).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
        );
        assert_eq!(
            cast(Value::str("24.12.2020"), &TypeDescriptor::date()).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2020, 12, 24).unwrap())
        );
        assert_eq!(cast(Value::Int(7), &TypeDescriptor::string()).unwrap(), Value::str("7"));
    }

    #[test]
    fn out_of_range_floats_do_not_become_ints() {
        let int = TypeDescriptor::int();
        assert_eq!(cast(Value::float(-9.0e18), &int).unwrap(), Value::Int(-9_000_000_000_000_000_000));
        for huge in [1.0e30, f64::INFINITY, f64::NAN, 9_223_372_036_854_775_808.0] {
            let fail = cast(Value::float(huge), &int).unwrap_err();
            assert!(matches!(fail.error, Error::Typecast { .. }));
            assert_eq!(fail.value, Value::float(huge));
        }
        let fail = cast(Value::str("1e30"), &int).unwrap_err();
        assert_eq!(fail.value, Value::str("1e30"));
        assert!(cast(Value::float(2.5), &int).is_err());
    }

    #[test]
    fn spreadsheet_serial_numbers_become_dates() {
        assert_eq!(
            cast(Value::Int(44197), &TypeDescriptor::date()).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
        );
    }

    #[test]
    fn extra_formats_are_tried_first() {
        let formats = vec!["%Y%m%d".to_string()];
        let v = typecast_with(Value::str("20210315"), &TypeDescriptor::date(), &Flat, &formats).unwrap();
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2021, 3, 15).unwrap()));
    }

    #[test]
    fn optional_maps_blank_to_none_and_unions_try_in_order() {
        let opt = TypeDescriptor::optional(TypeDescriptor::int());
        assert_eq!(cast(Value::str("  "), &opt).unwrap(), Value::None);
        assert_eq!(cast(Value::str("3"), &opt).unwrap(), Value::Int(3));

        let u = TypeDescriptor::union([TypeDescriptor::int(), TypeDescriptor::boolean()]);
        assert_eq!(cast(Value::str("no"), &u).unwrap(), Value::Bool(false));
    }

    #[test]
    fn enums_match_variants_case_insensitively() {
        let kind = TypeDescriptor::enumeration("Kind", &["Template", "Instance"]);
        assert_eq!(
            cast(Value::str("instance"), &kind).unwrap(),
            Value::Enum(EnumValue::new("Kind", "Instance"))
        );
        let fail = cast(Value::str("other"), &kind).unwrap_err();
        assert_eq!(fail.value, Value::str("other"));
    }

    #[test]
    fn failure_hands_back_the_original_value() {
        let fail = cast(Value::str("not a number"), &TypeDescriptor::int()).unwrap_err();
        assert_eq!(fail.value, Value::str("not a number"));
        assert!(matches!(fail.error, Error::Typecast { .. }));

        let ints = TypeDescriptor::list_of(TypeDescriptor::int());
        let original = Value::List(vec![Value::str("1"), Value::str("x")]);
        let fail = cast(original.clone(), &ints).unwrap_err();
        assert_eq!(fail.value, original);
    }

    #[test]
    fn collections_cast_element_wise() {
        let ints = TypeDescriptor::set_of(TypeDescriptor::int());
        let v = cast(Value::List(vec![Value::str("1"), Value::str("1"), Value::str("2")]), &ints).unwrap();
        assert_eq!(v, Value::Set(vec![Value::Int(1), Value::Int(2)]));
    }
}
