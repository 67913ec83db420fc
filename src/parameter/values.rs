//! Typing of raw parameter text and the numeric conversions between value kinds.
//!
//! Numbers are parsed the invariant way: `.` is the only decimal separator and
//! no thousands separators are accepted.

use super::ParsedValue;

/// Infers the value kind of an unquoted parameter token.
pub(crate) fn parse_value(text: &str) -> ParsedValue {
    if text.is_empty() {
        return ParsedValue::Null;
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return ParsedValue::Expression(trimmed.to_string());
    }

    if trimmed.contains(':') {
        return parse_array(trimmed).unwrap_or_else(|| ParsedValue::String(trimmed.to_string()));
    }

    if let Some(hex) = strip_hex_prefix(trimmed) {
        if let Ok(v) = i32::from_str_radix(hex, 16) {
            return ParsedValue::Int(v);
        }
        if let Ok(v) = u32::from_str_radix(hex, 16) {
            return ParsedValue::UInt(v);
        }
    }

    if let Ok(v) = trimmed.parse::<i32>() {
        ParsedValue::Int(v)
    } else if let Ok(v) = trimmed.parse::<u32>() {
        ParsedValue::UInt(v)
    } else if let Some(v) = parse_float(trimmed) {
        ParsedValue::Float(v)
    } else {
        ParsedValue::String(trimmed.to_string())
    }
}

fn parse_array(text: &str) -> Option<ParsedValue> {
    if text.contains('.') {
        return text
            .split(':')
            .map(|item| parse_float(item.trim()))
            .collect::<Option<Vec<_>>>()
            .map(ParsedValue::FloatArray);
    }

    if let Ok(items) = text
        .split(':')
        .map(|item| item.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
    {
        return Some(ParsedValue::IntArray(items));
    }
    text.split(':')
        .map(|item| item.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .ok()
        .map(ParsedValue::UIntArray)
}

fn strip_hex_prefix(text: &str) -> Option<&str> {
    text.strip_prefix("0x").filter(|hex| !hex.is_empty())
}

/// Parses a float, refusing tokens without a digit such as `inf` or `nan`.
pub(crate) fn parse_float(text: &str) -> Option<f32> {
    if !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Rounds half to even, then range checks.
pub(crate) fn float_to_i32(v: f32) -> Option<i32> {
    let r = f64::from(v).round_ties_even();
    (r >= f64::from(i32::MIN) && r <= f64::from(i32::MAX)).then_some(r as i32)
}

pub(crate) fn float_to_u32(v: f32) -> Option<u32> {
    let r = f64::from(v).round_ties_even();
    (r >= 0.0 && r <= f64::from(u32::MAX)).then_some(r as u32)
}

pub(crate) fn float_to_i64(v: f32) -> Option<i64> {
    let r = f64::from(v).round_ties_even();
    (r >= i64::MIN as f64 && r < i64::MAX as f64).then_some(r as i64)
}

/// Renders a typed value the way it is written in a code.
pub(crate) fn render(value: &ParsedValue) -> String {
    fn join<T: ToString>(items: &[T]) -> String {
        items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(":")
    }

    match value {
        ParsedValue::Null => String::new(),
        ParsedValue::Int(v) => v.to_string(),
        ParsedValue::UInt(v) => v.to_string(),
        ParsedValue::Float(v) => v.to_string(),
        ParsedValue::String(s) | ParsedValue::Expression(s) => s.clone(),
        ParsedValue::IntArray(v) => join(v),
        ParsedValue::UIntArray(v) => join(v),
        ParsedValue::FloatArray(v) => join(v),
        ParsedValue::DriverId(id) => id.to_string(),
        ParsedValue::DriverIdArray(ids) => join(ids),
    }
}

#[cfg(test)]
mod test {
    use super::{float_to_i32, float_to_u32, parse_value};
    use crate::ParsedValue;

    #[test]
    fn scalars_prefer_int_then_uint_then_float() {
        assert_eq!(parse_value("-12"), ParsedValue::Int(-12));
        assert_eq!(parse_value("+7"), ParsedValue::Int(7));
        assert_eq!(parse_value("4294967295"), ParsedValue::UInt(u32::MAX));
        assert_eq!(parse_value("2.5"), ParsedValue::Float(2.5));
        assert_eq!(parse_value("3e-2"), ParsedValue::Float(0.03));
        assert_eq!(parse_value(".5"), ParsedValue::Float(0.5));
    }

    #[test]
    fn hexadecimal_numbers() {
        assert_eq!(parse_value("0x123"), ParsedValue::Int(0x123));
        assert_eq!(parse_value("0xFFFFFFFF"), ParsedValue::UInt(u32::MAX));
        assert_eq!(parse_value("0x"), ParsedValue::String("0x".into()));
    }

    #[test]
    fn arrays_pick_the_narrowest_kind() {
        assert_eq!(parse_value("1:2:-3"), ParsedValue::IntArray(vec![1, 2, -3]));
        assert_eq!(
            parse_value("1:4294967295"),
            ParsedValue::UIntArray(vec![1, u32::MAX])
        );
        assert_eq!(
            parse_value("0.5:2"),
            ParsedValue::FloatArray(vec![0.5, 2.0])
        );
        assert_eq!(parse_value("1:x"), ParsedValue::String("1:x".into()));
        assert_eq!(parse_value("1.2:x"), ParsedValue::String("1.2:x".into()));
    }

    #[test]
    fn non_numeric_text_stays_a_string() {
        assert_eq!(parse_value(""), ParsedValue::Null);
        assert_eq!(parse_value("nan"), ParsedValue::String("nan".into()));
        assert_eq!(parse_value("hello "), ParsedValue::String("hello".into()));
        assert_eq!(
            parse_value("{1 + 2}"),
            ParsedValue::Expression("{1 + 2}".into())
        );
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(float_to_i32(2.5), Some(2));
        assert_eq!(float_to_i32(3.5), Some(4));
        assert_eq!(float_to_i32(-1.5), Some(-2));
        assert_eq!(float_to_i32(3e10), None);
        assert_eq!(float_to_u32(-0.7), None);
        assert_eq!(float_to_u32(-0.2), Some(0));
    }
}
