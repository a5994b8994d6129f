//! Plain-scalar tag resolution for the YAML core schema.
//!
//! The ladder runs null -> bool -> int -> float -> str. Which spellings each
//! rung accepts depends on the effective convention: YAML 1.1 recognises
//! `yes`/`no`/`on`/`off` booleans, `0b` binary integers and `_` digit
//! separators; YAML 1.2 (and 1.3) use the core schema; JSON accepts only the
//! JSON spellings.

use crate::{ParseMode, VersionDirective, BOOL_TAG, FLOAT_TAG, INT_TAG, NULL_TAG, STR_TAG};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Ladder {
    V11,
    V12,
    Json,
}

fn effective_ladder(mode: ParseMode, version: Option<VersionDirective>) -> Ladder {
    match mode {
        ParseMode::Json => Ladder::Json,
        _ => match version {
            Some(VersionDirective { major: 1, minor: 1 }) => Ladder::V11,
            Some(_) => Ladder::V12,
            None => {
                if mode == ParseMode::Yaml11 {
                    Ladder::V11
                } else {
                    Ladder::V12
                }
            }
        },
    }
}

/// Resolve the tag of a plain scalar under the given mode and the document's
/// `%YAML` directive, if any.
pub fn resolve_plain_scalar(
    mode: ParseMode,
    version: Option<VersionDirective>,
    value: &str,
) -> &'static str {
    let ladder = effective_ladder(mode, version);
    if is_null(ladder, value) {
        NULL_TAG
    } else if is_bool(ladder, value) {
        BOOL_TAG
    } else if is_int(ladder, value) {
        INT_TAG
    } else if is_float(ladder, value) {
        FLOAT_TAG
    } else {
        STR_TAG
    }
}

fn is_null(ladder: Ladder, value: &str) -> bool {
    match ladder {
        Ladder::Json => value == "null",
        _ => matches!(value, "" | "~" | "null" | "Null" | "NULL"),
    }
}

fn is_bool(ladder: Ladder, value: &str) -> bool {
    match ladder {
        Ladder::Json => matches!(value, "true" | "false"),
        Ladder::V12 => matches!(value, "true" | "True" | "TRUE" | "false" | "False" | "FALSE"),
        Ladder::V11 => matches!(
            value,
            "true"
                | "True"
                | "TRUE"
                | "false"
                | "False"
                | "FALSE"
                | "yes"
                | "Yes"
                | "YES"
                | "no"
                | "No"
                | "NO"
                | "on"
                | "On"
                | "ON"
                | "off"
                | "Off"
                | "OFF"
                | "y"
                | "Y"
                | "n"
                | "N"
        ),
    }
}

/// All characters of `digits` are digits of `radix`, with `_` separators
/// permitted (1.1 only) but not required. At least one digit.
fn all_digits(digits: &str, radix: u32, separators: bool) -> bool {
    let mut seen = false;
    for ch in digits.chars() {
        if ch == '_' {
            if !separators {
                return false;
            }
        } else if ch.is_digit(radix) {
            seen = true;
        } else {
            return false;
        }
    }
    seen
}

fn is_int(ladder: Ladder, value: &str) -> bool {
    match ladder {
        Ladder::Json => {
            let digits = value.strip_prefix('-').unwrap_or(value);
            !digits.is_empty()
                && digits.chars().all(|ch| ch.is_ascii_digit())
                && (digits == "0" || !digits.starts_with('0'))
        }
        Ladder::V12 => {
            let rest = value
                .strip_prefix(['-', '+'])
                .unwrap_or(value);
            if let Some(hex) = rest.strip_prefix("0x") {
                all_digits(hex, 16, false)
            } else if let Some(oct) = rest.strip_prefix("0o") {
                all_digits(oct, 8, false)
            } else {
                all_digits(rest, 10, false)
            }
        }
        Ladder::V11 => {
            let rest = value
                .strip_prefix(['-', '+'])
                .unwrap_or(value);
            if let Some(hex) = rest.strip_prefix("0x") {
                all_digits(hex, 16, true)
            } else if let Some(bin) = rest.strip_prefix("0b") {
                all_digits(bin, 2, true)
            } else if rest.len() > 1 && rest.starts_with('0') && all_digits(&rest[1..], 8, true) {
                true
            } else {
                all_digits(rest, 10, true)
            }
        }
    }
}

fn is_special_float(value: &str) -> bool {
    let rest = value.strip_prefix(['-', '+']).unwrap_or(value);
    matches!(rest, ".inf" | ".Inf" | ".INF") || matches!(value, ".nan" | ".NaN" | ".NAN")
}

fn is_decimal_float(value: &str, separators: bool) -> bool {
    let rest = value.strip_prefix(['-', '+']).unwrap_or(value);
    let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (rest, None),
    };
    if let Some(exponent) = exponent {
        let digits = exponent.strip_prefix(['-', '+']).unwrap_or(exponent);
        if !all_digits(digits, 10, false) {
            return false;
        }
    }
    match mantissa.split_once('.') {
        Some((int, frac)) => {
            if int.is_empty() && frac.is_empty() {
                return false;
            }
            (int.is_empty() || all_digits(int, 10, separators))
                && (frac.is_empty() || all_digits(frac, 10, separators))
        }
        // A bare integer mantissa is a float only with an exponent part.
        None => exponent.is_some() && all_digits(mantissa, 10, separators),
    }
}

fn is_float(ladder: Ladder, value: &str) -> bool {
    match ladder {
        Ladder::Json => {
            let rest = value.strip_prefix('-').unwrap_or(value);
            let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
                Some((m, e)) => (m, Some(e)),
                None => (rest, None),
            };
            let int_ok;
            let frac_ok;
            match mantissa.split_once('.') {
                Some((int, frac)) => {
                    int_ok = !int.is_empty()
                        && int.chars().all(|c| c.is_ascii_digit())
                        && (int == "0" || !int.starts_with('0'));
                    frac_ok = !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit());
                }
                None => {
                    // JSON floats need a fraction or an exponent.
                    int_ok = exponent.is_some()
                        && !mantissa.is_empty()
                        && mantissa.chars().all(|c| c.is_ascii_digit());
                    frac_ok = true;
                }
            }
            let exp_ok = match exponent {
                Some(e) => {
                    let digits = e.strip_prefix(['-', '+']).unwrap_or(e);
                    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
                }
                None => true,
            };
            int_ok && frac_ok && exp_ok
        }
        Ladder::V12 => is_special_float(value) || is_decimal_float(value, false),
        Ladder::V11 => is_special_float(value) || is_decimal_float(value, true),
    }
}

/// Best-effort numeric reading of a scalar, used by the ypath executor for
/// comparison and arithmetic coercions.
pub(crate) fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if matches!(rest, ".inf" | ".Inf" | ".INF") {
        return Some(sign * f64::INFINITY);
    }
    if matches!(rest, ".nan" | ".NaN" | ".NAN") {
        return Some(f64::NAN);
    }
    let plain: String = rest.chars().filter(|&c| c != '_').collect();
    if let Some(hex) = plain.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok().map(|v| sign * v as f64);
    }
    if let Some(oct) = plain.strip_prefix("0o") {
        return i64::from_str_radix(oct, 8).ok().map(|v| sign * v as f64);
    }
    if let Some(bin) = plain.strip_prefix("0b") {
        return i64::from_str_radix(bin, 2).ok().map(|v| sign * v as f64);
    }
    plain.parse::<f64>().ok().map(|v| sign * v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve12(value: &str) -> &'static str {
        resolve_plain_scalar(ParseMode::Yaml12, None, value)
    }

    fn resolve11(value: &str) -> &'static str {
        resolve_plain_scalar(ParseMode::Yaml11, None, value)
    }

    #[test]
    fn null_spellings() {
        for v in ["", "~", "null", "Null", "NULL"] {
            assert_eq!(resolve12(v), NULL_TAG, "{v:?}");
        }
        assert_eq!(resolve12("nuLL"), STR_TAG);
    }

    #[test]
    fn bool_ladder_differs_between_versions() {
        assert_eq!(resolve11("yes"), BOOL_TAG);
        assert_eq!(resolve11("Off"), BOOL_TAG);
        assert_eq!(resolve12("yes"), STR_TAG);
        assert_eq!(resolve12("True"), BOOL_TAG);
        assert_eq!(
            resolve_plain_scalar(ParseMode::Json, None, "True"),
            STR_TAG
        );
    }

    #[test]
    fn int_ladder() {
        assert_eq!(resolve12("42"), INT_TAG);
        assert_eq!(resolve12("-7"), INT_TAG);
        assert_eq!(resolve12("0x1F"), INT_TAG);
        assert_eq!(resolve12("0o17"), INT_TAG);
        assert_eq!(resolve12("1_000"), STR_TAG);
        assert_eq!(resolve11("1_000"), INT_TAG);
        assert_eq!(resolve11("0b1010"), INT_TAG);
        assert_eq!(resolve12("0b1010"), STR_TAG);
        assert_eq!(resolve_plain_scalar(ParseMode::Json, None, "007"), STR_TAG);
    }

    #[test]
    fn float_ladder() {
        assert_eq!(resolve12("3.14"), FLOAT_TAG);
        assert_eq!(resolve12("-2e10"), FLOAT_TAG);
        assert_eq!(resolve12(".5"), FLOAT_TAG);
        assert_eq!(resolve12(".inf"), FLOAT_TAG);
        assert_eq!(resolve12("-.Inf"), FLOAT_TAG);
        assert_eq!(resolve12(".nan"), FLOAT_TAG);
        assert_eq!(resolve12("."), STR_TAG);
        assert_eq!(resolve_plain_scalar(ParseMode::Json, None, "1.5e3"), FLOAT_TAG);
        assert_eq!(resolve_plain_scalar(ParseMode::Json, None, ".5"), STR_TAG);
    }

    #[test]
    fn version_directive_overrides_mode() {
        let v11 = Some(VersionDirective { major: 1, minor: 1 });
        assert_eq!(resolve_plain_scalar(ParseMode::Yaml12, v11, "on"), BOOL_TAG);
        let v12 = Some(VersionDirective { major: 1, minor: 2 });
        assert_eq!(resolve_plain_scalar(ParseMode::Yaml11, v12, "on"), STR_TAG);
    }

    #[test]
    fn number_parsing_for_coercions() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("0x10"), Some(16.0));
        assert_eq!(parse_number("-0b101"), Some(-5.0));
        assert_eq!(parse_number("2.5"), Some(2.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-.inf"), Some(f64::NEG_INFINITY));
    }
}
