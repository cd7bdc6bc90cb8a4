//! Command argument parsing
//!
//! Cloud commands carry their arguments as one comma-separated string.
//! The helpers here split and validate those tokens without ever
//! mutating the input; handlers keep their arity and per-field checks
//! explicit at the call site.

use std::str::FromStr;

/// Splitting failed because the input has more tokens than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooManyTokens;

/// Split a comma-separated argument string into at most `max` tokens.
///
/// Tokens are borrowed slices of the input; empty tokens are preserved
/// so arity checks see exactly what the caller sent.
pub fn split_args(input: &str, max: usize) -> Result<Vec<&str>, TooManyTokens> {
    let mut tokens = Vec::new();
    for token in input.split(',') {
        if tokens.len() == max {
            return Err(TooManyTokens);
        }
        tokens.push(token);
    }
    Ok(tokens)
}

/// Check that a token is one or more ASCII decimal digits.
pub fn is_unsigned_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Parse an unsigned decimal token into the target integer type.
///
/// Rejects signs, whitespace, and values outside the type's range.
pub fn parse_unsigned<T: FromStr>(token: &str) -> Option<T> {
    if !is_unsigned_digits(token) {
        return None;
    }
    token.parse().ok()
}

/// Check that a token is a plain decimal number: an optional leading
/// minus, digits, and at most one dot with digits on both sides.
/// Exponents, infinities and NaN spellings are rejected.
pub fn is_valid_decimal(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() {
        return false;
    }
    match digits.split_once('.') {
        Some((int_part, dec_part)) => {
            !int_part.is_empty()
                && !dec_part.is_empty()
                && int_part.bytes().all(|b| b.is_ascii_digit())
                && dec_part.bytes().all(|b| b.is_ascii_digit())
        }
        None => digits.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Parse a plain decimal token into an `f64`.
pub fn parse_decimal(token: &str) -> Option<f64> {
    if !is_valid_decimal(token) {
        return None;
    }
    token.parse().ok()
}

/// Parse the literal tokens `true` / `false`.
pub fn parse_bool(token: &str) -> Option<bool> {
    match token {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        assert_eq!(split_args("a,b,c", 5).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_args("single", 5).unwrap(), vec!["single"]);
    }

    #[test]
    fn test_split_preserves_empty_tokens() {
        assert_eq!(split_args("a,,c", 5).unwrap(), vec!["a", "", "c"]);
        assert_eq!(split_args("", 5).unwrap(), vec![""]);
        assert_eq!(split_args("a,", 5).unwrap(), vec!["a", ""]);
    }

    #[test]
    fn test_split_too_many() {
        assert_eq!(split_args("1,2,3,4,5,6", 5), Err(TooManyTokens));
        assert!(split_args("1,2,3,4,5", 5).is_ok());
    }

    #[test]
    fn test_unsigned_digits() {
        assert!(is_unsigned_digits("0"));
        assert!(is_unsigned_digits("65535"));
        assert!(!is_unsigned_digits(""));
        assert!(!is_unsigned_digits("-1"));
        assert!(!is_unsigned_digits("1.5"));
        assert!(!is_unsigned_digits("12a"));
    }

    #[test]
    fn test_parse_unsigned_bounds() {
        assert_eq!(parse_unsigned::<u8>("255"), Some(255));
        assert_eq!(parse_unsigned::<u8>("256"), None);
        assert_eq!(parse_unsigned::<u16>("65535"), Some(65535));
        assert_eq!(parse_unsigned::<u16>("65536"), None);
        assert_eq!(parse_unsigned::<u32>("4294967295"), Some(u32::MAX));
        assert_eq!(parse_unsigned::<i32>("2147483648"), None);
    }

    #[test]
    fn test_valid_decimal() {
        assert!(is_valid_decimal("0"));
        assert!(is_valid_decimal("-12"));
        assert!(is_valid_decimal("3.14"));
        assert!(is_valid_decimal("-0.5"));
        assert!(!is_valid_decimal(""));
        assert!(!is_valid_decimal("-"));
        assert!(!is_valid_decimal(".5"));
        assert!(!is_valid_decimal("5."));
        assert!(!is_valid_decimal("1e5"));
        assert!(!is_valid_decimal("inf"));
        assert!(!is_valid_decimal("NaN"));
        assert!(!is_valid_decimal("1.2.3"));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("2.5"), Some(2.5));
        assert_eq!(parse_decimal("-10"), Some(-10.0));
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("True"), None);
        assert_eq!(parse_bool("1"), None);
    }
}
