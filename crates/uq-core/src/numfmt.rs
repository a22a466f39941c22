//! Numeric text formatting shared by the file formats and the script builder.
//!
//! The solver reads C `printf` style scientific notation (`1.0000000000000000e+00`),
//! while Rust's `{:e}` writes `1e0`. Everything that crosses the solver boundary
//! goes through [`sci`] so that exponents always carry a sign and two digits.

/// Value the solver writes for an output that has not been computed yet.
pub const UNSET_SENTINEL: f64 = 9.9999999999999997e34;

/// Canonical text of [`UNSET_SENTINEL`] as it appears in ensemble files.
pub const UNSET_SENTINEL_TEXT: &str = "9.9999999999999997e+34";

/// Digits after the decimal point used for every value written to the solver.
pub const WIRE_PRECISION: usize = 16;

/// Format `value` like C's `%.{precision}e`.
pub fn sci(value: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, value);
    match raw.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            Err(_) => raw,
        },
        // NaN and infinities carry no exponent
        None => raw,
    }
}

/// Format `value` like C's `% .{precision}e`: positive values get a leading blank.
pub fn sci_padded(value: f64, precision: usize) -> String {
    let body = sci(value, precision);
    if body.starts_with('-') {
        body
    } else {
        format!(" {}", body)
    }
}

/// True if `token` is one of the spellings the solver uses for the unset sentinel.
pub fn is_unset_token(token: &str) -> bool {
    matches!(
        token.trim(),
        "9.9999999999999997e+34" | "9.9999999999999997e+034"
    )
}

/// Parse a numeric token written by the solver, mapping the unset sentinel to NaN.
pub fn parse_value(token: &str) -> Option<f64> {
    let token = token.trim();
    if is_unset_token(token) {
        return Some(f64::NAN);
    }
    token.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sci_matches_c_printf() {
        assert_eq!(sci(1.0, 16), "1.0000000000000000e+00");
        assert_eq!(sci(-2.5e-7, 6), "-2.500000e-07");
        assert_eq!(sci(1.0e100, 2), "1.00e+100");
        assert_eq!(sci(0.0, 3), "0.000e+00");
    }

    #[test]
    fn sentinel_formats_to_canonical_text() {
        assert_eq!(sci(UNSET_SENTINEL, 16), UNSET_SENTINEL_TEXT);
    }

    #[test]
    fn padded_keeps_column_alignment() {
        assert_eq!(sci_padded(3.0, 2), " 3.00e+00");
        assert_eq!(sci_padded(-3.0, 2), "-3.00e+00");
    }

    #[test]
    fn sentinel_parses_as_nan() {
        assert!(parse_value("9.9999999999999997e+34").unwrap().is_nan());
        assert!(parse_value(" 9.9999999999999997e+034 ").unwrap().is_nan());
        assert_eq!(parse_value("1.5e+00"), Some(1.5));
        assert_eq!(parse_value("abc"), None);
    }

    proptest::proptest! {
        #[test]
        fn wire_precision_is_lossless(x in proptest::num::f64::NORMAL) {
            let text = sci(x, WIRE_PRECISION);
            proptest::prop_assert_eq!(parse_value(&text), Some(x));
        }
    }
}
