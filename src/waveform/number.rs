//! Engineering-notation number parsing.
//!
//! Accepts an optional sign, a hex (`0x`), binary (`0b`), octal (leading `0`)
//! or decimal mantissa, an optional exponent and an optional scale suffix.
//! Anything after the suffix is ignored, so `"1kohm"` parses as `1000`.

/// Parse a number written in engineering notation.
///
/// Returns `None` when no digits can be read.
pub fn parse_number(s: &str) -> Option<f64> {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len();
    let mut index = 0;

    while index < n && chars[index].is_whitespace() {
        index += 1;
    }

    let mut sign = 1.0;
    if index < n && (chars[index] == '-' || chars[index] == '+') {
        if chars[index] == '-' {
            sign = -1.0;
        }
        index += 1;
    }

    // Radix prefixes ignore exponent and suffix
    if index + 1 < n && chars[index] == '0' {
        let radix = match chars[index + 1] {
            'x' | 'X' => Some(16),
            'b' | 'B' => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            return read_integer(&chars[index + 2..], radix).map(|v| sign * v);
        }
        if chars[index + 1] != '.' {
            return read_integer(&chars[index + 1..], 8).map(|v| sign * v);
        }
    }

    let start = index;
    let mut result = 0.0;
    while index < n {
        match chars[index].to_digit(10) {
            Some(d) => {
                result = result * 10.0 + d as f64;
                index += 1;
            }
            None => break,
        }
    }

    if index < n && chars[index] == '.' {
        index += 1;
        let mut places = 0;
        while index < n {
            match chars[index].to_digit(10) {
                Some(d) => {
                    result = result * 10.0 + d as f64;
                    places += 1;
                    index += 1;
                }
                None => break,
            }
        }
        result /= 10f64.powi(places);
    }

    // A bare "." or sign is not a number
    if index == start || (index == start + 1 && chars[start] == '.') {
        return None;
    }

    if index < n && (chars[index] == 'e' || chars[index] == 'E') {
        let mut exp_index = index + 1;
        let mut exp_sign = 1;
        if exp_index < n && (chars[exp_index] == '-' || chars[exp_index] == '+') {
            if chars[exp_index] == '-' {
                exp_sign = -1;
            }
            exp_index += 1;
        }
        let exp_start = exp_index;
        let mut exponent: i32 = 0;
        while exp_index < n {
            match chars[exp_index].to_digit(10) {
                Some(d) => {
                    exponent = exponent.saturating_mul(10).saturating_add(d as i32);
                    exp_index += 1;
                }
                None => break,
            }
        }
        // "1e" or "2meg" style text: treat the 'e' as trailing garbage
        if exp_index > exp_start {
            result *= 10f64.powi(exp_sign * exponent);
            index = exp_index;
        }
    }

    if index < n {
        result *= suffix_scale(chars[index]);
    }

    Some(sign * result)
}

fn read_integer(digits: &[char], radix: u32) -> Option<f64> {
    let mut result = 0.0;
    let mut any = false;
    for ch in digits {
        match ch.to_digit(radix) {
            Some(d) => {
                result = result * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    // "0" on its own reads as octal with no digits after the prefix
    if !any && radix == 8 {
        return Some(0.0);
    }
    any.then_some(result)
}

fn suffix_scale(ch: char) -> f64 {
    match ch {
        't' | 'T' => 1e12,
        'g' | 'G' => 1e9,
        'M' => 1e6,
        'k' | 'K' => 1e3,
        'm' => 1e-3,
        'u' | 'U' | 'µ' => 1e-6,
        'n' | 'N' => 1e-9,
        'p' | 'P' => 1e-12,
        'f' | 'F' => 1e-15,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("  -3.5"), Some(-3.5));
        assert_eq!(parse_number("+.25"), Some(0.25));
        assert_eq!(parse_number("4.7"), Some(4.7));
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_number("1k"), Some(1000.0));
        assert_eq!(parse_number("1kohm"), Some(1000.0));
        assert_eq!(parse_number("2M"), Some(2e6));
        assert_eq!(parse_number("1m"), Some(1e-3));
        assert_relative_eq!(parse_number("10u").unwrap(), 1e-5);
        assert_relative_eq!(parse_number("4.7n").unwrap(), 4.7e-9);
        assert_relative_eq!(parse_number("100p").unwrap(), 1e-10);
        assert_relative_eq!(parse_number("3f").unwrap(), 3e-15);
        assert_eq!(parse_number("1T"), Some(1e12));
        assert_eq!(parse_number("5V"), Some(5.0));
    }

    #[test]
    fn test_exponents() {
        assert_relative_eq!(parse_number("1e-3").unwrap(), 1e-3);
        assert_relative_eq!(parse_number("2.5E+2").unwrap(), 250.0);
        assert_relative_eq!(parse_number("1e3k").unwrap(), 1e6);
    }

    #[test]
    fn test_radix_prefixes() {
        assert_eq!(parse_number("0x1F"), Some(31.0));
        assert_eq!(parse_number("0b101"), Some(5.0));
        assert_eq!(parse_number("017"), Some(15.0));
        assert_eq!(parse_number("-0x10"), Some(-16.0));
        assert_eq!(parse_number("0"), Some(0.0));
        assert_eq!(parse_number("0.5"), Some(0.5));
    }

    #[test]
    fn test_rejects_non_numbers() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("0x"), None);
    }
}
