//! Locale-independent number parsing and formatting.
//!
//! The wire always uses `.` as the decimal separator regardless of the host
//! locale. Display formatting understands the printf-style `format` attribute
//! carried by number elements, including the sexagesimal `%<w>.<f>m` form.

use crate::error::{PropertyError, Result};

/// Parse a decimal, scientific or sexagesimal (`A:B:C`, `A B C`) number.
///
/// A leading `-` negates the whole value; missing sexagesimal parts are 0 and
/// any run of non-digit characters separates parts. Trailing garbage after the
/// last recognizable part is ignored.
pub fn parse_number(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed).trim_start()),
    };

    let mut parts = [0.0f64; 3];
    let mut rest = body;
    for (index, part) in parts.iter_mut().enumerate() {
        match scan_float(rest) {
            Some((value, len)) => {
                *part = value;
                rest = &rest[len..];
            }
            None if index == 0 => return Err(PropertyError::InvalidNumber(text.to_string())),
            None => break,
        }
        match rest.find(|c: char| c.is_ascii_digit()) {
            Some(skip) if skip > 0 => rest = &rest[skip..],
            _ => break,
        }
    }

    let value = parts[0] + parts[1] / 60.0 + parts[2] / 3600.0;
    Ok(if negative { -value } else { value })
}

/// Longest prefix of `text` that is a plain decimal or scientific number.
fn scan_float(text: &str) -> Option<(f64, usize)> {
    let bytes = text.as_bytes();
    let mut end = 0;
    let mut digits = 0;

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        let exp_digits = bytes[exp..].iter().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }

    text[..end].parse().ok().map(|value| (value, end))
}

/// Shortest decimal text that parses back to exactly `value`.
pub fn format_wire(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        value.to_string()
    }
}

/// Render `value` with an element's printf-style display format.
///
/// Supports `%<w>.<f>m` sexagesimal and `%[flags][width][.prec]` with
/// `f F e E g G d i` conversions. Literal text around the conversion is kept.
/// An unrecognized format falls back to [`format_wire`].
pub fn format_number(format: &str, value: f64) -> String {
    let Some(spec) = FormatSpec::parse(format) else {
        return format_wire(value);
    };
    let body = match spec.conversion {
        'm' => {
            let fracbase = match spec.precision.unwrap_or(0) {
                9 => 360_000,
                8 => 36_000,
                6 => 3_600,
                5 => 600,
                _ => 60,
            };
            let width = spec.width.saturating_sub(spec.precision.unwrap_or(0));
            return format!(
                "{}{}{}",
                literal(spec.prefix),
                format_sexagesimal(value, width, fracbase),
                literal(spec.suffix)
            );
        }
        'f' | 'F' => fixed(value, spec.precision.unwrap_or(6), spec.alternate),
        'e' | 'E' => scientific(value, spec.precision.unwrap_or(6), spec.alternate),
        'g' | 'G' => general(value, spec.precision.unwrap_or(6), spec.alternate),
        _ => format!("{}", value.trunc() as i64),
    };
    let body = if spec.conversion.is_ascii_uppercase() {
        body.to_ascii_uppercase()
    } else {
        body
    };
    format!(
        "{}{}{}",
        literal(spec.prefix),
        spec.pad(body, value),
        literal(spec.suffix)
    )
}

fn literal(text: &str) -> String {
    text.replace("%%", "%")
}

/// `fs_sexa`-style rendering: whole part right-aligned in `width`, then
/// minutes/seconds according to `fracbase`.
pub fn format_sexagesimal(value: f64, width: usize, fracbase: u64) -> String {
    let negative = value < 0.0;
    let scaled = (value.abs() * fracbase as f64 + 0.5) as u64;
    let whole = scaled / fracbase;
    let frac = scaled % fracbase;

    let mut out = if negative && whole == 0 {
        format!("{:>width$}", "-0")
    } else if negative {
        format!("{:>width$}", -(whole as i64))
    } else {
        format!("{whole:>width$}")
    };

    let tail = match fracbase {
        600 => format!(":{:02}.{}", frac / 10, frac % 10),
        3_600 => format!(":{:02}:{:02}", frac / 60, frac % 60),
        36_000 => {
            let seconds = frac % 600;
            format!(":{:02}:{:02}.{}", frac / 600, seconds / 10, seconds % 10)
        }
        360_000 => {
            let seconds = frac % 6_000;
            format!(":{:02}:{:02}.{:02}", frac / 6_000, seconds / 100, seconds % 100)
        }
        _ => format!(":{frac:02}"),
    };
    out.push_str(&tail);
    out
}

/// Largest width or precision honored; the format comes from the device.
const MAX_FORMAT_FIELD: usize = 64;

/// Width or precision digits; an empty field is 0.
fn field(digits: &str) -> Option<usize> {
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok().filter(|n| *n <= MAX_FORMAT_FIELD)
}

#[derive(Debug, Default)]
struct FormatSpec<'a> {
    prefix: &'a str,
    suffix: &'a str,
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

impl<'a> FormatSpec<'a> {
    fn parse(format: &'a str) -> Option<Self> {
        let mut search = 0;
        let start = loop {
            let at = search + format[search..].find('%')?;
            if format[at + 1..].starts_with('%') {
                search = at + 2;
                continue;
            }
            break at;
        };

        let mut spec = FormatSpec {
            prefix: &format[..start],
            ..FormatSpec::default()
        };
        let bytes = format.as_bytes();
        let mut i = start + 1;

        while i < bytes.len() {
            match bytes[i] {
                b'-' => spec.left = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'0' => spec.zero = true,
                b'#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        let width_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        spec.width = field(&format[width_start..i])?;
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let prec_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            spec.precision = Some(field(&format[prec_start..i])?);
        }
        while i < bytes.len() && matches!(bytes[i], b'l' | b'h' | b'L') {
            i += 1;
        }
        let conversion = char::from(*bytes.get(i)?);
        if !matches!(conversion, 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'd' | 'i' | 'm') {
            return None;
        }
        spec.conversion = conversion;
        spec.suffix = &format[i + 1..];
        Some(spec)
    }

    fn pad(&self, body: String, value: f64) -> String {
        let body = if !body.starts_with('-') && value.is_finite() {
            if self.plus {
                format!("+{body}")
            } else if self.space {
                format!(" {body}")
            } else {
                body
            }
        } else {
            body
        };
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{body}{}", " ".repeat(fill))
        } else if self.zero && value.is_finite() {
            let sign_len = usize::from(body.starts_with(['-', '+', ' ']));
            format!("{}{}{}", &body[..sign_len], "0".repeat(fill), &body[sign_len..])
        } else {
            format!("{}{body}", " ".repeat(fill))
        }
    }
}

fn fixed(value: f64, precision: usize, alternate: bool) -> String {
    let mut out = format!("{value:.precision$}");
    if alternate && precision == 0 {
        out.push('.');
    }
    out
}

fn scientific(value: f64, precision: usize, alternate: bool) -> String {
    if !value.is_finite() {
        return format_wire(value);
    }
    let raw = format!("{value:.precision$e}");
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let dot = if alternate && precision == 0 { "." } else { "" };
    format!("{mantissa}{dot}e{sign}{:02}", exponent.abs())
}

fn general(value: f64, precision: usize, alternate: bool) -> String {
    if !value.is_finite() {
        return format_wire(value);
    }
    let precision = precision.max(1);
    if value == 0.0 {
        return if alternate {
            fixed(0.0, precision - 1, true)
        } else {
            "0".to_string()
        };
    }

    let exp_form = format!("{:.*e}", precision - 1, value);
    let exponent: i32 = exp_form
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or(0);

    let out = if exponent < -4 || exponent >= precision as i32 {
        scientific(value, precision - 1, alternate)
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        fixed(value, decimals, alternate)
    };
    if alternate {
        out
    } else {
        strip_trailing_zeros(out)
    }
}

fn strip_trailing_zeros(text: String) -> String {
    let (mantissa, exponent) = match text.find('e') {
        Some(at) => text.split_at(at),
        None => (text.as_str(), ""),
    };
    if !mantissa.contains('.') {
        return text;
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{exponent}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_numbers() {
        assert_eq!(parse_number("50").unwrap(), 50.0);
        assert_eq!(parse_number("  -12.5\n").unwrap(), -12.5);
        assert_eq!(parse_number("+3").unwrap(), 3.0);
        assert_eq!(parse_number("1e-06").unwrap(), 1e-6);
        assert_eq!(parse_number("2.5E3").unwrap(), 2500.0);
        assert_eq!(parse_number(".5").unwrap(), 0.5);
    }

    #[test]
    fn parse_sexagesimal() {
        assert_eq!(parse_number("10:30:00").unwrap(), 10.5);
        assert_eq!(parse_number("10 30").unwrap(), 10.5);
        assert_eq!(parse_number("-0:30:00").unwrap(), -0.5);
        assert_eq!(parse_number("-10:30").unwrap(), -10.5);
        let value = parse_number("12:34:56.7").unwrap();
        assert!((value - (12.0 + 34.0 / 60.0 + 56.7 / 3600.0)).abs() < 1e-12);
    }

    #[test]
    fn parse_ignores_trailing_garbage() {
        assert_eq!(parse_number("42abc").unwrap(), 42.0);
    }

    #[test]
    fn parse_rejects_non_numbers() {
        assert!(parse_number("").is_err());
        assert!(parse_number("abc").is_err());
        assert!(parse_number("-").is_err());
    }

    #[test]
    fn parse_never_uses_comma_decimal() {
        assert_eq!(parse_number("1,5").unwrap(), 1.0 + 5.0 / 60.0);
    }

    #[test]
    fn wire_format_roundtrips() {
        for value in [0.0, 50.0, -0.25, 0.1, 1.0 / 3.0, 6.02214076e23, 1e-300] {
            let text = format_wire(value);
            assert_eq!(text.parse::<f64>().unwrap(), value, "{text}");
            assert!(!text.contains(','));
        }
        assert_eq!(format_wire(75.0), "75");
    }

    #[test]
    fn printf_style_formats() {
        assert_eq!(format_number("%g", 50.0), "50");
        assert_eq!(format_number("%g", 0.0001), "0.0001");
        assert_eq!(format_number("%g", 1234567.0), "1.23457e+06");
        assert_eq!(format_number("%.2f", 3.14159), "3.14");
        assert_eq!(format_number("%6.1f", 2.26), "   2.3");
        assert_eq!(format_number("%-6.1f|", 2.5), "2.5   |");
        assert_eq!(format_number("%06.2f", -1.5), "-01.50");
        assert_eq!(format_number("%+.1f", 1.0), "+1.0");
        assert_eq!(format_number("%.3e", 12345.678), "1.235e+04");
        assert_eq!(format_number("%E", 0.5), "5.000000E-01");
        assert_eq!(format_number("%d", 7.9), "7");
        assert_eq!(format_number("%.0f s", 12.0), "12 s");
        assert_eq!(format_number("100%% %.1f", 9.0), "100% 9.0");
    }

    #[test]
    fn sexagesimal_formats() {
        assert_eq!(format_number("%010.6m", 10.5), "  10:30:00");
        assert_eq!(format_number("%9.6m", -10.5), "-10:30:00");
        assert_eq!(format_number("%8.5m", 1.51), "  1:30.6");
        assert_eq!(format_number("%4.2m", 2.25), " 2:15");
        assert_eq!(format_number("%11.8m", 1.0 + 1.1 / 3600.0), "  1:00:01.1");
        assert_eq!(format_number("%12.9m", -0.25), " -0:15:00.00");
    }

    #[test]
    fn unknown_format_falls_back() {
        assert_eq!(format_number("", 1.5), "1.5");
        assert_eq!(format_number("%s", 1.5), "1.5");
    }

    #[test]
    fn oversized_width_or_precision_falls_back() {
        assert_eq!(format_number("%1000000000000000000g", 1.0), "1");
        assert_eq!(format_number("%.99999999999999999999f", 2.5), "2.5");
        assert_eq!(format_number("%65.1f", 2.5), "2.5");
        assert_eq!(format_number("%100.9m", 1.0), "1");
        assert_eq!(format_number("%64.1f", 2.5).len(), 64);
    }
}
