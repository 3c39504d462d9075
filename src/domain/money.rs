use std::fmt;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// R$ 50,00 = 5000 cents.
pub type Cents = i64;

/// Format cents as a plain decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Format cents the pt-BR way: thousands separated by `.`, decimals by `,`.
/// Example: 123456 -> "1.234,56", -5 -> "-0,05"
pub fn format_brl(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = (abs_cents / 100).to_string();
    let remainder = abs_cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("{}{},{:02}", sign, grouped, remainder)
}

/// Same as [`format_brl`] with the currency symbol in front.
pub fn format_brl_currency(cents: Cents) -> String {
    if cents < 0 {
        format!("-R$ {}", format_brl(-cents))
    } else {
        format!("R$ {}", format_brl(cents))
    }
}

/// Parse a decimal string into cents.
///
/// Accepts both the plain form ("1234.56", "12.5", "100") and the pt-BR form
/// ("1.234,56", "12,5", "1.500"). A comma anywhere switches to pt-BR parsing,
/// where dots are thousands separators. Without a comma, dot-separated groups
/// of three digits ("1.500", "1.234.567") are also read as thousands.
///
/// At most two decimal places are accepted.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim().trim_start_matches("R$").trim();
    if input.contains(',') || is_thousands_grouped(input) {
        let normalized: String = input
            .chars()
            .filter(|c| *c != '.')
            .map(|c| if c == ',' { '.' } else { c })
            .collect();
        return parse_plain(&normalized);
    }
    parse_plain(input)
}

fn is_thousands_grouped(input: &str) -> bool {
    let digits = input.strip_prefix('-').unwrap_or(input);
    let mut groups = digits.split('.');
    let head = groups.next().unwrap_or_default();
    let tail: Vec<&str> = groups.collect();

    !tail.is_empty()
        && (1..=3).contains(&head.len())
        && head.chars().all(|c| c.is_ascii_digit())
        && tail
            .iter()
            .all(|group| group.len() == 3 && group.chars().all(|c| c.is_ascii_digit()))
}

fn parse_plain(input: &str) -> Result<Cents, ParseCentsError> {
    let (negative, input) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    if input.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let (units_str, decimal_str) = input.split_once('.').unwrap_or((input, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(units_str)
        || !all_digits(decimal_str)
        || (units_str.is_empty() && decimal_str.is_empty())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };

    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        // "5" means 50 cents
        1 => decimal_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        2 => decimal_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
        _ => return Err(ParseCentsError::TooManyDecimals),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooManyDecimals => write!(f, "more than two decimal places"),
            ParseCentsError::Overflow => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-5000), "-50.00");
    }

    #[test]
    fn test_format_brl_groups_thousands() {
        assert_eq!(format_brl(0), "0,00");
        assert_eq!(format_brl(5), "0,05");
        assert_eq!(format_brl(99999), "999,99");
        assert_eq!(format_brl(123456), "1.234,56");
        assert_eq!(format_brl(123456789), "1.234.567,89");
        assert_eq!(format_brl(-123456), "-1.234,56");
    }

    #[test]
    fn test_format_brl_currency() {
        assert_eq!(format_brl_currency(7000), "R$ 70,00");
        assert_eq!(format_brl_currency(-150000), "-R$ 1.500,00");
    }

    #[test]
    fn test_parse_cents_plain() {
        assert_eq!(parse_cents("50.00"), Ok(5000));
        assert_eq!(parse_cents("50"), Ok(5000));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("-50.00"), Ok(-5000));
        assert_eq!(parse_cents("50."), Ok(5000));
    }

    #[test]
    fn test_parse_cents_grouped_thousands_without_comma() {
        assert_eq!(parse_cents("1.500"), Ok(150000));
        assert_eq!(parse_cents("1.234.567"), Ok(123456700));
        assert_eq!(parse_cents("-2.000"), Ok(-200000));
        // not three-digit groups, so a plain decimal
        assert_eq!(parse_cents("1.50"), Ok(150));
    }

    #[test]
    fn test_parse_cents_rejects_extra_decimals() {
        assert_eq!(parse_cents("100.9999"), Err(ParseCentsError::TooManyDecimals));
        assert_eq!(parse_cents("1.234,567"), Err(ParseCentsError::TooManyDecimals));
        assert_eq!(parse_cents(".500"), Err(ParseCentsError::TooManyDecimals));
    }

    #[test]
    fn test_parse_cents_overflow_is_an_error() {
        assert_eq!(parse_cents("922337203685477580"), Err(ParseCentsError::Overflow));
        assert_eq!(parse_cents("99999999999999999999"), Err(ParseCentsError::Overflow));
        assert_eq!(parse_cents("92233720368547758,08"), Err(ParseCentsError::Overflow));
        assert_eq!(parse_cents("92233720368547758.07"), Ok(i64::MAX));
    }

    #[test]
    fn test_parse_cents_pt_br() {
        assert_eq!(parse_cents("1.234,56"), Ok(123456));
        assert_eq!(parse_cents("12,5"), Ok(1250));
        assert_eq!(parse_cents("R$ 70,00"), Ok(7000));
        assert_eq!(parse_cents("-0,30"), Ok(-30));
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert!(parse_cents("abc").is_err());
        assert!(parse_cents("12.34.56").is_err());
        assert!(parse_cents("").is_err());
        assert!(parse_cents("1,2x").is_err());
        assert!(parse_cents("-").is_err());
        assert!(parse_cents(".").is_err());
        assert!(parse_cents("--5").is_err());
        assert!(parse_cents("+5").is_err());
    }
}
