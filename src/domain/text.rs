use std::fmt;

use chrono::NaiveDate;

/// Marker appended to text cut by [`truncate`].
pub const ELLIPSIS: &str = "...";

/// Cut `s` to at most `max_chars` characters, ending with [`ELLIPSIS`] when cut.
/// Counts characters, not bytes, so accented names are never split.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return s.chars().take(max_chars).collect();
    }
    let kept: String = s.chars().take(max_chars - ELLIPSIS.len()).collect();
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

/// Format a date as `DD/MM/YYYY`.
pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Parse either `YYYY-MM-DD` or `DD/MM/YYYY`.
pub fn parse_date(input: &str) -> Result<NaiveDate, ParseDateError> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%d/%m/%Y"))
        .map_err(|_| ParseDateError(input.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDateError(pub String);

impl fmt::Display for ParseDateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid date '{}' (expected YYYY-MM-DD or DD/MM/YYYY)",
            self.0
        )
    }
}

impl std::error::Error for ParseDateError {}

/// Lowercase ASCII slug used in file names. Accents are folded, anything
/// else becomes a single `-`.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        let folded = match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            _ => '-',
        };
        if folded == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(folded);
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate("Posto", 10), "Posto");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate("Restaurante Bom Sabor", 12), "Restauran...");
        assert_eq!(truncate("Alimentação e hospedagem", 14).chars().count(), 14);
    }

    #[test]
    fn test_truncate_tiny_budget() {
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09"), Ok(expected));
        assert_eq!(parse_date("09/03/2024"), Ok(expected));
        assert!(parse_date("2024/03/09").is_err());
    }

    #[test]
    fn test_format_date_br() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(format_date_br(date), "01/12/2024");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("João da Conceição"), "joao-da-conceicao");
        assert_eq!(slugify("  Ana  "), "ana");
    }
}
