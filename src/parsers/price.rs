use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::DEFAULT_CURRENCY;

static NUMERIC_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d.,]*").expect("Invalid price regex"));

/// Parses the first number in a price label.
///
/// Separator handling covers both `1.500.000` (Indonesian thousands) and
/// `1,299.99` (US): when `.` and `,` both occur the last one is the decimal
/// mark; a single kind of separator is a thousands mark when it repeats or is
/// followed by exactly three digits, and a decimal mark otherwise.
pub fn parse_price(text: &str) -> ScrapeResult<f64> {
    let malformed = || ScrapeError::MalformedPrice {
        text: text.to_string(),
    };

    let run = NUMERIC_RUN
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']))
        .ok_or_else(malformed)?;

    let normalized = normalize_separators(run);
    let value: f64 = normalized.parse().map_err(|_| malformed())?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(malformed())
    }
}

fn normalize_separators(run: &str) -> String {
    let last_dot = run.rfind('.');
    let last_comma = run.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            let (decimal, thousands) = if dot > comma { ('.', ',') } else { (',', '.') };
            run.replace(thousands, "").replace(decimal, ".")
        }
        (Some(_), None) => single_separator(run, '.'),
        (None, Some(_)) => single_separator(run, ','),
        (None, None) => run.to_string(),
    }
}

fn single_separator(run: &str, sep: char) -> String {
    let parts: Vec<&str> = run.split(sep).collect();
    let thousands = parts.len() > 2 || parts.last().map_or(false, |tail| tail.len() == 3);
    if thousands {
        parts.concat()
    } else {
        parts.join(".")
    }
}

/// Currency code implied by a price label; IDR when nothing matches.
pub fn detect_currency(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    if upper.contains("RP") || upper.contains("RUPIAH") {
        "IDR"
    } else if upper.contains('$') || upper.contains("USD") {
        "USD"
    } else if upper.contains('€') || upper.contains("EUR") {
        "EUR"
    } else {
        DEFAULT_CURRENCY
    }
}

/// Price for output: integer when whole, two decimals otherwise.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{:.0}", price)
    } else {
        format!("{:.2}", price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rupiah_thousands_separators() {
        assert_eq!(parse_price("Rp1.500.000").unwrap(), 1_500_000.0);
        assert_eq!(parse_price("Rp 15.000").unwrap(), 15_000.0);
        assert_eq!(detect_currency("Rp1.500.000"), "IDR");
    }

    #[test]
    fn mixed_separators_use_the_last_as_decimal() {
        assert_eq!(parse_price("$1,299.99").unwrap(), 1299.99);
        assert_eq!(parse_price("1.299,50 EUR").unwrap(), 1299.5);
        assert_eq!(detect_currency("$1,299.99"), "USD");
    }

    #[test]
    fn lone_separator_without_three_digits_is_decimal() {
        assert_eq!(parse_price("€ 12,50").unwrap(), 12.5);
        assert_eq!(parse_price("12.5").unwrap(), 12.5);
        assert_eq!(detect_currency("€ 12,50"), "EUR");
    }

    #[test]
    fn ranges_take_the_first_number() {
        assert_eq!(parse_price("Rp1.500.000 - Rp2.000.000").unwrap(), 1_500_000.0);
    }

    #[test]
    fn text_without_digits_is_malformed() {
        assert!(matches!(
            parse_price("Hubungi penjual"),
            Err(ScrapeError::MalformedPrice { .. })
        ));
        assert_eq!(detect_currency("harga"), "IDR");
    }

    #[test]
    fn formatting_drops_zero_fraction() {
        assert_eq!(format_price(1_500_000.0), "1500000");
        assert_eq!(format_price(12.5), "12.50");
    }
}
