//! Funding amount text ("$12M", "€3.5 million", "USD 500K") to a number.

/// Parse the first amount in `text`, scaled by a trailing magnitude word or suffix.
/// Currency is ignored.
pub fn parse_funding_amount(text: &str) -> Option<f64> {
    let lower = text.to_lowercase().replace(',', "");
    let start = lower.find(|c: char| c.is_ascii_digit())?;
    let rest = &lower[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..end].trim_end_matches('.').parse().ok()?;

    let tail = rest[end..].trim_start();
    let word: String = tail.chars().take_while(|c| c.is_alphabetic()).collect();
    let multiplier = match word.as_str() {
        "k" | "thousand" => 1e3,
        "m" | "mm" | "mn" | "million" | "millions" => 1e6,
        "b" | "bn" | "billion" | "billions" => 1e9,
        _ => 1.0,
    };
    let amount = value * multiplier;
    (amount > 0.0).then_some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_formats() {
        assert_eq!(parse_funding_amount("$12M"), Some(12_000_000.0));
        assert_eq!(parse_funding_amount("€3.5 million"), Some(3_500_000.0));
        assert_eq!(parse_funding_amount("USD 500K"), Some(500_000.0));
        assert_eq!(parse_funding_amount("$1.2B Series D"), Some(1_200_000_000.0));
        assert_eq!(parse_funding_amount("$2,500,000"), Some(2_500_000.0));
        assert_eq!(parse_funding_amount("12000000"), Some(12_000_000.0));
    }

    #[test]
    fn rejects_missing_amounts() {
        assert_eq!(parse_funding_amount("undisclosed"), None);
        assert_eq!(parse_funding_amount(""), None);
        assert_eq!(parse_funding_amount("$0"), None);
    }
}
