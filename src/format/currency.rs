use rust_decimal::{Decimal, RoundingStrategy};

/// Narrow no-break space, used by French grouping
const NARROW_NBSP: char = '\u{202F}';
const NBSP: char = '\u{00A0}';

struct NumberStyle {
    group: char,
    decimal: char,
    symbol_after: bool,
}

fn style_for(locale: &str) -> NumberStyle {
    let language = locale.split(['-', '_']).next().unwrap_or("").to_ascii_lowercase();
    match language.as_str() {
        "fr" => NumberStyle { group: NARROW_NBSP, decimal: ',', symbol_after: true },
        "de" | "es" | "it" | "nl" | "pt" => NumberStyle { group: '.', decimal: ',', symbol_after: true },
        _ => NumberStyle { group: ',', decimal: '.', symbol_after: false },
    }
}

fn symbol_for(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "EUR" => "€".to_string(),
        "USD" => "$".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        other => other.to_string(),
    }
}

fn group_digits(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Format an amount with two decimals in the conventions of `locale`.
///
/// `fr-FR` gives `1 234,56 €`, `en-US` gives `€1,234.56`. Unknown currency
/// codes are printed as-is in place of a symbol.
pub fn format_currency(amount: Decimal, currency: &str, locale: &str) -> String {
    let style = style_for(locale);
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let number = format!("{}{}{}", group_digits(int_part, style.group), style.decimal, frac_part);

    let symbol = symbol_for(currency);
    let sign = if negative { "-" } else { "" };
    if style.symbol_after {
        format!("{}{}{}{}", sign, number, NBSP, symbol)
    } else {
        format!("{}{}{}", sign, symbol, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn french_grouping_and_symbol() {
        let formatted = format_currency(dec("1234.56"), "EUR", "fr-FR");
        assert_eq!(formatted, "1\u{202F}234,56\u{00A0}€");
    }

    #[test]
    fn us_grouping_and_symbol() {
        assert_eq!(format_currency(dec("1234567.5"), "USD", "en-US"), "$1,234,567.50");
        assert_eq!(format_currency(dec("999"), "EUR", "en-US"), "€999.00");
    }

    #[test]
    fn zero_and_negative_amounts() {
        assert_eq!(format_currency(Decimal::ZERO, "EUR", "fr-FR"), "0,00\u{00A0}€");
        assert_eq!(format_currency(dec("-0.001"), "EUR", "en-US"), "€0.00");
        assert_eq!(format_currency(dec("-1500"), "EUR", "fr-FR"), "-1\u{202F}500,00\u{00A0}€");
        assert_eq!(format_currency(dec("-12.345"), "USD", "en-US"), "-$12.35");
    }

    #[test]
    fn unknown_currency_uses_code() {
        assert_eq!(format_currency(dec("10"), "CHF", "de-CH"), "10,00\u{00A0}CHF");
        assert!(format_currency(dec("10"), "XYZ", "en").contains("XYZ"));
    }
}
