use crate::process::utils::clean_str;

/// A cell after per-file coercion, before the dataset-wide missing-value fill.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// Value of a text column, trimmed.
    Text(String),
    /// Parsed value of a numeric column.
    Number(f64),
    /// Numeric cell that did not parse. `raw` keeps the cleaned input so a
    /// column that turns out to be textual can recover it.
    Missing { raw: String },
}

impl Coerced {
    pub fn missing() -> Self {
        Coerced::Missing { raw: String::new() }
    }
}

/// Placeholders the exports use for "no value".
const MISSING_MARKERS: [&str; 4] = ["", "-", "–", "—"];

/// Convert one raw cell. Never fails: unparseable numeric input becomes
/// [`Coerced::Missing`], with an empty `raw` for placeholders.
pub fn coerce(raw: &str, numeric: bool) -> Coerced {
    let cleaned = clean_str(raw);
    if !numeric {
        return Coerced::Text(cleaned);
    }
    match parse_locale_number(&cleaned) {
        Some(v) => Coerced::Number(v),
        None if is_blank(&cleaned) => Coerced::missing(),
        None => Coerced::Missing { raw: cleaned },
    }
}

/// Parse a German-formatted number: `12,5%` → 12.5, `+1,2` → 1.2,
/// `1.234,5` → 1234.5. Returns `None` for placeholders and garbage.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if MISSING_MARKERS.contains(&s) {
        return None;
    }

    let mut compact: String = s
        .chars()
        .filter(|c| *c != '%' && !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();

    if compact.contains(',') {
        // decimal comma: any dots are thousands grouping
        compact = compact.replace('.', "").replace(',', ".");
    }

    compact.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whether a cleaned cell counts as blank for textual-column detection.
pub fn is_blank(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_with_decimal_comma() {
        assert_eq!(coerce("12,5%", true), Coerced::Number(12.5));
        assert_eq!(coerce(" 12,5 % ", true), Coerced::Number(12.5));
    }

    #[test]
    fn placeholders_become_missing() {
        assert_eq!(coerce("-", true), Coerced::missing());
        assert_eq!(coerce("", true), Coerced::missing());
        assert_eq!(coerce("  ", true), Coerced::missing());
        assert_eq!(coerce(" — ", true), Coerced::missing());
    }

    #[test]
    fn garbage_is_missing_and_keeps_raw_text() {
        assert_eq!(
            coerce("n/a", true),
            Coerced::Missing {
                raw: "n/a".to_string()
            }
        );
        assert_eq!(parse_locale_number("inf"), None);
        assert_eq!(parse_locale_number("NaN"), None);
    }

    #[test]
    fn signed_and_grouped_numbers() {
        assert_eq!(parse_locale_number("+1,2"), Some(1.2));
        assert_eq!(parse_locale_number("-3,4"), Some(-3.4));
        assert_eq!(parse_locale_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_locale_number("1\u{a0}234"), Some(1234.0));
        assert_eq!(parse_locale_number("300"), Some(300.0));
        assert_eq!(parse_locale_number("0.25"), Some(0.25));
    }

    #[test]
    fn text_columns_pass_through_trimmed() {
        assert_eq!(coerce("  AfD ", false), Coerced::Text("AfD".into()));
        assert_eq!(coerce("12,5%", false), Coerced::Text("12,5%".into()));
    }
}
