//! Normalizes raw turnover cells to the canonical "亿" (hundred-million) unit.

use serde::{Deserialize, Serialize};
use tracing::debug;

const YI: f64 = 1.0;
const WAN_PER_YI: f64 = 10_000.0;
const YUAN_PER_YI: f64 = 100_000_000.0;

/// The amount as it was read from the sheet, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl Default for RawAmount {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountUnit {
    Yi,
    Wan,
    Yuan,
}

impl AmountUnit {
    /// "亿" wins over "万" when both appear.
    pub fn detect(text: &str) -> Self {
        if text.contains('亿') {
            Self::Yi
        } else if text.contains('万') {
            Self::Wan
        } else {
            Self::Yuan
        }
    }

    fn divisor(self) -> f64 {
        match self {
            Self::Yi => YI,
            Self::Wan => WAN_PER_YI,
            Self::Yuan => YUAN_PER_YI,
        }
    }
}

/// Parses a raw cell into 亿. Numbers are taken as already canonical; text that
/// yields no number degrades to 0.
pub fn parse_amount(raw: &RawAmount) -> f64 {
    match raw {
        RawAmount::Number(value) => *value,
        RawAmount::Text(text) => parse_amount_text(text),
    }
}

pub fn parse_amount_text(raw: &str) -> f64 {
    if raw.is_empty() {
        return 0.0;
    }
    let cleaned = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>();
    let unit = AmountUnit::detect(&cleaned);
    let digits = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>();

    match leading_float(&digits) {
        Some(value) => value / unit.divisor(),
        None => {
            debug!(raw = %raw, "amount has no numeric part, using 0");
            0.0
        }
    }
}

/// Longest numeric prefix of a digits-and-dots string, so "1.2.3" reads as 1.2.
fn leading_float(digits: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    for (idx, c) in digits.char_indices() {
        if c == '.' {
            if seen_dot {
                break;
            }
            seen_dot = true;
        }
        end = idx + c.len_utf8();
    }
    let prefix = &digits[..end];
    if !prefix.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.trim_end_matches('.').parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawAmount {
        RawAmount::Text(s.to_string())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn same_value_in_every_unit_normalizes_equally() {
        assert_close(parse_amount(&text("12.5亿")), 12.5);
        assert_close(parse_amount(&text("125000万")), 12.5);
        assert_close(parse_amount(&text("1250000000")), 12.5);
        assert_close(parse_amount(&text("1,250,000,000 元")), 12.5);
    }

    #[test]
    fn numeric_input_is_returned_unchanged_and_idempotent() {
        let first = parse_amount(&RawAmount::Number(3.75));
        assert_eq!(first, 3.75);
        assert_eq!(parse_amount(&RawAmount::Number(first)), first);
    }

    #[test]
    fn yi_takes_precedence_over_wan() {
        assert_eq!(AmountUnit::detect("1亿2万"), AmountUnit::Yi);
        assert_close(parse_amount(&text("3亿万")), 3.0);
    }

    #[test]
    fn garbage_and_empty_degrade_to_zero() {
        assert_eq!(parse_amount(&text("")), 0.0);
        assert_eq!(parse_amount(&text("--")), 0.0);
        assert_eq!(parse_amount(&text("停牌")), 0.0);
        assert_eq!(parse_amount(&RawAmount::default()), 0.0);
    }

    #[test]
    fn separators_and_whitespace_are_stripped() {
        assert_close(parse_amount(&text(" 5,000 万 ")), 0.5);
        assert_close(parse_amount(&text("\t12.34\u{3000}亿")), 12.34);
    }

    #[test]
    fn extra_dots_stop_the_number() {
        assert_close(parse_amount(&text("1.2.3亿")), 1.2);
        assert_close(parse_amount(&text(".5亿")), 0.5);
    }
}
