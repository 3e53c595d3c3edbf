use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::code_map::IndustryCodeMap;
use crate::trade_store::TradeRow;

/// Per-industry turnover of one date. `total` is in 亿, fixed to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustrySummary {
    pub code: String,
    pub industry: String,
    pub count: usize,
    pub total: String,
}

#[derive(Debug)]
struct Group<'a> {
    industry: &'a str,
    code: String,
    count: usize,
    total: f64,
}

/// Groups rows by their raw industry string. Names differing only by surrounding
/// whitespace stay separate groups even when they resolve to the same code, to stay
/// compatible with data already exported.
pub fn aggregate_bucket(rows: &[TradeRow], code_map: &IndustryCodeMap) -> Vec<IndustrySummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for row in rows {
        let slot = *index.entry(row.industry.as_str()).or_insert_with(|| {
            groups.push(Group {
                industry: row.industry.as_str(),
                code: code_map.resolve(&row.code, &row.industry),
                count: 0,
                total: 0.0,
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.count += 1;
        group.total += row.amount;
    }

    // Vec::sort_by is stable, so equal codes keep encounter order.
    groups.sort_by(|a, b| compare_codes(&a.code, &b.code));

    groups
        .into_iter()
        .map(|group| IndustrySummary {
            code: group.code,
            industry: group.industry.to_string(),
            count: group.count,
            total: to_fixed_2(group.total),
        })
        .collect()
}

/// Two decimals, halves rounded away from zero like JavaScript's `toFixed(2)`.
///
/// Only values with an odd number of eighths in them sit exactly on a half cent, so
/// those are rounded in integers; everything else is correctly rounded by `{:.2}`.
pub fn to_fixed_2(value: f64) -> String {
    if value == 0.0 {
        return "0.00".to_string();
    }
    let eighths = value * 8.0;
    if eighths.fract() == 0.0 && eighths.abs() < 1e15 {
        let k = eighths as i64;
        if k % 2 != 0 {
            let cents = (k.abs() * 25 + 1) / 2;
            let sign = if k < 0 { "-" } else { "" };
            return format!("{sign}{}.{:02}", cents / 100, cents % 100);
        }
    }
    format!("{value:.2}")
}

/// Numeric when both codes are integers, lexicographic otherwise; empty codes last.
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::{parse_amount, RawAmount};

    fn row(industry: &str, amount: f64, code: &str) -> TradeRow {
        TradeRow {
            industry: industry.to_string(),
            raw_amount: RawAmount::Number(amount),
            amount,
            code: code.to_string(),
        }
    }

    fn codes(summaries: &[IndustrySummary]) -> Vec<&str> {
        summaries.iter().map(|s| s.code.as_str()).collect()
    }

    #[test]
    fn groups_count_and_total_with_two_decimals() {
        let rows = vec![
            row("银行", 12.34, ""),
            row("证券", 1.0, ""),
            row("银行", 0.5, ""),
        ];
        let out = aggregate_bucket(&rows, &IndustryCodeMap::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].industry, "银行");
        assert_eq!(out[0].count, 2);
        assert_eq!(out[0].total, "12.84");
        assert_eq!(out[1].total, "1.00");
    }

    #[test]
    fn half_cent_totals_round_up() {
        assert_eq!(to_fixed_2(0.125), "0.13");
        assert_eq!(to_fixed_2(12.625), "12.63");
        assert_eq!(to_fixed_2(0.375), "0.38");
        assert_eq!(to_fixed_2(-0.125), "-0.13");
        assert_eq!(to_fixed_2(0.25), "0.25");
        assert_eq!(to_fixed_2(1.005), "1.00", "1.005 is stored just below the half");
        assert_eq!(to_fixed_2(-0.0), "0.00");

        let amount = parse_amount(&RawAmount::Text("1250万".to_string()));
        let out = aggregate_bucket(&[row("银行", amount, "")], &IndustryCodeMap::default());
        assert_eq!(out[0].total, "0.13");
    }

    #[test]
    fn codes_sort_numeric_then_empty_last() {
        let rows = vec![
            row("a", 1.0, "10"),
            row("b", 1.0, "2"),
            row("c", 1.0, ""),
            row("d", 1.0, "1"),
        ];
        let out = aggregate_bucket(&rows, &IndustryCodeMap::default());
        assert_eq!(codes(&out), vec!["1", "2", "10", ""]);
    }

    #[test]
    fn non_numeric_codes_compare_lexically_and_ties_keep_order() {
        assert_eq!(compare_codes("B1", "A2"), Ordering::Greater);
        assert_eq!(compare_codes("10", "9x"), Ordering::Less, "lexical when one side is not numeric");
        let rows = vec![
            row("first", 1.0, "5"),
            row("second", 1.0, "05"),
            row("third", 1.0, ""),
            row("fourth", 1.0, ""),
        ];
        let out = aggregate_bucket(&rows, &IndustryCodeMap::default());
        let industries = out.iter().map(|s| s.industry.as_str()).collect::<Vec<_>>();
        assert_eq!(industries, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn explicit_row_code_beats_the_map() {
        let mut map = IndustryCodeMap::default();
        map.insert("industry", "50");
        let out = aggregate_bucket(&[row("industry", 1.0, "99")], &map);
        assert_eq!(out[0].code, "99");
    }

    #[test]
    fn group_code_falls_back_to_map_lookup() {
        let mut map = IndustryCodeMap::default();
        map.insert("半导体", "7");
        let out = aggregate_bucket(&[row(" 半导体", 1.0, ""), row("半导体", 2.0, "")], &map);
        assert_eq!(out.len(), 2, "untrimmed names stay separate groups");
        assert!(out.iter().all(|s| s.code == "7"));
    }

    #[test]
    fn permuting_rows_keeps_counts_and_totals() {
        let rows = vec![
            row("银行", 1.25, "1"),
            row("证券", 2.5, "2"),
            row("银行", 3.0, "1"),
            row("保险", 0.75, "3"),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        let map = IndustryCodeMap::default();
        assert_eq!(aggregate_bucket(&rows, &map), aggregate_bucket(&reversed, &map));
    }

    #[test]
    fn empty_bucket_has_no_summaries() {
        assert!(aggregate_bucket(&[], &IndustryCodeMap::default()).is_empty());
    }
}
