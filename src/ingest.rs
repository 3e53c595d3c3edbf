use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::amount::{parse_amount, RawAmount};
use crate::code_map::IndustryCodeMap;
use crate::sheet_rows::{CellValue, ParsedSheet, SheetRow};
use crate::trade_store::{TradeRow, TradeStore, UNKNOWN_DATE, UNKNOWN_INDUSTRY};

const INDUSTRY_KEYS: &[&str] = &["所属行业", "行业"];
const AMOUNT_COLUMN_NEEDLES: &[&str] = &["金额", "成交额", "成交金额"];

fn sheet_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{4}-?[0-9]{0,2}-?[0-9]{0,2}").expect("sheet date regex"))
}

fn header_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]{8}).*金额$").expect("header date regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    SheetName,
    HeaderColumn,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedDate {
    pub key: String,
    pub source: DateSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub import_id: String,
    pub imported_at: String,
    pub sheet_name: String,
    pub date_key: String,
    pub date_source: DateSource,
    pub replaced_existing: bool,
    pub row_count: usize,
    pub coded_count: usize,
    pub zero_amount_count: usize,
    pub amount_column: Option<String>,
}

/// Header column of the form `<yyyymmdd>...金额`, if any.
fn header_amount_column(headers: &[String]) -> Option<(&str, String)> {
    headers.iter().find_map(|header| {
        header_date_re()
            .captures(header)
            .map(|caps| (header.as_str(), caps[1].to_string()))
    })
}

/// Sheet name first, then an `<yyyymmdd>...金额` header, then the sentinel.
pub fn derive_date_key(sheet: &ParsedSheet) -> DerivedDate {
    if sheet_date_re().is_match(&sheet.sheet_name) {
        let key = sheet
            .sheet_name
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect::<String>();
        return DerivedDate {
            key,
            source: DateSource::SheetName,
        };
    }
    if let Some((_, digits)) = header_amount_column(&sheet.headers) {
        return DerivedDate {
            key: digits,
            source: DateSource::HeaderColumn,
        };
    }
    DerivedDate {
        key: UNKNOWN_DATE.to_string(),
        source: DateSource::Unknown,
    }
}

fn raw_amount_of(cell: Option<&CellValue>) -> RawAmount {
    match cell {
        Some(CellValue::Number(value)) => RawAmount::Number(*value),
        Some(CellValue::Text(text)) => RawAmount::Text(text.clone()),
        None => RawAmount::default(),
    }
}

fn amount_cell<'a>(row: &'a SheetRow, preferred: Option<&str>) -> Option<&'a CellValue> {
    preferred
        .and_then(|header| row.get(header))
        .or_else(|| row.find_by_substring(AMOUNT_COLUMN_NEEDLES).map(|(_, v)| v))
}

/// Turns one sheet row into a stored row.
pub fn normalize_row(
    row: &SheetRow,
    preferred_amount_column: Option<&str>,
    code_map: &IndustryCodeMap,
) -> TradeRow {
    let industry = row
        .first_exact(INDUSTRY_KEYS)
        .map(CellValue::as_text)
        .unwrap_or_else(|| UNKNOWN_INDUSTRY.to_string());
    let raw_amount = raw_amount_of(amount_cell(row, preferred_amount_column));
    let amount = parse_amount(&raw_amount);
    let code = code_map.lookup(&industry).unwrap_or_default().to_string();
    TradeRow {
        industry,
        raw_amount,
        amount,
        code,
    }
}

/// Normalizes every row of `sheet` and installs them as the bucket of the derived
/// date, replacing whatever that date held before.
pub fn ingest_sheet(
    sheet: &ParsedSheet,
    code_map: &IndustryCodeMap,
    store: &mut TradeStore,
) -> IngestStats {
    let date = derive_date_key(sheet);
    let preferred = header_amount_column(&sheet.headers).map(|(header, _)| header);

    let mut zero_amount_count = 0;
    let rows = sheet
        .rows
        .iter()
        .map(|row| {
            let trade_row = normalize_row(row, preferred, code_map);
            if trade_row.amount == 0.0 {
                zero_amount_count += 1;
                debug!(
                    industry = %trade_row.industry,
                    raw_amount = ?trade_row.raw_amount,
                    "amount missing or unparsable, counted as 0"
                );
            }
            trade_row
        })
        .collect::<Vec<_>>();

    let row_count = rows.len();
    let coded_count = rows.iter().filter(|r| !r.code.is_empty()).count();
    let replaced_existing = store.replace_bucket(&date.key, rows);
    if replaced_existing {
        info!(date_key = %date.key, "date already present, previous rows replaced");
    }

    let stats = IngestStats {
        import_id: Uuid::new_v4().to_string(),
        imported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        sheet_name: sheet.sheet_name.clone(),
        date_key: date.key,
        date_source: date.source,
        replaced_existing,
        row_count,
        coded_count,
        zero_amount_count,
        amount_column: preferred.map(str::to_string),
    };
    info!(
        import_id = %stats.import_id,
        date_key = %stats.date_key,
        rows = stats.row_count,
        coded = stats.coded_count,
        "sheet ingested"
    );
    stats
}
