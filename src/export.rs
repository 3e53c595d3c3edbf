//! XLSX export of per-date industry summaries.
//!
//! One workbook per date, one sheet named after the date, five columns:
//! 行业编号 / 行业 / 股票数量 / 成交总额（亿） / 日期.
//! Code, count and total are written as numeric cells so the file can be used for
//! further calculation.

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::aggregate::{aggregate_bucket, IndustrySummary};
use crate::code_map::IndustryCodeMap;
use crate::error::{TurnoverError, TurnoverResult};
use crate::trade_store::TradeStore;

pub const EXPORT_HEADERS: [&str; 5] = ["行业编号", "行业", "股票数量", "成交总额（亿）", "日期"];
pub const TOTAL_NUM_FORMAT: &str = "#,##0.00";
pub const NOTHING_TO_EXPORT_MESSAGE: &str = "没有可导出的数据";

const COLUMN_WIDTHS: [f64; 5] = [10.0, 18.0, 10.0, 16.0, 12.0];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFailure {
    pub date: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchExportReport {
    pub target_dir: String,
    pub total: usize,
    pub exported: usize,
    pub skipped_empty: usize,
    pub files: Vec<String>,
    pub failures: Vec<ExportFailure>,
    pub message: String,
}

pub fn export_file_name(date_key: &str) -> String {
    format!("{date_key}.xlsx")
}

fn write_headers(sheet: &mut Worksheet, format: &Format) -> Result<(), XlsxError> {
    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, format)?;
        sheet.set_column_width(col as u16, COLUMN_WIDTHS[col])?;
    }
    Ok(())
}

fn numeric_code(code: &str) -> Option<f64> {
    code.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Renders the summaries of one date as workbook bytes.
pub fn build_summary_workbook(
    summaries: &[IndustrySummary],
    date_label: &str,
) -> TurnoverResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let total_format = Format::new().set_num_format(TOTAL_NUM_FORMAT);

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(date_label)?;
        write_headers(sheet, &header_format)?;

        let mut row: u32 = 1;
        for summary in summaries {
            match numeric_code(&summary.code) {
                Some(code) => {
                    sheet.write_number(row, 0, code)?;
                }
                None if !summary.code.is_empty() => {
                    sheet.write_string(row, 0, &summary.code)?;
                }
                None => {}
            }
            sheet.write_string(row, 1, &summary.industry)?;
            sheet.write_number(row, 2, summary.count as f64)?;
            match summary.total.parse::<f64>() {
                Ok(total) => {
                    sheet.write_number_with_format(row, 3, total, &total_format)?;
                }
                Err(_) => {
                    sheet.write_string(row, 3, &summary.total)?;
                }
            }
            sheet.write_string(row, 4, date_label)?;
            row += 1;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Writes one date's workbook to a caller-chosen path.
pub fn export_summaries_to_path(
    summaries: &[IndustrySummary],
    date_label: &str,
    out_path: &Path,
) -> TurnoverResult<()> {
    if summaries.is_empty() {
        return Err(TurnoverError::NothingToExport);
    }
    let bytes = build_summary_workbook(summaries, date_label)?;
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out_path, bytes)?;
    info!(date_key = %date_label, path = %out_path.display(), rows = summaries.len(), "summary exported");
    Ok(())
}

/// Exports every non-empty date to `<dir>/<date>.xlsx`. A failing date is recorded
/// and the remaining dates are still exported.
pub fn export_all_to_dir(
    store: &TradeStore,
    code_map: &IndustryCodeMap,
    target_dir: &Path,
) -> BatchExportReport {
    let mut report = BatchExportReport {
        target_dir: target_dir.to_string_lossy().to_string(),
        total: store.date_count(),
        exported: 0,
        skipped_empty: 0,
        files: Vec::new(),
        failures: Vec::new(),
        message: String::new(),
    };

    for (date_key, rows) in store.buckets() {
        if rows.is_empty() {
            report.skipped_empty += 1;
            continue;
        }
        let summaries = aggregate_bucket(rows, code_map);
        let out_path: PathBuf = target_dir.join(export_file_name(date_key));
        match export_summaries_to_path(&summaries, date_key, &out_path) {
            Ok(()) => {
                report.exported += 1;
                report.files.push(out_path.to_string_lossy().to_string());
            }
            Err(err) => {
                warn!(date_key = %date_key, error = %err, "date export failed, continuing");
                report.failures.push(ExportFailure {
                    date: date_key.to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    report.message = if report.exported > 0 {
        format!("批量导出完成，共导出{}个文件", report.exported)
    } else {
        NOTHING_TO_EXPORT_MESSAGE.to_string()
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::RawAmount;
    use crate::trade_store::TradeRow;
    use calamine::{open_workbook_auto, Data, Reader};
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("turnover_export_{}", Uuid::new_v4()))
    }

    fn summary(code: &str, industry: &str, count: usize, total: &str) -> IndustrySummary {
        IndustrySummary {
            code: code.to_string(),
            industry: industry.to_string(),
            count,
            total: total.to_string(),
        }
    }

    fn trade_row(industry: &str, amount: f64) -> TradeRow {
        TradeRow {
            industry: industry.to_string(),
            raw_amount: RawAmount::Number(amount),
            amount,
            code: String::new(),
        }
    }

    #[test]
    fn exported_sheet_has_headers_and_numeric_cells() {
        let dir = temp_dir();
        let path = dir.join(export_file_name("20240115"));
        let summaries = vec![
            summary("1", "银行", 2, "1234.50"),
            summary("A7", "证券", 1, "0.25"),
            summary("", "未知", 3, "0.00"),
        ];
        export_summaries_to_path(&summaries, "20240115", &path).expect("export");

        let mut workbook = open_workbook_auto(&path).expect("open exported xlsx");
        assert_eq!(workbook.sheet_names(), vec!["20240115".to_string()]);
        let range = workbook.worksheet_range("20240115").expect("sheet range");
        let rows = range.rows().collect::<Vec<_>>();

        let headers = rows[0].iter().map(|c| c.to_string()).collect::<Vec<_>>();
        assert_eq!(headers, EXPORT_HEADERS.to_vec());

        assert_eq!(rows[1][0], Data::Float(1.0));
        assert_eq!(rows[1][1], Data::String("银行".to_string()));
        assert_eq!(rows[1][2], Data::Float(2.0));
        assert_eq!(rows[1][3], Data::Float(1234.5));
        assert_eq!(rows[1][4], Data::String("20240115".to_string()));
        assert_eq!(rows[2][0], Data::String("A7".to_string()));
        assert_eq!(rows[3][0], Data::Empty);
        assert_eq!(rows[3][2], Data::Float(3.0));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_summaries_are_not_written() {
        let dir = temp_dir();
        let path = dir.join("empty.xlsx");
        let err = export_summaries_to_path(&[], "20240115", &path).expect_err("nothing to export");
        assert!(matches!(err, TurnoverError::NothingToExport));
        assert!(!path.exists());
    }

    #[test]
    fn batch_export_skips_empty_and_isolates_failures() {
        let dir = temp_dir();
        let mut store = TradeStore::default();
        store.replace_bucket("20240115", vec![trade_row("银行", 1.0)]);
        store.replace_bucket("20240116", vec![]);
        // Sheet names cannot contain '/', so this date fails on its own.
        store.replace_bucket("2024/01/17", vec![trade_row("证券", 2.0)]);
        store.replace_bucket("20240118", vec![trade_row("保险", 3.0)]);

        let report = export_all_to_dir(&store, &IndustryCodeMap::default(), &dir);
        assert_eq!(report.total, 4);
        assert_eq!(report.exported, 2);
        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].date, "2024/01/17");
        assert!(dir.join("20240115.xlsx").exists());
        assert!(dir.join("20240118.xlsx").exists());
        assert_eq!(report.message, "批量导出完成，共导出2个文件");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn batch_export_of_only_empty_buckets_writes_nothing() {
        let dir = temp_dir();
        let mut store = TradeStore::default();
        store.replace_bucket("20240115", vec![]);
        let report = export_all_to_dir(&store, &IndustryCodeMap::default(), &dir);
        assert_eq!(report.exported, 0);
        assert_eq!(report.message, NOTHING_TO_EXPORT_MESSAGE);
        assert!(!dir.exists());
    }
}
