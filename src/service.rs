use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::aggregate::{aggregate_bucket, IndustrySummary};
use crate::code_map::{CodeTableStats, IndustryCodeMap};
use crate::error::{TurnoverError, TurnoverResult};
use crate::export::{
    export_all_to_dir, export_file_name, export_summaries_to_path, BatchExportReport,
    NOTHING_TO_EXPORT_MESSAGE,
};
use crate::ingest::{ingest_sheet, IngestStats};
use crate::sheet_rows::read_first_sheet;
use crate::trade_store::{StorageLayout, TradeStore};

#[derive(Debug, Clone, Serialize)]
pub struct TurnoverStatus {
    pub data_dir: String,
    pub store_path: String,
    pub code_map_path: String,
    pub date_count: usize,
    pub row_count: usize,
    pub code_map_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateEntry {
    pub date: String,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateSummary {
    pub date: String,
    pub rows: Vec<IndustrySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeTableImport {
    pub source_file: String,
    pub entries: usize,
    pub stats: CodeTableStats,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub updated_count: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Exported { date: String, path: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchExportOutcome {
    Completed(BatchExportReport),
    Cancelled,
}

/// Owns the date-keyed store and the industry code map. Every mutation is written
/// back to disk before the call returns.
#[derive(Debug)]
pub struct TurnoverService {
    layout: StorageLayout,
    store: TradeStore,
    code_map: IndustryCodeMap,
}

fn non_empty_path(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

impl TurnoverService {
    /// Loads both blobs; absent or malformed files start empty.
    pub fn open(layout: StorageLayout) -> Self {
        let store = layout.load_store();
        let code_map = layout.load_code_map();
        info!(
            data_dir = %layout.data_dir.display(),
            dates = store.date_count(),
            codes = code_map.len(),
            "turnover data loaded"
        );
        Self {
            layout,
            store,
            code_map,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn store(&self) -> &TradeStore {
        &self.store
    }

    pub fn code_map(&self) -> &IndustryCodeMap {
        &self.code_map
    }

    pub fn status(&self) -> TurnoverStatus {
        TurnoverStatus {
            data_dir: self.layout.data_dir.to_string_lossy().to_string(),
            store_path: self.layout.store_path().to_string_lossy().to_string(),
            code_map_path: self.layout.code_map_path().to_string_lossy().to_string(),
            date_count: self.store.date_count(),
            row_count: self.store.buckets().map(|(_, rows)| rows.len()).sum(),
            code_map_size: self.code_map.len(),
        }
    }

    /// Reads the first sheet of a trade export and replaces the bucket of its date.
    /// Nothing changes when the file cannot be read.
    pub fn import_trade_file(&mut self, path: &Path) -> TurnoverResult<IngestStats> {
        let sheet = read_first_sheet(path).inspect_err(|err| {
            warn!(path = %path.display(), error = %err, "trade file rejected");
        })?;
        let mut next = self.store.clone();
        let stats = ingest_sheet(&sheet, &self.code_map, &mut next);
        self.layout.save_store(&next)?;
        self.store = next;
        Ok(stats)
    }

    /// Replaces the whole code map with the one read from `path`. Stored rows keep
    /// their codes until [`Self::refresh_codes`] runs.
    pub fn import_code_table(&mut self, path: &Path) -> TurnoverResult<CodeTableImport> {
        let sheet = read_first_sheet(path)?;
        let (code_map, stats) = IndustryCodeMap::from_sheet(&sheet)?;
        self.layout.save_code_map(&code_map)?;
        let entries = code_map.len();
        self.code_map = code_map;
        Ok(CodeTableImport {
            source_file: path.to_string_lossy().to_string(),
            entries,
            stats,
            message: "编号表上传成功，请点击刷新按钮更新所有数据的编号".to_string(),
        })
    }

    pub fn refresh_codes(&mut self) -> TurnoverResult<RefreshResult> {
        if self.code_map.is_empty() {
            return Err(TurnoverError::CodeMapEmpty);
        }
        let mut next = self.store.clone();
        let updated_count = self.code_map.refresh_store(&mut next);
        self.layout.save_store(&next)?;
        self.store = next;
        info!(updated = updated_count, "industry codes refreshed");
        Ok(RefreshResult {
            updated_count,
            message: format!("刷新完成，更新了 {updated_count} 条数据的编号"),
        })
    }

    pub fn list_dates(&self) -> Vec<DateEntry> {
        self.store
            .buckets()
            .map(|(date, rows)| DateEntry {
                date: date.to_string(),
                row_count: rows.len(),
            })
            .collect()
    }

    pub fn summarize(&self, date_key: &str) -> TurnoverResult<Vec<IndustrySummary>> {
        let rows = self
            .store
            .bucket(date_key)
            .ok_or_else(|| TurnoverError::UnknownDate(date_key.to_string()))?;
        Ok(aggregate_bucket(rows, &self.code_map))
    }

    pub fn summary_for_date(&self, date_key: &str) -> TurnoverResult<DateSummary> {
        Ok(DateSummary {
            date: date_key.to_string(),
            rows: self.summarize(date_key)?,
        })
    }

    pub fn suggested_file_name(date_key: &str) -> String {
        export_file_name(date_key)
    }

    /// Exports one date to the path picked in the save dialog. No path means the
    /// dialog was cancelled and nothing happens.
    pub fn export_date(
        &self,
        date_key: &str,
        target_path: Option<&str>,
    ) -> TurnoverResult<ExportOutcome> {
        let summaries = self.summarize(date_key)?;
        if summaries.is_empty() {
            return Err(TurnoverError::NothingToExport);
        }
        let Some(path) = non_empty_path(target_path) else {
            return Ok(ExportOutcome::Cancelled);
        };
        export_summaries_to_path(&summaries, date_key, &path)?;
        Ok(ExportOutcome::Exported {
            date: date_key.to_string(),
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Exports every date into the folder picked in the folder dialog.
    pub fn export_all(&self, target_dir: Option<&str>) -> TurnoverResult<BatchExportOutcome> {
        if self.store.is_empty() {
            return Err(TurnoverError::NothingToExport);
        }
        let Some(dir) = non_empty_path(target_dir) else {
            return Ok(BatchExportOutcome::Cancelled);
        };
        let report = export_all_to_dir(&self.store, &self.code_map, &dir);
        if report.exported == 0 && report.failures.is_empty() {
            info!(message = NOTHING_TO_EXPORT_MESSAGE, "batch export wrote no files");
        }
        Ok(BatchExportOutcome::Completed(report))
    }

    /// Deletes both local files and empties memory.
    pub fn clear_local_data(&mut self) -> TurnoverResult<()> {
        self.layout.remove_all()?;
        self.store.clear();
        self.code_map = IndustryCodeMap::default();
        info!(data_dir = %self.layout.data_dir.display(), "local data cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn temp_service() -> TurnoverService {
        let dir = std::env::temp_dir().join(format!("turnover_service_{}", Uuid::new_v4()));
        TurnoverService::open(StorageLayout::new(dir))
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        fs::create_dir_all(dir).expect("create fixture dir");
        let path = dir.join(name);
        fs::write(&path, body).expect("write fixture csv");
        path
    }

    #[test]
    fn import_persists_and_reopen_sees_the_same_data() {
        let mut service = temp_service();
        let fixtures = service.layout().data_dir.join("fixtures");
        let path = write_csv(
            &fixtures,
            "20240115.csv",
            "所属行业,成交金额\n银行,12.34亿\n银行,5000万\n",
        );

        let stats = service.import_trade_file(&path).expect("import");
        assert_eq!(stats.date_key, "20240115");
        assert_eq!(stats.row_count, 2);

        let reopened = TurnoverService::open(service.layout().clone());
        let summary = reopened.summarize("20240115").expect("summary");
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].total, "12.84");

        let _ = fs::remove_dir_all(&service.layout().data_dir);
    }

    #[test]
    fn rejected_upload_changes_nothing() {
        let mut service = temp_service();
        let fixtures = service.layout().data_dir.join("fixtures");
        let path = write_csv(&fixtures, "20240115.txt", "行业,成交金额\n银行,1亿\n");

        let err = service.import_trade_file(&path).expect_err("txt rejected");
        assert_eq!(err.category(), "MALFORMED_UPLOAD");
        assert!(service.store().is_empty());
        assert!(!service.layout().store_path().exists());

        let _ = fs::remove_dir_all(&service.layout().data_dir);
    }

    #[test]
    fn code_table_replaces_map_and_refresh_rewrites_rows() {
        let mut service = temp_service();
        let fixtures = service.layout().data_dir.join("fixtures");
        let trades = write_csv(
            &fixtures,
            "20240115.csv",
            "行业,成交金额\n银行,1亿\n证券,2亿\n",
        );
        service.import_trade_file(&trades).expect("import trades");
        assert!(matches!(
            service.refresh_codes(),
            Err(TurnoverError::CodeMapEmpty)
        ));

        let first = write_csv(&fixtures, "codes_a.csv", "行业代码,行业名称\n9,保险\n");
        service.import_code_table(&first).expect("first code table");
        let second = write_csv(&fixtures, "codes_b.csv", "编号,行业\n1,银行\n");
        let imported = service.import_code_table(&second).expect("second code table");
        assert_eq!(imported.entries, 1);
        assert_eq!(service.code_map().lookup("保险"), None, "upload replaces, not merges");

        let refreshed = service.refresh_codes().expect("refresh");
        assert_eq!(refreshed.updated_count, 1);
        let bucket = service.store().bucket("20240115").expect("bucket");
        assert_eq!(bucket[0].code, "1");
        assert_eq!(bucket[1].code, "");

        let reopened = TurnoverService::open(service.layout().clone());
        assert_eq!(reopened.store(), service.store());
        assert_eq!(reopened.code_map().lookup("银行"), Some("1"));

        let _ = fs::remove_dir_all(&service.layout().data_dir);
    }

    #[test]
    fn export_without_target_is_cancelled_and_unknown_date_errors() {
        let mut service = temp_service();
        let fixtures = service.layout().data_dir.join("fixtures");
        let trades = write_csv(&fixtures, "20240115.csv", "行业,成交金额\n银行,1亿\n");
        service.import_trade_file(&trades).expect("import trades");

        assert_eq!(
            service.export_date("20240115", None).expect("cancel"),
            ExportOutcome::Cancelled
        );
        assert_eq!(
            service.export_date("20240115", Some("  ")).expect("cancel"),
            ExportOutcome::Cancelled
        );
        assert!(matches!(
            service.export_date("19990101", None),
            Err(TurnoverError::UnknownDate(_))
        ));
        assert!(matches!(
            service.export_all(None).expect("cancel"),
            BatchExportOutcome::Cancelled
        ));

        let _ = fs::remove_dir_all(&service.layout().data_dir);
    }

    #[test]
    fn clear_local_data_removes_files_and_memory() {
        let mut service = temp_service();
        let fixtures = service.layout().data_dir.join("fixtures");
        let trades = write_csv(&fixtures, "20240115.csv", "行业,成交金额\n银行,1亿\n");
        service.import_trade_file(&trades).expect("import trades");
        assert_eq!(service.list_dates().len(), 1);

        service.clear_local_data().expect("clear");
        assert!(service.list_dates().is_empty());
        assert!(!service.layout().store_path().exists());
        assert!(matches!(
            service.export_all(Some("/tmp")),
            Err(TurnoverError::NothingToExport)
        ));

        let _ = fs::remove_dir_all(&service.layout().data_dir);
    }
}
