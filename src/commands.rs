use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tauri::{AppHandle, Manager, State};

use crate::service::TurnoverService;
use crate::trade_store::StorageLayout;

pub struct TurnoverState {
    service: Mutex<TurnoverService>,
}

impl TurnoverState {
    pub fn load(app: &AppHandle) -> Result<Self, String> {
        let base = app
            .path()
            .app_local_data_dir()
            .map_err(|e| format!("无法解析 app_local_data_dir: {e}"))?;
        let service = TurnoverService::open(StorageLayout::under_app_dir(&base));
        Ok(Self {
            service: Mutex::new(service),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PathLookup {
    pub path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppPaths {
    pub app_data_dir: PathLookup,
    pub app_local_data_dir: PathLookup,
    pub app_log_dir: PathLookup,
}

#[derive(Debug, Deserialize)]
pub struct SourceFileRequest {
    pub source_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateQueryRequest {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportDateRequest {
    pub date: Option<String>,
    pub target_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportAllRequest {
    pub target_dir: Option<String>,
}

fn path_lookup(result: Result<PathBuf, tauri::Error>) -> PathLookup {
    match result {
        Ok(path) => PathLookup {
            path: Some(path.to_string_lossy().to_string()),
            error: None,
        },
        Err(err) => PathLookup {
            path: None,
            error: Some(err.to_string()),
        },
    }
}

fn required_text(raw: Option<String>, field: &str) -> Result<String, String> {
    let text = raw.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Err(format!("{field} 必填"));
    }
    Ok(text)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("序列化结果失败: {e}"))
}

#[tauri::command]
pub fn app_paths(app: AppHandle) -> AppPaths {
    let resolver = app.path();
    AppPaths {
        app_data_dir: path_lookup(resolver.app_data_dir()),
        app_local_data_dir: path_lookup(resolver.app_local_data_dir()),
        app_log_dir: path_lookup(resolver.app_log_dir()),
    }
}

#[tauri::command]
pub fn turnover_status(state: State<'_, TurnoverState>) -> Result<Value, String> {
    to_value(state.service.lock().status())
}

#[tauri::command]
pub fn turnover_import_file(
    state: State<'_, TurnoverState>,
    req: SourceFileRequest,
) -> Result<Value, String> {
    let source_path = required_text(req.source_path, "source_path")?;
    let mut service = state.service.lock();
    let stats = service
        .import_trade_file(Path::new(&source_path))
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "message": "上传并保存成功",
        "stats": stats,
        "dates": service.list_dates(),
    }))
}

#[tauri::command]
pub fn industry_codes_import_file(
    state: State<'_, TurnoverState>,
    req: SourceFileRequest,
) -> Result<Value, String> {
    let source_path = required_text(req.source_path, "source_path")?;
    let result = state
        .service
        .lock()
        .import_code_table(Path::new(&source_path))
        .map_err(|e| e.to_string())?;
    to_value(result)
}

#[tauri::command]
pub fn industry_codes_refresh(state: State<'_, TurnoverState>) -> Result<Value, String> {
    let result = state
        .service
        .lock()
        .refresh_codes()
        .map_err(|e| e.to_string())?;
    to_value(result)
}

#[tauri::command]
pub fn turnover_dates_query(state: State<'_, TurnoverState>) -> Result<Value, String> {
    to_value(state.service.lock().list_dates())
}

#[tauri::command]
pub fn turnover_summary_query(
    state: State<'_, TurnoverState>,
    req: DateQueryRequest,
) -> Result<Value, String> {
    let date = required_text(req.date, "date")?;
    let summary = state
        .service
        .lock()
        .summary_for_date(&date)
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "date": summary.date,
        "rows": summary.rows,
        "suggested_file_name": TurnoverService::suggested_file_name(&date),
    }))
}

/// `target_path` comes from the frontend save dialog; absent means cancelled.
#[tauri::command]
pub fn turnover_export_date(
    state: State<'_, TurnoverState>,
    req: ExportDateRequest,
) -> Result<Value, String> {
    let date = required_text(req.date, "date")?;
    let outcome = state
        .service
        .lock()
        .export_date(&date, req.target_path.as_deref())
        .map_err(|e| e.to_string())?;
    to_value(outcome)
}

#[tauri::command]
pub fn turnover_export_all(
    state: State<'_, TurnoverState>,
    req: ExportAllRequest,
) -> Result<Value, String> {
    let outcome = state
        .service
        .lock()
        .export_all(req.target_dir.as_deref())
        .map_err(|e| e.to_string())?;
    to_value(outcome)
}

#[tauri::command]
pub fn turnover_clear_local_data(state: State<'_, TurnoverState>) -> Result<Value, String> {
    state
        .service
        .lock()
        .clear_local_data()
        .map_err(|e| e.to_string())?;
    Ok(json!({ "message": "本地数据已清空" }))
}
