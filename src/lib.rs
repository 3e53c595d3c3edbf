pub mod aggregate;
pub mod amount;
pub mod code_map;
#[cfg(feature = "desktop")]
mod commands;
pub mod error;
pub mod export;
pub mod ingest;
pub mod service;
pub mod sheet_rows;
pub mod trade_store;

pub use aggregate::{aggregate_bucket, IndustrySummary};
pub use amount::{parse_amount, RawAmount};
pub use code_map::IndustryCodeMap;
pub use error::{TurnoverError, TurnoverResult};
pub use service::{BatchExportOutcome, ExportOutcome, TurnoverService};
pub use trade_store::{StorageLayout, TradeRow, TradeStore};

/// Installs the fmt subscriber once; `RUST_LOG` picks the level unless a default is given.
pub fn init_tracing(default_directive: Option<&str>) {
    let filter = match default_directive {
        Some(directive) => tracing_subscriber::EnvFilter::new(directive),
        None => tracing_subscriber::EnvFilter::from_default_env(),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_tracing(None);
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            use tauri::Manager;
            let state = commands::TurnoverState::load(app.handle())?;
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::app_paths,
            commands::turnover_status,
            commands::turnover_import_file,
            commands::industry_codes_import_file,
            commands::industry_codes_refresh,
            commands::turnover_dates_query,
            commands::turnover_summary_query,
            commands::turnover_export_date,
            commands::turnover_export_all,
            commands::turnover_clear_local_data
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
