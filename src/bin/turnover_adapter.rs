use industry_turnover_lib::{init_tracing, StorageLayout, TurnoverError, TurnoverService};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    case: Option<AdapterCaseMeta>,
    endpoint: AdapterEndpoint,
    #[serde(default)]
    query: Value,
    dataset: AdapterDataset,
}

#[derive(Debug, Deserialize)]
struct AdapterCaseMeta {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterEndpoint {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterDataset {
    data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdapterQuery {
    source_path: Option<String>,
    date: Option<String>,
    target_path: Option<String>,
    target_dir: Option<String>,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

#[derive(Debug)]
enum AdapterFailure {
    Protocol(String),
    UnsupportedEndpoint(String),
    Domain(TurnoverError),
}

impl From<TurnoverError> for AdapterFailure {
    fn from(err: TurnoverError) -> Self {
        Self::Domain(err)
    }
}

impl AdapterFailure {
    fn into_response(self) -> AdapterResponse {
        let (category, message, error_type) = match self {
            Self::Protocol(message) => ("ADAPTER_PROTOCOL_ERROR".to_string(), message, "AdapterError"),
            Self::UnsupportedEndpoint(path) => (
                "UNSUPPORTED_ENDPOINT".to_string(),
                format!("unsupported endpoint path: {path}"),
                "AdapterError",
            ),
            Self::Domain(err) => (err.category().to_string(), err.to_string(), "TurnoverError"),
        };
        AdapterResponse::Error {
            error: AdapterErrorBody {
                category,
                message,
                error_type: error_type.to_string(),
            },
        }
    }
}

fn parse_bool_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn read_stdin_json() -> Result<Value, AdapterFailure> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| AdapterFailure::Protocol(format!("读取 stdin 失败: {e}")))?;
    if raw.trim().is_empty() {
        return Err(AdapterFailure::Protocol("empty stdin request".to_string()));
    }
    serde_json::from_str::<Value>(&raw)
        .map_err(|e| AdapterFailure::Protocol(format!("invalid JSON request: {e}")))
}

fn required(raw: Option<&str>, field: &str) -> Result<String, AdapterFailure> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AdapterFailure::Protocol(format!("request.query.{field} missing")))
}

fn to_payload<T: Serialize>(value: T) -> Result<Value, AdapterFailure> {
    serde_json::to_value(value)
        .map_err(|e| AdapterFailure::Protocol(format!("serialize payload failed: {e}")))
}

fn dispatch(req: AdapterRequest) -> Result<Value, AdapterFailure> {
    if req.schema_version != 1 {
        return Err(AdapterFailure::Protocol(format!(
            "unsupported schema_version: {}",
            req.schema_version
        )));
    }

    let path = req
        .endpoint
        .path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdapterFailure::Protocol("request.endpoint.path missing".to_string()))?;
    let data_dir = req
        .dataset
        .data_dir
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdapterFailure::Protocol("request.dataset.data_dir missing".to_string()))?;
    let query: AdapterQuery = if req.query.is_null() {
        AdapterQuery::default()
    } else {
        serde_json::from_value(req.query)
            .map_err(|e| AdapterFailure::Protocol(format!("request.query invalid: {e}")))?
    };

    let mut service = TurnoverService::open(StorageLayout::new(data_dir));
    match path {
        "/api/status" => to_payload(service.status()),
        "/api/trades/import" => {
            let source = required(query.source_path.as_deref(), "source_path")?;
            to_payload(service.import_trade_file(Path::new(&source))?)
        }
        "/api/codes/import" => {
            let source = required(query.source_path.as_deref(), "source_path")?;
            to_payload(service.import_code_table(Path::new(&source))?)
        }
        "/api/codes/refresh" => to_payload(service.refresh_codes()?),
        "/api/dates" => to_payload(service.list_dates()),
        "/api/summary" => {
            let date = required(query.date.as_deref(), "date")?;
            to_payload(service.summary_for_date(&date)?)
        }
        "/api/export/date" => {
            let date = required(query.date.as_deref(), "date")?;
            to_payload(service.export_date(&date, query.target_path.as_deref())?)
        }
        "/api/export/all" => to_payload(service.export_all(query.target_dir.as_deref())?),
        "/api/clear" => {
            service.clear_local_data()?;
            Ok(json!({ "message": "本地数据已清空" }))
        }
        other => Err(AdapterFailure::UnsupportedEndpoint(other.to_string())),
    }
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = parse_bool_flag(&args, "--pretty");
    let verbose = parse_bool_flag(&args, "--verbose");
    init_tracing(verbose.then_some("debug"));

    let resp = match read_stdin_json()
        .and_then(|v| {
            serde_json::from_value::<AdapterRequest>(v)
                .map_err(|e| AdapterFailure::Protocol(format!("request root invalid: {e}")))
        })
        .and_then(|req| {
            if let Some(case_id) = req.case.as_ref().and_then(|c| c.id.as_deref()) {
                debug!(case = %case_id, "adapter case");
            }
            if let Some(path) = req.endpoint.path.as_deref() {
                debug!(endpoint = %path, "adapter endpoint");
            }
            dispatch(req)
        }) {
        Ok(payload) => AdapterResponse::Success { payload },
        Err(failure) => failure.into_response(),
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "ADAPTER_PROTOCOL_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    print!("{out}");
}
