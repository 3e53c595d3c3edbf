use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::amount::RawAmount;
use crate::code_map::IndustryCodeMap;
use crate::error::TurnoverResult;

pub const DATA_DIR_NAME: &str = "industry_turnover";
pub const STORE_FILE_NAME: &str = "data.json";
pub const CODE_MAP_FILE_NAME: &str = "industry_codes.json";
pub const UNKNOWN_INDUSTRY: &str = "未知";
pub const UNKNOWN_DATE: &str = "未知日期";

/// One normalized stock row of a trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRow {
    pub industry: String,
    #[serde(default)]
    pub raw_amount: RawAmount,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub code: String,
}

/// Date key -> rows of that day. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeStore {
    buckets: BTreeMap<String, Vec<TradeRow>>,
}

impl TradeStore {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn date_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, date_key: &str) -> Option<&[TradeRow]> {
        self.buckets.get(date_key).map(Vec::as_slice)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&str, &[TradeRow])> {
        self.buckets
            .iter()
            .map(|(date, rows)| (date.as_str(), rows.as_slice()))
    }

    pub(crate) fn buckets_mut(&mut self) -> impl Iterator<Item = (&String, &mut Vec<TradeRow>)> {
        self.buckets.iter_mut()
    }

    /// Installs `rows` as the whole bucket of `date_key`. Returns whether an earlier
    /// bucket was replaced.
    pub fn replace_bucket(&mut self, date_key: &str, rows: Vec<TradeRow>) -> bool {
        self.buckets.insert(date_key.to_string(), rows).is_some()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// Where the two JSON blobs live.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub data_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Layout under an application-private directory resolved by the host.
    pub fn under_app_dir(app_dir: &Path) -> Self {
        Self::new(app_dir.join(DATA_DIR_NAME))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }

    pub fn code_map_path(&self) -> PathBuf {
        self.data_dir.join(CODE_MAP_FILE_NAME)
    }

    pub fn load_store(&self) -> TradeStore {
        read_json_or_default(&self.store_path())
    }

    pub fn load_code_map(&self) -> IndustryCodeMap {
        read_json_or_default(&self.code_map_path())
    }

    pub fn save_store(&self, store: &TradeStore) -> TurnoverResult<()> {
        write_json_atomic(&self.store_path(), store)
    }

    pub fn save_code_map(&self, code_map: &IndustryCodeMap) -> TurnoverResult<()> {
        write_json_atomic(&self.code_map_path(), code_map)
    }

    /// Removes both blobs. Missing files are fine.
    pub fn remove_all(&self) -> TurnoverResult<()> {
        for path in [self.store_path(), self.code_map_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "removed local data file");
            }
        }
        Ok(())
    }
}

/// Absent or unreadable blobs load as the default value; corruption is logged and
/// never surfaced.
fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read local data, starting empty");
            return T::default();
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed local data, starting empty");
            T::default()
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> TurnoverResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), "local data persisted");
    Ok(())
}
