use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{TurnoverError, TurnoverResult};
use crate::sheet_rows::ParsedSheet;
use crate::trade_store::TradeStore;

const CODE_COLUMN_NEEDLES: &[&str] = &["编号", "代码", "code"];
const NAME_COLUMN_NEEDLES: &[&str] = &["行业", "industry"];

/// Industry name (trimmed) -> industry code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndustryCodeMap {
    codes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeTableStats {
    pub row_count: usize,
    pub mapped_count: usize,
    pub skipped_count: usize,
}

impl IndustryCodeMap {
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn insert(&mut self, industry: &str, code: &str) {
        self.codes
            .insert(industry.trim().to_string(), code.trim().to_string());
    }

    /// Exact name first, then the trimmed name. Empty codes count as misses.
    pub fn lookup(&self, industry: &str) -> Option<&str> {
        [industry, industry.trim()]
            .into_iter()
            .filter_map(|key| self.codes.get(key))
            .map(String::as_str)
            .find(|code| !code.is_empty())
    }

    /// An explicit code already on the row beats the map.
    pub fn resolve(&self, explicit: &str, industry: &str) -> String {
        if !explicit.is_empty() {
            return explicit.to_string();
        }
        self.lookup(industry).unwrap_or_default().to_string()
    }

    /// Builds a fresh map from an uploaded code table. A row counts only when both a
    /// code and an industry name are present.
    pub fn from_sheet(sheet: &ParsedSheet) -> TurnoverResult<(Self, CodeTableStats)> {
        let mut map = Self::default();
        let mut stats = CodeTableStats {
            row_count: sheet.rows.len(),
            ..CodeTableStats::default()
        };

        for (idx, row) in sheet.rows.iter().enumerate() {
            let code_cell = row.find_by_substring(CODE_COLUMN_NEEDLES);
            let code_header = code_cell.map(|(header, _)| header);
            // A header like "行业代码" matches both kinds; it stays the code column.
            let name_cell = row
                .cells()
                .iter()
                .find(|(header, _)| {
                    Some(header.as_str()) != code_header
                        && NAME_COLUMN_NEEDLES.iter().any(|n| header.contains(n))
                })
                .map(|(_, value)| value);

            let code = code_cell
                .map(|(_, value)| value.as_text().trim().to_string())
                .unwrap_or_default();
            let industry = name_cell
                .map(|value| value.as_text().trim().to_string())
                .unwrap_or_default();

            if code.is_empty() || industry.is_empty() {
                debug!(row = idx + 1, "code table row lacks code or industry");
                stats.skipped_count += 1;
                continue;
            }
            map.insert(&industry, &code);
            stats.mapped_count += 1;
        }

        if map.is_empty() {
            return Err(TurnoverError::EmptyCodeTable);
        }
        info!(
            sheet = %sheet.sheet_name,
            entries = map.len(),
            skipped = stats.skipped_count,
            "industry code table parsed"
        );
        Ok((map, stats))
    }

    /// Re-resolves every stored row against this map. Rows without a match keep
    /// their code. Returns the number of rows that received a code.
    pub fn refresh_store(&self, store: &mut TradeStore) -> usize {
        let mut updated = 0;
        for (date_key, rows) in store.buckets_mut() {
            let mut updated_in_bucket = 0;
            for row in rows.iter_mut() {
                if let Some(code) = self.lookup(&row.industry) {
                    row.code = code.to_string();
                    updated_in_bucket += 1;
                }
            }
            debug!(date_key = %date_key, updated = updated_in_bucket, "bucket codes refreshed");
            updated += updated_in_bucket;
        }
        updated
    }
}
