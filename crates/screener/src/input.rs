use anyhow::{bail, Context, Result};
use screening_core::{Exclusion, RawFinancials, ScreenError};
use serde_json::Value;
use std::path::Path;

/// Records parsed from an acquisition dump, plus the entries that could not
/// be read as a record at all.
pub struct LoadedInput {
    pub records: Vec<RawFinancials>,
    pub malformed: Vec<Exclusion>,
}

pub fn load_records(path: &Path) -> Result<LoadedInput> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_records(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Accepts either a JSON array of records or an object with a `records`
/// array. A bad entry is reported on its own and never fails the file.
pub fn parse_records(text: &str) -> Result<LoadedInput> {
    let entries = match serde_json::from_str::<Value>(text)? {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("records") {
            Some(Value::Array(entries)) => entries,
            _ => bail!("expected an array of records or an object with a \"records\" array"),
        },
        _ => bail!("expected an array of records or an object with a \"records\" array"),
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut malformed = Vec::new();

    for (idx, entry) in entries.into_iter().enumerate() {
        match RawFinancials::from_value(entry) {
            Ok(raw) if raw.ticker.trim().is_empty() => malformed.push(Exclusion {
                ticker: format!("#{}", idx),
                error: ScreenError::Malformed("empty ticker".to_string()),
            }),
            Ok(raw) => records.push(raw),
            Err(error) => malformed.push(Exclusion {
                ticker: format!("#{}", idx),
                error,
            }),
        }
    }

    Ok(LoadedInput { records, malformed })
}
