use std::path::Path;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::{info, warn};
use xenocorpus_contracts::corpus_id;
use xenocorpus_contracts::jsonl::{read_jsonl, write_jsonl};

pub const CORPUS_FILE: &str = "corpus_xenofobia_sintetico.jsonl";
pub const FIXED_CORPUS_FILE: &str = "corpus_xenofobia_sintetico_corrigido.jsonl";
pub const CSV_FILE: &str = "corpus_xenofobia_sintetico.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenumberReport {
    pub total: usize,
    pub skipped: usize,
}

/// Rewrites `id` to `corpus_00001..corpus_N` in file order.
///
/// Other fields keep their values and key order. Lines that are not JSON
/// objects are dropped with a warning.
pub fn renumber_ids(input: &Path, output: &Path) -> anyhow::Result<RenumberReport> {
    let read = read_jsonl::<Map<String, Value>>(input)?;
    let skipped = read.malformed.len();
    if skipped > 0 {
        warn!(skipped, input = %input.display(), "malformed lines dropped while renumbering");
    }

    let mut records = read.records;
    for (idx, record) in records.iter_mut().enumerate() {
        record.insert("id".to_string(), Value::String(corpus_id(idx as u64 + 1)));
    }
    write_jsonl(output, &records)?;

    info!(total = records.len(), output = %output.display(), "ids renumbered");
    Ok(RenumberReport {
        total: records.len(),
        skipped,
    })
}

/// Writes an `id,texto` CSV with one row per corpus record.
pub fn export_csv(input: &Path, output: &Path) -> anyhow::Result<usize> {
    let read = read_jsonl::<Map<String, Value>>(input)?;
    if !read.malformed.is_empty() {
        warn!(skipped = read.malformed.len(), input = %input.display(), "malformed lines skipped in export");
    }

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    writer.write_record(["id", "texto"])?;
    for record in &read.records {
        writer.write_record([text_field(record, "id"), text_field(record, "texto")])?;
    }
    writer.flush()?;

    info!(rows = read.records.len(), output = %output.display(), "csv exported");
    Ok(read.records.len())
}

fn text_field(record: &Map<String, Value>, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(value)) => value.clone(),
        Some(other) => other.to_string(),
    }
}
