use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Append-only writer for line-delimited JSON files.
///
/// - one compact JSON object per line, UTF-8, no ASCII escaping
/// - a batch is joined in memory and written with a single `write_all`
/// - parent directories are created on first write
#[derive(Debug, Clone)]
pub struct JsonlWriter {
    inner: Arc<JsonlWriterInner>,
}

#[derive(Debug)]
struct JsonlWriterInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(JsonlWriterInner {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn append<T: Serialize>(&self, record: &T) -> anyhow::Result<()> {
        self.append_batch(std::slice::from_ref(record)).map(|_| ())
    }

    pub fn append_batch<T: Serialize>(&self, records: &[T]) -> anyhow::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("jsonl writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        file.write_all(buffer.as_bytes())?;
        Ok(records.len())
    }
}

/// Overwrites `path` with one line per record.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut buffer = String::new();
    for record in records {
        buffer.push_str(&serde_json::to_string(record)?);
        buffer.push('\n');
    }
    std::fs::write(path, buffer).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MalformedLine {
    pub line_number: usize,
    pub preview: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonlRead<T> {
    pub records: Vec<T>,
    pub malformed: Vec<MalformedLine>,
}

impl<T> Default for JsonlRead<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            malformed: Vec::new(),
        }
    }
}

/// Reads every non-blank line; lines that fail to decode are skipped and
/// reported instead of aborting the read.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<JsonlRead<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut out = JsonlRead::default();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => out.records.push(record),
            Err(err) => {
                let preview = line.chars().take(100).collect::<String>();
                warn!(
                    path = %path.display(),
                    line = idx + 1,
                    "skipping malformed line: {preview}"
                );
                out.malformed.push(MalformedLine {
                    line_number: idx + 1,
                    preview,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Like [`read_jsonl`] but a missing file reads as empty.
pub fn read_jsonl_or_empty<T: DeserializeOwned>(path: &Path) -> anyhow::Result<JsonlRead<T>> {
    if !path.exists() {
        return Ok(JsonlRead::default());
    }
    read_jsonl(path)
}

/// Number of non-blank lines; zero when the file does not exist.
pub fn count_records(path: &Path) -> anyhow::Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw.lines().filter(|line| !line.trim().is_empty()).count())
}
