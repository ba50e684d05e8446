//! Append-only audit store for blocked tool results.
//!
//! One JSON file per blocked invocation. Files are never updated, so concurrent
//! hook processes only need distinct names, not locks.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use border_core::{current_unix_timestamp_ms, write_bytes_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AdmissionReason, AdmissionVerdict, ToolUseEvent};

pub const DEFAULT_QUARANTINE_DIR: &str = ".quarantine";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub id: String,
    pub url: String,
    pub reason: AdmissionReason,
    pub message: String,
    /// The blocked body exactly as received.
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_use_id: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn for_event(event: &ToolUseEvent, verdict: &AdmissionVerdict) -> Self {
        Self {
            id: new_quarantine_id(),
            url: event.url.clone(),
            reason: verdict.reason,
            message: verdict.message.clone(),
            content: event.content.clone(),
            tool_name: Some(event.tool_name.clone()),
            tool_use_id: Some(event.tool_use_id.clone()),
            session_id: Some(event.session_id.clone()),
            created_at: Utc::now(),
        }
    }

    /// Record for a payload that never became an event; `content` is the raw stdin.
    pub fn for_raw_payload(raw: &[u8], verdict: &AdmissionVerdict) -> Self {
        Self {
            id: new_quarantine_id(),
            url: String::new(),
            reason: verdict.reason,
            message: verdict.message.clone(),
            content: String::from_utf8_lossy(raw).into_owned(),
            tool_name: None,
            tool_use_id: None,
            session_id: None,
            created_at: Utc::now(),
        }
    }
}

/// `<unix-ms>-<pid>-<uuid>`: sortable by time, unique across concurrent processes.
pub fn new_quarantine_id() -> String {
    format!(
        "{}-{}-{}",
        current_unix_timestamp_ms(),
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    )
}

#[derive(Debug, Clone)]
pub struct QuarantineWriter {
    dir: PathBuf,
}

impl QuarantineWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, record: &QuarantineRecord) -> PathBuf {
        self.dir.join(format!("{}.json", record.id))
    }

    /// Persists `record`, creating the directory on first use.
    pub fn write(&self, record: &QuarantineRecord) -> Result<PathBuf> {
        let path = self.record_path(record);
        let mut payload =
            serde_json::to_vec_pretty(record).context("failed to encode quarantine record")?;
        payload.push(b'\n');
        write_bytes_atomic(&path, &payload)
            .with_context(|| format!("failed to write quarantine record {}", path.display()))?;
        Ok(path)
    }
}
