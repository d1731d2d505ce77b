//! Persistent chat sessions and uploads
//!
//! Chat history and uploaded files are written to disk so a session can be
//! listed and reloaded later. Nothing on the request path waits for a write:
//! callers go through [`best_effort`], which runs the write in the background
//! and only logs and counts failures.

use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::metrics::STORAGE_FAILURES;
use crate::mode::Mode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed session file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// One persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// `user` or `assistant`
    pub role: String,
    /// Which configuration's thread the message belongs to
    pub mode: Mode,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn user(mode: Mode, content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            mode,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(mode: Mode, content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            mode,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A saved chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<StoredMessage>,
}

/// Summary of a session for listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Persistence collaborator used by the HTTP layer
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create the session if needed, otherwise bump its update time
    async fn upsert_session(&self, session_id: &str, title: &str) -> Result<(), StoreError>;

    async fn append_message(&self, session_id: &str, message: StoredMessage) -> Result<(), StoreError>;

    /// Keep a copy of an uploaded file, returning where it landed
    async fn store_upload(&self, session_id: &str, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError>;

    async fn load(&self, session_id: &str) -> Result<SessionRecord, StoreError>;

    /// All sessions, most recently updated first
    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError>;
}

/// JSON files under `{base}/sessions`, upload blobs under `{base}/uploads/{id}`
pub struct FileStore {
    base_dir: PathBuf,
    /// Serializes read-modify-write cycles on session files
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(base_dir.join("sessions")).await?;
        tokio::fs::create_dir_all(base_dir.join("uploads")).await?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(session_id) {
            return Err(StoreError::InvalidId(session_id.to_string()));
        }
        Ok(self
            .base_dir
            .join("sessions")
            .join(format!("{}.json", session_id)))
    }

    async fn read_record(&self, path: &Path, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session_id, "No session file yet");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, path: &Path, record: &SessionRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatStore for FileStore {
    async fn upsert_session(&self, session_id: &str, title: &str) -> Result<(), StoreError> {
        let path = self.session_path(session_id)?;
        let _guard = self.write_lock.lock().await;

        let now = Utc::now();
        let record = match self.read_record(&path, session_id).await? {
            Some(mut record) => {
                record.updated_at = now;
                record
            }
            None => SessionRecord {
                id: session_id.to_string(),
                title: truncate(title, 60),
                created_at: now,
                updated_at: now,
                messages: Vec::new(),
            },
        };
        self.write_record(&path, &record).await
    }

    async fn append_message(&self, session_id: &str, message: StoredMessage) -> Result<(), StoreError> {
        let path = self.session_path(session_id)?;
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .read_record(&path, session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        record.updated_at = message.created_at;
        record.messages.push(message);
        self.write_record(&path, &record).await
    }

    async fn store_upload(&self, session_id: &str, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        if !is_valid_id(session_id) {
            return Err(StoreError::InvalidId(session_id.to_string()));
        }
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "..")
            .ok_or_else(|| StoreError::InvalidId(name.to_string()))?;

        let dir = self.base_dir.join("uploads").join(session_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn load(&self, session_id: &str) -> Result<SessionRecord, StoreError> {
        let path = self.session_path(session_id)?;
        self.read_record(&path, session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(self.base_dir.join("sessions")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let json = tokio::fs::read_to_string(&path).await?;
                match serde_json::from_str::<SessionRecord>(&json) {
                    Ok(record) => sessions.push(SessionSummary {
                        message_count: record.messages.len(),
                        id: record.id,
                        title: record.title,
                        updated_at: record.updated_at,
                    }),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
                }
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}

/// Run a persistence call in the background
///
/// Failures are logged and counted under `operation`, never retried.
pub fn best_effort<F>(operation: &'static str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = Result<(), StoreError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            warn!(operation, error = %e, "Persistence call failed");
            STORAGE_FAILURES.with_label_values(&[operation]).inc();
        }
    })
}

/// Session ids become file names, so only `[A-Za-z0-9_-]` is accepted
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Truncate a string to max chars, adding ellipsis if needed
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
