//! Persistence for graded results.
//!
//! A [`GradedResult`] ties one uploaded file's grade and feedback to a
//! student. [`ResultStore`] is the storage seam: [`MemoryStore`] for tests
//! and short-lived runs, [`JsonlStore`] for an append-only JSON-lines file
//! that survives restarts.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Who a result belongs to. All three fields must match on lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentIdentity {
    pub name: String,
    #[serde(rename = "registerNo")]
    pub register_no: String,
    #[serde(rename = "class")]
    pub student_class: String,
}

impl StudentIdentity {
    pub fn new(
        name: impl Into<String>,
        register_no: impl Into<String>,
        student_class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            register_no: register_no.into(),
            student_class: student_class.into(),
        }
    }
}

/// One graded submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedResult {
    pub filename: String,
    /// `"N/10"` or `"N/A"`.
    pub grade: String,
    pub feedback: String,
    #[serde(flatten)]
    pub student: StudentIdentity,
    /// Seconds since the Unix epoch.
    pub stored_at: u64,
}

impl GradedResult {
    /// Build a record stamped with the current time.
    pub fn new(
        filename: impl Into<String>,
        grade: impl Into<String>,
        feedback: impl Into<String>,
        student: StudentIdentity,
    ) -> Self {
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            filename: filename.into(),
            grade: grade.into(),
            feedback: feedback.into(),
            student,
            stored_at,
        }
    }

    /// Every text field must be non-blank.
    pub fn validate(&self) -> Result<(), StoreError> {
        let fields: [(&'static str, &str); 6] = [
            ("filename", &self.filename),
            ("grade", &self.grade),
            ("feedback", &self.feedback),
            ("name", &self.student.name),
            ("registerNo", &self.student.register_no),
            ("class", &self.student.student_class),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(StoreError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Position of a record within its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

/// Storage for graded results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Validate and persist `record`.
    async fn store(&self, record: &GradedResult) -> Result<RecordId, StoreError>;

    /// The most recently stored result for `student`, if any.
    async fn find(&self, student: &StudentIdentity) -> Result<Option<GradedResult>, StoreError>;
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<GradedResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn store(&self, record: &GradedResult) -> Result<RecordId, StoreError> {
        record.validate()?;
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.push(record.clone());
        Ok(RecordId(records.len() as u64 - 1))
    }

    async fn find(&self, student: &StudentIdentity) -> Result<Option<GradedResult>, StoreError> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(records.iter().rev().find(|r| &r.student == student).cloned())
    }
}

// ── JSON lines ───────────────────────────────────────────────────────────

/// Append-only JSON-lines file, one [`GradedResult`] per line.
///
/// Record ids are zero-based line numbers. Lines that fail to parse are
/// skipped with a warning on lookup. Writers within one process are
/// serialised; concurrent processes writing the same file are not supported.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlStore {
    /// Use `path`, creating it (and its parent directories) on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_content(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => Ok(c),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Parse every readable record. Malformed lines are logged and skipped.
    async fn read_all(&self) -> Result<Vec<GradedResult>, StoreError> {
        let content = self.read_content().await?;
        let records = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(i, line)| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        "Skipping malformed record at {}:{}: {}",
                        self.path.display(),
                        i + 1,
                        e
                    );
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl ResultStore for JsonlStore {
    async fn store(&self, record: &GradedResult) -> Result<RecordId, StoreError> {
        record.validate()?;
        let mut line =
            serde_json::to_string(record).map_err(|e| StoreError::Serialize(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let content = self.read_content().await?;
        let existing = content.lines().filter(|l| !l.trim().is_empty()).count() as u64;
        if !content.is_empty() && !content.ends_with('\n') {
            line.insert(0, '\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;

        info!(
            "Stored result for {} ({}) in {}",
            record.student.name,
            record.student.register_no,
            self.path.display()
        );
        Ok(RecordId(existing))
    }

    async fn find(&self, student: &StudentIdentity) -> Result<Option<GradedResult>, StoreError> {
        let records = self.read_all().await?;
        debug!("Scanned {} stored results", records.len());
        Ok(records.into_iter().rev().find(|r| &r.student == student))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asha() -> StudentIdentity {
        StudentIdentity::new("Asha", "21CS042", "XII-B")
    }

    fn result(filename: &str, grade: &str) -> GradedResult {
        GradedResult::new(filename, grade, "Clear answers.", asha())
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut r = result("ans.pdf", "8/10");
        assert!(r.validate().is_ok());
        r.student.register_no = "  ".into();
        assert!(matches!(r.validate(), Err(StoreError::MissingField("registerNo"))));
    }

    #[test]
    fn test_serialised_field_names() {
        let json = serde_json::to_value(result("ans.pdf", "8/10")).unwrap();
        assert_eq!(json["registerNo"], "21CS042");
        assert_eq!(json["class"], "XII-B");
        assert_eq!(json["name"], "Asha");
    }

    #[tokio::test]
    async fn test_memory_store_latest_wins() {
        let store = MemoryStore::new();
        store.store(&result("first.pdf", "5/10")).await.unwrap();
        let id = store.store(&result("second.pdf", "9/10")).await.unwrap();
        assert_eq!(id, RecordId(1));

        let found = store.find(&asha()).await.unwrap().unwrap();
        assert_eq!(found.filename, "second.pdf");

        let other = StudentIdentity::new("Asha", "21CS042", "XII-A");
        assert!(store.find(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_rejects_invalid() {
        let store = MemoryStore::new();
        let err = store.store(&result("", "8/10")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingField("filename")));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("results").join("graded.jsonl"));

        assert!(store.find(&asha()).await.unwrap().is_none());
        assert_eq!(store.store(&result("a.pdf", "6/10")).await.unwrap(), RecordId(0));
        assert_eq!(store.store(&result("b.pdf", "N/A")).await.unwrap(), RecordId(1));

        let reopened = JsonlStore::new(store.path());
        let found = reopened.find(&asha()).await.unwrap().unwrap();
        assert_eq!(found.filename, "b.pdf");
        assert_eq!(found.grade, "N/A");
    }

    #[tokio::test]
    async fn test_jsonl_store_skips_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graded.jsonl");
        std::fs::write(&path, "{\"filename\":\"x\"}\n").unwrap();
        assert!(JsonlStore::new(&path).find(&asha()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jsonl_store_recovers_from_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graded.jsonl");
        let store = JsonlStore::new(&path);
        store.store(&result("a.pdf", "6/10")).await.unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut file, b"{\"filename\":\"b.pd").unwrap();
        drop(file);

        let id = store.store(&result("c.pdf", "9/10")).await.unwrap();
        assert_eq!(id, RecordId(2));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.ends_with('\n'));

        let found = store.find(&asha()).await.unwrap().unwrap();
        assert_eq!(found.filename, "c.pdf");
    }
}
