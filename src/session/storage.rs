// src/session/storage.rs

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::attempt::SubmittedAnswer;

/// Durable string key-value slots that survive a reload, in the manner of browser local storage.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

pub fn timer_key(assessment_id: i64, user_id: &str) -> String {
    format!("timer:{}:{}", assessment_id, user_id)
}

pub fn answers_key(assessment_id: i64, user_id: &str) -> String {
    format!("answers:{}:{}", assessment_id, user_id)
}

/// Persisted deadline of an in-progress attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    /// Absolute deadline, stored as milliseconds since the Unix epoch.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    pub assessment_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_key: Option<Uuid>,
}

/// Persisted committed answers of an in-progress attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswersRecord {
    pub assessment_id: i64,
    pub answers: Vec<SubmittedAnswer>,
}

/// One JSON file per key under a base directory.
///
/// ```text
/// base_dir/
/// ├── timer_12_42.json
/// └── answers_12_42.json
/// ```
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Creates the base directory if it doesn't exist.
    pub fn new(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{}.json", file_name))
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a half-written slot.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Process-local storage; survives controller instances but not the process.
#[derive(Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.slots
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.slots()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.slots()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::OptionLabel;

    #[test]
    fn test_keys_are_scoped_to_user_and_assessment() {
        assert_eq!(timer_key(12, "42"), "timer:12:42");
        assert_eq!(answers_key(12, "42"), "answers:12:42");
    }

    #[test]
    fn test_file_storage_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();

        let storage = FileStorage::new(dir.path()).unwrap();
        storage.set("timer:1:7", "{\"x\":1}").unwrap();
        drop(storage);

        let reopened = FileStorage::new(dir.path()).unwrap();
        assert_eq!(reopened.get("timer:1:7").unwrap().as_deref(), Some("{\"x\":1}"));

        reopened.remove("timer:1:7").unwrap();
        assert_eq!(reopened.get("timer:1:7").unwrap(), None);
        // Removing twice is fine.
        reopened.remove("timer:1:7").unwrap();
    }

    #[test]
    fn test_timer_record_uses_epoch_millis() {
        let record = TimerRecord {
            end_time: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
            assessment_id: 5,
            attempt_key: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["endTime"], 1_700_000_000_123i64);
        assert_eq!(json["assessmentId"], 5);
    }

    #[test]
    fn test_answers_record_wire_shape() {
        let record: AnswersRecord = serde_json::from_str(
            r#"{"assessmentId":3,"answers":[{"questionId":9,"selectedOption":"B"}]}"#,
        )
        .unwrap();
        assert_eq!(record.answers[0].selected_option, OptionLabel::B);
    }
}
