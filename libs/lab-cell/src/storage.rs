use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::LabError;

const RESULTS_SUBDIR: &str = "appointment_results";
const MAX_NAME_CHARS: usize = 100;

/// Blob storage for uploaded result files. The appointment row only ever
/// keeps the name returned by `store`.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String, LabError>;

    async fn read(&self, stored_name: &str) -> Result<Option<Vec<u8>>, LabError>;

    async fn remove(&self, stored_name: &str) -> Result<(), LabError>;
}

/// Strips path components and anything outside `[alnum . - _]`; whitespace
/// becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let sanitized: String = base
        .chars()
        .filter(|&c| c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();

    let sanitized = sanitized.replace("..", "");
    if sanitized.trim_matches('_').is_empty() {
        "result".to_string()
    } else {
        sanitized
    }
}

pub struct DiskFileStorage {
    root: PathBuf,
}

impl DiskFileStorage {
    /// Files land in `{upload_dir}/appointment_results`.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self { root: upload_dir.into().join(RESULTS_SUBDIR) }
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf, LabError> {
        if stored_name != sanitize_file_name(stored_name) {
            return Err(LabError::ValidationError("ชื่อไฟล์ไม่ถูกต้อง".to_string()));
        }
        Ok(self.root.join(stored_name))
    }
}

#[async_trait]
impl FileStorage for DiskFileStorage {
    async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String, LabError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LabError::Storage(format!("Failed to create upload directory: {}", e)))?;

        let stored_name = format!(
            "{}_{}",
            Utc::now().timestamp_millis(),
            sanitize_file_name(original_name)
        );
        let path = self.root.join(&stored_name);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| LabError::Storage(format!("Failed to write {}: {}", stored_name, e)))?;

        info!("Stored result file {} ({} bytes)", stored_name, bytes.len());
        Ok(stored_name)
    }

    async fn read(&self, stored_name: &str) -> Result<Option<Vec<u8>>, LabError> {
        let path = self.path_for(stored_name)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Result file {} is missing on disk", stored_name);
                Ok(None)
            }
            Err(e) => Err(LabError::Storage(format!("Failed to read {}: {}", stored_name, e))),
        }
    }

    async fn remove(&self, stored_name: &str) -> Result<(), LabError> {
        let path = self.path_for(stored_name)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove {}: {}", stored_name, e);
                Err(LabError::Storage(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\blood.pdf"), "blood.pdf");
    }

    #[test]
    fn test_sanitize_replaces_whitespace() {
        assert_eq!(sanitize_file_name("cbc result (1).pdf"), "cbc_result__1_.pdf");
    }

    #[test]
    fn test_sanitize_empty_name() {
        assert_eq!(sanitize_file_name(""), "result");
        assert_eq!(sanitize_file_name("   "), "result");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = format!("{}.pdf", "a".repeat(300));
        assert_eq!(sanitize_file_name(&long).chars().count(), MAX_NAME_CHARS);
    }

    #[tokio::test]
    async fn test_store_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskFileStorage::new(dir.path());

        let stored = storage.store("cbc report.pdf", b"%PDF-1.4").await.unwrap();
        assert!(stored.ends_with("_cbc_report.pdf"));
        assert!(dir.path().join("appointment_results").join(&stored).exists());

        assert_eq!(storage.read(&stored).await.unwrap().unwrap(), b"%PDF-1.4");

        storage.remove(&stored).await.unwrap();
        assert!(storage.read(&stored).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskFileStorage::new(dir.path());

        assert!(storage.read("../secret.txt").await.is_err());
    }
}
