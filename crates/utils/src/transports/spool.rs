//! Filesystem-backed record publisher.
//!
//! Provides [`SpoolPublisher`], a [`RecordPublisher`](crate::RecordPublisher)
//! that drops every forwarded record as an `.avro` file into a spool
//! directory. Useful for local runs without a broker.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::transport::{PublishFuture, RecordPublisher, TransportError};

/// Record publisher that writes each record to its own file.
///
/// Files are named `<timestamp>-<sequence>-<ordering key>-<message id>.avro`
/// so that a lexical listing returns them in publish order. Each file is written to a
/// temporary name first and renamed into place, a reader never observes a
/// partially written record.
pub struct SpoolPublisher {
    path: PathBuf,
    name: String,
    sequence: AtomicU64,
}

impl SpoolPublisher {
    /// Creates a new [`SpoolPublisher`] writing into `path`.
    pub fn new(path: PathBuf) -> Self {
        info!(path = %path.display(), "Spool publisher initialized");
        let name = path.display().to_string();
        Self {
            path,
            name,
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the spool directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordPublisher for SpoolPublisher {
    fn publish<'a>(&'a self, payload: &'a [u8], ordering_key: &'a str) -> PublishFuture<'a> {
        Box::pin(async move {
            fs::create_dir_all(&self.path).await?;

            let message_id = Uuid::new_v4().to_string();
            let safe_key = ordering_key.replace(|c: char| !c.is_ascii_alphanumeric(), "_");
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            let file_name = format!(
                "{}-{sequence:012}-{safe_key}-{message_id}.avro",
                Utc::now().format("%Y%m%dT%H%M%S%.9fZ")
            );
            let temp_path = self.path.join(format!(".{message_id}.tmp"));
            let final_path = self.path.join(&file_name);

            debug!(
                message_id = %message_id,
                path = %final_path.display(),
                size = payload.len(),
                "Writing record to spool"
            );

            fs::write(&temp_path, payload).await.map_err(|e| {
                error!(
                    path = %temp_path.display(),
                    error = %e,
                    "Failed to write record to spool"
                );
                TransportError::Io(e)
            })?;
            if let Err(e) = fs::rename(&temp_path, &final_path).await {
                error!(
                    path = %final_path.display(),
                    error = %e,
                    "Failed to move record into spool"
                );
                fs::remove_file(&temp_path).await.ok();
                return Err(TransportError::Io(e));
            }

            info!(
                message_id = %message_id,
                path = %final_path.display(),
                size = payload.len(),
                "Spooled record"
            );
            Ok(message_id)
        })
    }

    fn destination(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn spooled_files(path: &Path) -> Vec<PathBuf> {
        let mut entries = fs::read_dir(path).await.unwrap();
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            files.push(entry.path());
        }
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_spool_publish_writes_one_file() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = SpoolPublisher::new(temp_dir.path().join("out"));

        let message_id = publisher.publish(b"\x02a", "email").await.unwrap();

        let files = spooled_files(publisher.path()).await;
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(&format!("-email-{message_id}.avro")));
        assert_eq!(fs::read(&files[0]).await.unwrap(), b"\x02a");
    }

    #[tokio::test]
    async fn test_spool_publish_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = SpoolPublisher::new(temp_dir.path().to_path_buf());

        for payload in [b"first".as_slice(), b"second".as_slice(), b"third".as_slice()] {
            publisher.publish(payload, "email").await.unwrap();
        }

        let files = spooled_files(publisher.path()).await;
        let mut contents = Vec::new();
        for file in files {
            contents.push(fs::read(file).await.unwrap());
        }
        assert_eq!(contents, [b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[tokio::test]
    async fn test_spool_sanitizes_ordering_key() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = SpoolPublisher::new(temp_dir.path().to_path_buf());

        publisher.publish(b"x", "../escape").await.unwrap();

        let files = spooled_files(publisher.path()).await;
        assert_eq!(files.len(), 1);
        assert!(files[0].to_string_lossy().contains("-___escape-"));
    }

    #[test]
    fn test_spool_destination() {
        let publisher = SpoolPublisher::new(PathBuf::from("spool"));
        assert_eq!(publisher.destination(), "spool");
    }
}
