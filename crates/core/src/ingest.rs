use crate::models::{BlobTags, IndexerState, IndexerStatus, UploadedReport};
use crate::traits::{IndexerControl, ReportStore};
use crate::IngestError;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Splits a report path into its blob name and origin id (`report1.pdf`,
/// `report1`).
pub fn report_identity(path: &Path) -> Result<(String, String), IngestError> {
    let blob_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let origin_id = Path::new(&blob_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(&blob_name)
        .to_string();

    Ok((blob_name, origin_id))
}

fn content_type_for(blob_name: &str) -> &'static str {
    let extension = Path::new(blob_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Uploads the report at `local_path`, overwriting a blob of the same name,
/// and tags it with its origin id.
pub async fn upload_report<S>(store: &S, local_path: &Path) -> Result<UploadedReport, IngestError>
where
    S: ReportStore + ?Sized,
{
    let (blob_name, origin_id) = report_identity(local_path)?;
    let bytes = tokio::fs::read(local_path).await?;
    let size_bytes = bytes.len() as u64;
    let checksum = digest_bytes(&bytes);

    store
        .put_blob(&blob_name, bytes, content_type_for(&blob_name))
        .await?;

    // Best-effort metadata: an untagged blob is still indexed.
    let _ = store
        .set_tags(&blob_name, &BlobTags::for_report(origin_id.as_str()))
        .await;

    info!(blob = %blob_name, origin_id = %origin_id, size_bytes, "report uploaded");

    Ok(UploadedReport {
        blob_name,
        origin_id,
        size_bytes,
        checksum,
    })
}

/// Runs `indexer` and polls its status every `poll_interval` until the run
/// leaves the running state.
pub async fn trigger_index_and_wait<I>(
    control: &I,
    indexer: &str,
    poll_interval: Duration,
) -> Result<IndexerStatus, IngestError>
where
    I: IndexerControl + ?Sized,
{
    trigger_index_and_wait_with(control, indexer, poll_interval, tokio::time::sleep).await
}

/// Same as [`trigger_index_and_wait`] with a caller supplied sleep.
pub async fn trigger_index_and_wait_with<I, S, F>(
    control: &I,
    indexer: &str,
    poll_interval: Duration,
    mut sleep: S,
) -> Result<IndexerStatus, IngestError>
where
    I: IndexerControl + ?Sized,
    S: FnMut(Duration) -> F,
    F: Future<Output = ()>,
{
    control.run_indexer(indexer).await?;
    info!(indexer, "indexer run started");

    loop {
        let status = control.indexer_status(indexer).await?;
        match status.state() {
            IndexerState::Running => {
                info!(indexer, status = %status.status, "indexer still running");
                sleep(poll_interval).await;
            }
            IndexerState::Failed(failures) => {
                return Err(IngestError::IndexerFailed {
                    indexer: indexer.to_string(),
                    failures,
                });
            }
            IndexerState::Succeeded => {
                info!(indexer, "indexer run finished");
                return Ok(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexerItemError, IndexerRun};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeStore {
        puts: Mutex<Vec<(String, Vec<u8>, String)>>,
        tags: Mutex<Vec<(String, BlobTags)>>,
        fail_tags: bool,
    }

    #[async_trait]
    impl ReportStore for FakeStore {
        async fn put_blob(
            &self,
            blob_name: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<(), IngestError> {
            self.puts.lock().unwrap().push((
                blob_name.to_string(),
                bytes,
                content_type.to_string(),
            ));
            Ok(())
        }

        async fn set_tags(&self, blob_name: &str, tags: &BlobTags) -> Result<(), IngestError> {
            if self.fail_tags {
                return Err(IngestError::BackendResponse {
                    backend: "blob".to_string(),
                    details: "403 Forbidden".to_string(),
                });
            }
            self.tags
                .lock()
                .unwrap()
                .push((blob_name.to_string(), tags.clone()));
            Ok(())
        }
    }

    struct ScriptedIndexer {
        statuses: Mutex<VecDeque<IndexerStatus>>,
        runs: AtomicUsize,
    }

    impl ScriptedIndexer {
        fn new(last_results: &[&str]) -> Self {
            let statuses = last_results
                .iter()
                .map(|state| IndexerStatus {
                    status: "running".to_string(),
                    last_result: Some(IndexerRun {
                        status: state.to_string(),
                        errors: if *state == "error" {
                            vec![IndexerItemError {
                                key: None,
                                error_message: "document could not be parsed".to_string(),
                            }]
                        } else {
                            Vec::new()
                        },
                    }),
                })
                .collect();
            Self {
                statuses: Mutex::new(statuses),
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IndexerControl for ScriptedIndexer {
        async fn run_indexer(&self, _indexer: &str) -> Result<(), IngestError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn indexer_status(&self, _indexer: &str) -> Result<IndexerStatus, IngestError> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| IngestError::BackendResponse {
                    backend: "search".to_string(),
                    details: "status polled past the script".to_string(),
                })
        }
    }

    #[test]
    fn identity_strips_extension() {
        let (blob, origin) = report_identity(Path::new("/data/report1.pdf")).unwrap();
        assert_eq!(blob, "report1.pdf");
        assert_eq!(origin, "report1");

        let (blob, origin) = report_identity(Path::new("annual.2024.pdf")).unwrap();
        assert_eq!(blob, "annual.2024.pdf");
        assert_eq!(origin, "annual.2024");
    }

    #[tokio::test]
    async fn upload_names_blob_after_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("report1.pdf");
        std::fs::write(&path, b"%PDF-1.4 report")?;

        let store = FakeStore::default();
        let uploaded = upload_report(&store, &path).await?;

        assert_eq!(uploaded.blob_name, "report1.pdf");
        assert_eq!(uploaded.origin_id, "report1");
        assert_eq!(uploaded.size_bytes, 15);
        assert_eq!(uploaded.checksum, digest_bytes(b"%PDF-1.4 report"));

        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "report1.pdf");
        assert_eq!(puts[0].2, "application/pdf");

        let tags = store.tags.lock().unwrap();
        assert_eq!(tags[0].1, BlobTags::for_report("report1"));
        Ok(())
    }

    #[tokio::test]
    async fn tag_failure_does_not_fail_upload() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("report2.pdf");
        std::fs::write(&path, b"bytes")?;

        let store = FakeStore {
            fail_tags: true,
            ..FakeStore::default()
        };
        let uploaded = upload_report(&store, &path).await?;

        assert_eq!(uploaded.origin_id, "report2");
        assert!(store.tags.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_report_file_is_an_io_error() {
        let store = FakeStore::default();
        let error = upload_report(&store, Path::new("/nonexistent/report.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(error, IngestError::Io(_)));
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_running_polls_sleep_twice() {
        let indexer = ScriptedIndexer::new(&["inProgress", "inProgress", "success"]);
        let sleeps = AtomicUsize::new(0);

        let status = trigger_index_and_wait_with(
            &indexer,
            "reports-indexer",
            DEFAULT_POLL_INTERVAL,
            |interval| {
                assert_eq!(interval, DEFAULT_POLL_INTERVAL);
                sleeps.fetch_add(1, Ordering::SeqCst);
                std::future::ready(())
            },
        )
        .await
        .expect("indexer should finish");

        assert_eq!(sleeps.load(Ordering::SeqCst), 2);
        assert_eq!(indexer.runs.load(Ordering::SeqCst), 1);
        assert_eq!(status.state(), IndexerState::Succeeded);
    }

    #[tokio::test]
    async fn error_status_raises_with_failures() {
        let indexer = ScriptedIndexer::new(&["inProgress", "error"]);
        let sleeps = AtomicUsize::new(0);

        let error = trigger_index_and_wait_with(
            &indexer,
            "reports-indexer",
            DEFAULT_POLL_INTERVAL,
            |_| {
                sleeps.fetch_add(1, Ordering::SeqCst);
                std::future::ready(())
            },
        )
        .await
        .unwrap_err();

        assert_eq!(sleeps.load(Ordering::SeqCst), 1);
        match error {
            IngestError::IndexerFailed { indexer, failures } => {
                assert_eq!(indexer, "reports-indexer");
                assert_eq!(failures, vec!["document could not be parsed".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn default_sleep_uses_tokio_timer() {
        let indexer = ScriptedIndexer::new(&["inProgress", "success"]);
        let status = trigger_index_and_wait(&indexer, "reports-indexer", Duration::from_secs(5))
            .await
            .expect("indexer should finish");
        assert_eq!(status.state(), IndexerState::Succeeded);
    }
}
