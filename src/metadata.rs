//! Metadata prefetcher
//!
//! Fetches descriptive information about a media item without downloading it.
//! Independent of streaming sessions; no worker or channel is involved.

use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::types::{DownloadRequest, Metadata};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Runs metadata lookups against an [`Extractor`]
#[derive(Clone)]
pub struct MetadataPrefetcher {
    extractor: Arc<dyn Extractor>,
    timeout: Duration,
}

impl std::fmt::Debug for MetadataPrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataPrefetcher")
            .field("extractor", &self.extractor.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MetadataPrefetcher {
    /// Create a prefetcher that gives up on async lookups after `timeout`
    pub fn new(extractor: Arc<dyn Extractor>, timeout: Duration) -> Self {
        Self { extractor, timeout }
    }

    /// Fetch metadata, blocking the calling thread
    ///
    /// Extraction failures (including a panicking extractor) come back as
    /// [`Error::Extraction`] with a `could not extract metadata: ` prefix.
    /// A missing or unrunnable extractor binary stays [`Error::ExternalTool`].
    /// Firing `cancel` stops the extractor early.
    pub fn fetch(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Metadata> {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.extractor.metadata(request.url(), cancel)
        }));

        let result = match result {
            Ok(Ok(metadata)) => Ok(metadata),
            Ok(Err(Error::ExternalTool(msg))) => Err(Error::ExternalTool(msg)),
            Ok(Err(e)) => Err(extraction_failed(e)),
            Err(_) => Err(extraction_failed("extractor panicked")),
        };

        match &result {
            Ok(metadata) => tracing::info!(
                url = %request,
                title = %metadata.title,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "metadata extracted"
            ),
            Err(e) => tracing::warn!(url = %request, error = %e, "metadata extraction failed"),
        }
        result
    }

    /// Fetch metadata on the blocking thread pool, bounded by the configured timeout
    ///
    /// The lookup is cancelled when the timeout elapses or the returned future
    /// is dropped, so no extractor process outlives the call.
    pub async fn fetch_async(&self, request: &DownloadRequest) -> Result<Metadata> {
        let cancel = CancellationToken::new();
        let _stop_on_exit = cancel.clone().drop_guard();

        let prefetcher = self.clone();
        let owned = request.clone();
        let task = tokio::task::spawn_blocking(move || prefetcher.fetch(&owned, &cancel));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Other(format!("metadata task failed: {e}"))),
            Err(_) => {
                tracing::warn!(url = %request, timeout_secs = self.timeout.as_secs(), "metadata extraction timed out");
                Err(extraction_failed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }
}

fn extraction_failed(cause: impl std::fmt::Display) -> Error {
    Error::Extraction(format!("could not extract metadata: {cause}"))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{Artifact, ProgressHook, ScriptedExtractor};
    use std::path::Path;

    fn prefetcher(extractor: ScriptedExtractor) -> MetadataPrefetcher {
        MetadataPrefetcher::new(Arc::new(extractor), Duration::from_secs(5))
    }

    #[test]
    fn returns_extractor_metadata() {
        let expected = Metadata {
            title: "Clip".into(),
            duration_seconds: 42,
            thumbnail_url: "https://t/x.jpg".into(),
            total_bytes: Some(1024),
        };
        let p = prefetcher(ScriptedExtractor::new(vec![]).with_metadata(expected.clone()));
        let request = DownloadRequest::new("videoA").unwrap();
        assert_eq!(p.fetch(&request, &CancellationToken::new()).unwrap(), expected);
    }

    #[test]
    fn failure_is_prefixed_extraction_error() {
        let p = prefetcher(ScriptedExtractor::new(vec![]).with_metadata_error("Unsupported URL"));
        let request = DownloadRequest::new("videoA").unwrap();
        match p.fetch(&request, &CancellationToken::new()) {
            Err(Error::Extraction(msg)) => {
                assert_eq!(msg, "could not extract metadata: Unsupported URL")
            }
            other => panic!("expected Extraction error, got {other:?}"),
        }
    }

    /// Sleeps until cancelled, recording whether it saw the cancellation
    #[derive(Default)]
    struct SlowExtractor {
        stopped: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Extractor for SlowExtractor {
        fn metadata(&self, _url: &str, cancel: &CancellationToken) -> Result<Metadata> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
                    return Err(Error::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(Metadata::default())
        }

        fn download(
            &self,
            _request: &DownloadRequest,
            _work_dir: &Path,
            _on_progress: &mut ProgressHook<'_>,
        ) -> Result<Artifact> {
            Ok(Artifact::default())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct PanickingExtractor;

    impl Extractor for PanickingExtractor {
        fn metadata(&self, _url: &str, _cancel: &CancellationToken) -> Result<Metadata> {
            panic!("metadata blew up")
        }

        fn download(
            &self,
            _request: &DownloadRequest,
            _work_dir: &Path,
            _on_progress: &mut ProgressHook<'_>,
        ) -> Result<Artifact> {
            Ok(Artifact::default())
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn async_fetch_times_out_and_stops_the_extractor() {
        let extractor = SlowExtractor::default();
        let stopped = Arc::clone(&extractor.stopped);
        let p = MetadataPrefetcher::new(Arc::new(extractor), Duration::from_millis(50));
        let request = DownloadRequest::new("videoA").unwrap();

        let started = Instant::now();
        match p.fetch_async(&request).await {
            Err(Error::Extraction(msg)) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected timeout, got {other:?}"),
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while !stopped.load(std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("extractor kept running after the timeout");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn dropped_fetch_stops_the_extractor() {
        let extractor = SlowExtractor::default();
        let stopped = Arc::clone(&extractor.stopped);
        let p = MetadataPrefetcher::new(Arc::new(extractor), Duration::from_secs(30));
        let request = DownloadRequest::new("videoA").unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), p.fetch_async(&request)).await;
        assert!(abandoned.is_err());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !stopped.load(std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("extractor kept running after the caller went away");
    }

    #[test]
    fn panicking_extractor_is_contained() {
        let p = MetadataPrefetcher::new(Arc::new(PanickingExtractor), Duration::from_secs(1));
        let request = DownloadRequest::new("videoA").unwrap();
        let result = p.fetch(&request, &CancellationToken::new());
        assert!(matches!(result, Err(Error::Extraction(_))));
    }
}
