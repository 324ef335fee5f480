//! Batch install scheduling
//!
//! The coordinator walks the manifest in order, acquiring one semaphore
//! permit per item before spawning its install task, so items start in
//! manifest order and at most [`MAX_PARALLEL_INSTALLS`] run at once. A
//! separate aggregator task samples [`BatchProgress`] on a fixed interval.
//! Results are awaited in spawn order, which keeps the summary in manifest
//! order whatever order the installs finish in.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::error::ApiErrorCode;
use crate::install::fetcher::ProgressFn;
use crate::install::progress::{BatchProgress, ProgressSink, ProgressUpdate};
use crate::install::worker::InstallWorker;
use crate::logger;
use crate::models::{BatchSummary, InstallOutcome, Manifest};

pub const MAX_PARALLEL_INSTALLS: usize = 5;

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Leave the indicator at its final value instead of clearing it
    pub keep_progress_visible: bool,
}

pub struct BatchScheduler {
    worker: Arc<InstallWorker>,
    max_parallel: usize,
    interval: Duration,
}

impl BatchScheduler {
    pub fn new(worker: Arc<InstallWorker>) -> Self {
        Self {
            worker,
            max_parallel: MAX_PARALLEL_INSTALLS,
            interval: PROGRESS_INTERVAL,
        }
    }

    /// Install every manifest item into `root`
    ///
    /// Per-item failures are reported in the summary; the batch itself
    /// always completes.
    pub async fn run_batch(
        &self,
        manifest: &Manifest,
        root: &Path,
        sink: Arc<dyn ProgressSink>,
        options: BatchOptions,
    ) -> BatchSummary {
        let total = manifest.items.len();
        if total == 0 {
            logger::log_info(
                &format!("Playlist \"{}\" has no valid entries", manifest.title),
                Some("installer"),
            );
            return BatchSummary::from_outcomes(manifest.title.clone(), Vec::new());
        }

        logger::log_info(
            &format!(
                "Installing {} maps from \"{}\" ({} at a time)",
                total, manifest.title, self.max_parallel
            ),
            Some("installer"),
        );

        let progress = Arc::new(BatchProgress::new(total));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let aggregator = spawn_aggregator(
            Arc::clone(&progress),
            Arc::clone(&sink),
            self.interval,
            stop_rx,
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut handles: Vec<JoinHandle<InstallOutcome>> = Vec::with_capacity(total);

        for item in &manifest.items {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let outcome = InstallOutcome::Failed {
                        id: item.id.clone(),
                        key: item.key.clone(),
                        code: ApiErrorCode::Internal,
                        cause: "Semaphore closed".to_string(),
                    };
                    progress.finish_item(&item.id);
                    handles.push(tokio::spawn(async move { outcome }));
                    continue;
                }
            };

            let counter = progress.start_item(&item.id);
            let on_progress: ProgressFn =
                Arc::new(move |received, size| counter.record(received, size));

            let worker = Arc::clone(&self.worker);
            let progress = Arc::clone(&progress);
            let item = item.clone();
            let root = root.to_path_buf();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = worker.install(&item, &root, on_progress).await;
                progress.finish_item(&item.id);
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (item, handle) in manifest.items.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    progress.finish_item(&item.id);
                    InstallOutcome::Failed {
                        id: item.id.clone(),
                        key: item.key.clone(),
                        code: ApiErrorCode::Internal,
                        cause: format!("Install task aborted: {}", e),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let _ = stop_tx.send(());
        let _ = aggregator.await;

        if options.keep_progress_visible {
            sink.publish(progress.snapshot());
        } else {
            sink.publish(ProgressUpdate::Clear);
        }
        progress.reset();

        let summary = BatchSummary::from_outcomes(manifest.title.clone(), outcomes);
        logger::log_info(
            &format!(
                "Playlist \"{}\" finished: {} installed, {} failed",
                summary.title,
                summary.succeeded,
                summary.failed.len()
            ),
            Some("installer"),
        );
        summary
    }
}

fn spawn_aggregator(
    progress: Arc<BatchProgress>,
    sink: Arc<dyn ProgressSink>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => sink.publish(progress.snapshot()),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::extraction::testing::zip_bytes;
    use crate::install::fetcher::testing::{StubFetcher, StubResponse};
    use crate::install::progress::testing::RecordingSink;
    use crate::library::cache::MetadataCache;
    use crate::models::{ContentId, ManifestItem};
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn id(n: usize) -> ContentId {
        ContentId::parse(&format!("{:040x}", n + 1)).unwrap()
    }

    fn manifest(count: usize) -> Manifest {
        Manifest {
            title: "Pack".into(),
            items: (0..count)
                .map(|n| ManifestItem {
                    id: id(n),
                    key: Some(format!("{:x}", n + 10)),
                })
                .collect(),
        }
    }

    fn map_zip(title: &str) -> Vec<u8> {
        let info = format!(r#"{{"_songName":"{}","_songAuthorName":"Artist"}}"#, title);
        zip_bytes(&[("info.dat", info.as_bytes())])
    }

    fn scheduler(fetcher: Arc<StubFetcher>) -> BatchScheduler {
        BatchScheduler::new(Arc::new(InstallWorker::new(
            fetcher,
            Arc::new(MetadataCache::new()),
            "https://cdn.test",
        )))
    }

    #[tokio::test]
    async fn test_empty_manifest_is_trivial() {
        let temp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::new(Duration::ZERO));
        let sink = Arc::new(RecordingSink::default());

        let summary = scheduler(Arc::clone(&fetcher))
            .run_batch(&manifest(0), temp.path(), sink.clone(), BatchOptions::default())
            .await;

        assert_eq!(summary.total, 0);
        assert_eq!(summary.succeeded, 0);
        assert!(summary.failed.is_empty());
        assert!(fetcher.requested().is_empty());
        assert!(sink.updates().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bounded_and_outcomes_complete() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = manifest(12);
        let mut stub = StubFetcher::new(Duration::from_millis(40));
        for (n, item) in manifest.items.iter().enumerate() {
            stub = stub.serve(
                item.id.as_str(),
                StubResponse::Archive(map_zip(&format!("Song {}", n))),
            );
        }
        let fetcher = Arc::new(stub);
        let sink = Arc::new(RecordingSink::default());

        let summary = scheduler(Arc::clone(&fetcher))
            .run_batch(&manifest, temp.path(), sink.clone(), BatchOptions::default())
            .await;

        let max = fetcher.max_concurrent.load(Ordering::SeqCst);
        assert!(max <= MAX_PARALLEL_INSTALLS, "saw {} concurrent installs", max);
        assert!(max >= 2);

        assert_eq!(summary.total, 12);
        assert_eq!(summary.succeeded + summary.failed.len(), summary.total);
        let requested: HashSet<ContentId> = summary.outcomes.iter().map(|o| o.id().clone()).collect();
        let expected: HashSet<ContentId> = manifest.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(requested, expected);

        assert_eq!(fetcher.requested().len(), 12);

        assert_eq!(sink.updates().last(), Some(&ProgressUpdate::Clear));
    }

    #[tokio::test]
    async fn test_corrupt_item_isolated() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let manifest = manifest(3);
        let fetcher = Arc::new(
            StubFetcher::new(Duration::from_millis(5))
                .serve(manifest.items[0].id.as_str(), StubResponse::Archive(map_zip("One")))
                .serve(
                    manifest.items[1].id.as_str(),
                    StubResponse::Archive(b"not a zip".to_vec()),
                )
                .serve(manifest.items[2].id.as_str(), StubResponse::Archive(map_zip("Three"))),
        );
        let sink = Arc::new(RecordingSink::default());

        let summary = scheduler(fetcher)
            .run_batch(&manifest, root, sink.clone(), BatchOptions::default())
            .await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].id, manifest.items[1].id);
        assert_eq!(summary.failed[0].key.as_deref(), Some("b"));
        assert_eq!(summary.failed[0].code, ApiErrorCode::ArchiveError);

        let order: Vec<&ContentId> = summary.outcomes.iter().map(InstallOutcome::id).collect();
        let expected: Vec<&ContentId> = manifest.items.iter().map(|i| &i.id).collect();
        assert_eq!(order, expected);

        assert!(root.join("a (One - Artist)").is_dir());
        assert!(root.join("c (Three - Artist)").is_dir());
        assert!(!root.join(manifest.items[1].id.as_str()).exists());

        let updates = sink.updates();
        assert_eq!(updates.last(), Some(&ProgressUpdate::Clear));
        for update in &updates {
            if let ProgressUpdate::Fraction { value, .. } = update {
                assert!((0.0..=1.0).contains(value));
            }
        }
    }

    #[tokio::test]
    async fn test_keep_progress_visible() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = manifest(1);
        let fetcher = Arc::new(
            StubFetcher::new(Duration::ZERO)
                .serve(manifest.items[0].id.as_str(), StubResponse::Archive(map_zip("Solo"))),
        );
        let sink = Arc::new(RecordingSink::default());

        let summary = scheduler(fetcher)
            .run_batch(
                &manifest,
                temp.path(),
                sink.clone(),
                BatchOptions {
                    keep_progress_visible: true,
                },
            )
            .await;

        assert_eq!(summary.succeeded, 1);
        let updates = sink.updates();
        assert!(!updates.contains(&ProgressUpdate::Clear));
        assert_eq!(
            updates.last(),
            Some(&ProgressUpdate::Fraction {
                value: 1.0,
                indeterminate: false
            })
        );
    }
}
