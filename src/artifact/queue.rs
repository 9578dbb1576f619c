use std::path::PathBuf;
use std::sync::Mutex;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::artifact::store::ArtifactStore;

/// Screenshots written concurrently per flush batch.
pub const FLUSH_BATCH_SIZE: usize = 5;

/// PNG bytes captured in the hot path, waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingScreenshot {
    pub test_case_id: String,
    pub label: String,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub written: Vec<PathBuf>,
    pub failed: usize,
}

/// Suite-scoped screenshot queue, flushed at suite completion.
#[derive(Debug, Default)]
pub struct ScreenshotQueue {
    pending: Mutex<Vec<PendingScreenshot>>,
}

impl ScreenshotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, test_case_id: &str, label: &str, png: Vec<u8>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(PendingScreenshot {
                test_case_id: test_case_id.to_string(),
                label: label.to_string(),
                png,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Labels of queued screenshots for one case, in capture order.
    pub fn labels_for(&self, test_case_id: &str) -> Vec<String> {
        self.pending
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|s| s.test_case_id == test_case_id)
                    .map(|s| s.label.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    fn take(&self) -> Vec<PendingScreenshot> {
        self.pending
            .lock()
            .map(|mut p| std::mem::take(&mut *p))
            .unwrap_or_default()
    }

    /// Write everything queued, [`FLUSH_BATCH_SIZE`] at a time. Failed writes
    /// are counted and dropped.
    pub async fn drain(&self, store: &ArtifactStore) -> DrainReport {
        let pending = self.take();
        let mut report = DrainReport::default();

        for batch in pending.chunks(FLUSH_BATCH_SIZE) {
            let writes = batch
                .iter()
                .map(|s| store.write_screenshot(&s.test_case_id, &s.label, &s.png));
            for (shot, result) in batch.iter().zip(join_all(writes).await) {
                match result {
                    Ok(stored) => report.written.push(stored.path),
                    Err(e) => {
                        warn!(case = %shot.test_case_id, label = %shot.label, error = %e, "screenshot write failed");
                        report.failed += 1;
                    }
                }
            }
        }

        debug!(written = report.written.len(), failed = report.failed, "screenshot queue drained");
        report
    }
}
