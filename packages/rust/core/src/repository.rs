//! CRUD over the highlight collection.
//!
//! The whole collection lives under one store key. Every mutation reads it,
//! changes it in memory and writes it back. Mutations on one repository are
//! serialized by an async write gate so concurrent callers in this process
//! cannot lose each other's updates. Other processes writing the same
//! database still follow last-write-wins.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use glean_shared::{GleanError, HIGHLIGHTS_KEY, Highlight, HighlightId, NewHighlight, Result};
use glean_storage::{KvStore, StoreMap};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the epoch-millisecond timestamps used as highlight ids.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

// ---------------------------------------------------------------------------
// HighlightRepository
// ---------------------------------------------------------------------------

/// The `highlights` collection, in creation order.
pub struct HighlightRepository<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    write_gate: Mutex<()>,
}

impl<S: KvStore> HighlightRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            write_gate: Mutex::new(()),
        }
    }

    /// Replace the id clock (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying store, shared with other components.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Every highlight, oldest first. Never-written collections are empty.
    pub async fn list(&self) -> Result<Vec<Highlight>> {
        self.load().await
    }

    /// Look up one highlight by id.
    pub async fn get(&self, id: HighlightId) -> Result<Option<Highlight>> {
        Ok(self.load().await?.into_iter().find(|h| h.id == id))
    }

    /// Append a new highlight and return it.
    ///
    /// The caller guarantees `new.text` is non-empty; it is not re-checked.
    /// The id is the current epoch millisecond, bumped past the newest
    /// existing id when the clock has not advanced beyond it.
    #[instrument(skip_all)]
    pub async fn create(&self, new: NewHighlight) -> Result<Highlight> {
        debug_assert!(!new.text.is_empty(), "highlight text must be non-empty");
        let _gate = self.write_gate.lock().await;

        let mut highlights = self.load().await?;
        let now = self.clock.now_millis();
        let id = match highlights.iter().map(|h| h.id.as_millis()).max() {
            Some(newest) if newest >= now => newest + 1,
            _ => now,
        };

        let highlight = Highlight {
            id: HighlightId(id),
            text: new.text,
            url: new.url,
            title: new.title,
            date: new.date,
            summary: None,
        };
        highlights.push(highlight.clone());
        self.save(&highlights).await?;

        info!(id = %highlight.id, total = highlights.len(), "highlight saved");
        Ok(highlight)
    }

    /// Remove the highlight with `id`. Returns whether one was removed;
    /// absent ids are not an error.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn delete(&self, id: HighlightId) -> Result<bool> {
        let _gate = self.write_gate.lock().await;

        let mut highlights = self.load().await?;
        let before = highlights.len();
        highlights.retain(|h| h.id != id);
        if highlights.len() == before {
            debug!("no highlight with this id, nothing to delete");
            return Ok(false);
        }

        self.save(&highlights).await?;
        info!("highlight deleted");
        Ok(true)
    }

    /// Set the summary of the highlight with `id`. Returns whether a record
    /// was updated; the highlight may have been deleted while its
    /// enrichment was in flight.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn update_summary(&self, id: HighlightId, summary: &str) -> Result<bool> {
        let _gate = self.write_gate.lock().await;

        let mut highlights = self.load().await?;
        let Some(highlight) = highlights.iter_mut().find(|h| h.id == id) else {
            debug!("highlight vanished before its summary arrived");
            return Ok(false);
        };
        highlight.summary = Some(summary.to_owned());

        self.save(&highlights).await?;
        debug!("summary stored");
        Ok(true)
    }

    async fn load(&self) -> Result<Vec<Highlight>> {
        let mut found = self.store.get(&[HIGHLIGHTS_KEY]).await?;
        match found.remove(HIGHLIGHTS_KEY) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| GleanError::serialization(HIGHLIGHTS_KEY, e)),
        }
    }

    async fn save(&self, highlights: &[Highlight]) -> Result<()> {
        let value = serde_json::to_value(highlights)
            .map_err(|e| GleanError::serialization(HIGHLIGHTS_KEY, e))?;
        self.store
            .set(StoreMap::from([(HIGHLIGHTS_KEY.to_owned(), value)]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    use glean_storage::MemoryStore;
    use serde_json::json;

    /// Clock that starts at `start` and advances by `step` per reading.
    struct SteppingClock {
        next: AtomicI64,
        step: i64,
    }

    impl SteppingClock {
        fn new(start: i64, step: i64) -> Arc<Self> {
            Arc::new(Self {
                next: AtomicI64::new(start),
                step,
            })
        }
    }

    impl Clock for SteppingClock {
        fn now_millis(&self) -> i64 {
            self.next.fetch_add(self.step, Ordering::SeqCst)
        }
    }

    fn repo_with_clock(start: i64, step: i64) -> HighlightRepository<MemoryStore> {
        HighlightRepository::new(Arc::new(MemoryStore::new()))
            .with_clock(SteppingClock::new(start, step))
    }

    fn capture(text: &str) -> NewHighlight {
        NewHighlight {
            text: text.into(),
            url: "https://example.com/article".into(),
            title: "An Article".into(),
            date: "3/14/2025".into(),
        }
    }

    #[tokio::test]
    async fn list_empty_when_never_written() {
        let repo = repo_with_clock(1, 1);
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_assigns_clock_ids_in_order() {
        let repo = repo_with_clock(1_000, 7);
        for text in ["first", "second", "third"] {
            repo.create(capture(text)).await.unwrap();
        }

        let listed = repo.list().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|h| h.id.as_millis()).collect();
        assert_eq!(ids, vec![1_000, 1_007, 1_014]);
        let texts: Vec<&str> = listed.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(listed.iter().all(|h| h.summary.is_none()));
    }

    #[tokio::test]
    async fn create_in_same_millisecond_stays_unique() {
        let repo = repo_with_clock(5_000, 0);
        let a = repo.create(capture("a")).await.unwrap();
        let b = repo.create(capture("b")).await.unwrap();
        assert_eq!(a.id, HighlightId(5_000));
        assert_eq!(b.id, HighlightId(5_001));
    }

    #[tokio::test]
    async fn delete_removes_exactly_one_and_keeps_order() {
        let repo = repo_with_clock(10, 1);
        for text in ["a", "b", "c"] {
            repo.create(capture(text)).await.unwrap();
        }

        assert!(repo.delete(HighlightId(11)).await.unwrap());
        let listed = repo.list().await.unwrap();
        let texts: Vec<&str> = listed.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert!(repo.get(HighlightId(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = repo_with_clock(10, 1);
        repo.create(capture("a")).await.unwrap();
        repo.create(capture("b")).await.unwrap();

        assert!(repo.delete(HighlightId(10)).await.unwrap());
        let once = repo.list().await.unwrap();
        assert!(!repo.delete(HighlightId(10)).await.unwrap());
        assert_eq!(repo.list().await.unwrap(), once);
    }

    #[tokio::test]
    async fn delete_missing_id_leaves_collection_unchanged() {
        let repo = repo_with_clock(10, 1);
        repo.create(capture("a")).await.unwrap();
        let before = repo.list().await.unwrap();

        assert!(!repo.delete(HighlightId(999)).await.unwrap());
        assert_eq!(repo.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn update_summary_touches_only_target() {
        let repo = repo_with_clock(100, 1);
        for text in ["a", "b", "c"] {
            repo.create(capture(text)).await.unwrap();
        }
        let before = repo.list().await.unwrap();

        assert!(repo.update_summary(HighlightId(101), "short").await.unwrap());
        let after = repo.list().await.unwrap();

        assert_eq!(after[1].summary.as_deref(), Some("short"));
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
    }

    #[tokio::test]
    async fn update_summary_keeps_other_fields_identical() {
        let repo = repo_with_clock(100, 1);
        let created = repo.create(capture("Borrowing lets code use a value without owning it."))
            .await
            .unwrap();
        let listed = repo.list().await.unwrap().remove(0);
        assert_eq!(listed, created);

        repo.update_summary(created.id, "Borrowing avoids ownership transfer.")
            .await
            .unwrap();
        let updated = repo.list().await.unwrap().remove(0);

        assert_eq!(
            Highlight {
                summary: None,
                ..updated.clone()
            },
            listed
        );
        assert_eq!(
            updated.summary.as_deref(),
            Some("Borrowing avoids ownership transfer.")
        );
    }

    #[tokio::test]
    async fn update_summary_overwrites_previous_summary() {
        let repo = repo_with_clock(100, 1);
        let h = repo.create(capture("a")).await.unwrap();
        repo.update_summary(h.id, "first").await.unwrap();
        repo.update_summary(h.id, "second").await.unwrap();
        assert_eq!(repo.get(h.id).await.unwrap().unwrap().summary.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn update_summary_on_missing_id_is_noop() {
        let repo = repo_with_clock(100, 1);
        repo.create(capture("a")).await.unwrap();
        let before = repo.list().await.unwrap();

        assert!(!repo.update_summary(HighlightId(7), "lost").await.unwrap());
        assert_eq!(repo.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn concurrent_mutations_lose_no_writes() {
        let repo = repo_with_clock(1, 1);
        let seed = repo.create(capture("seed")).await.unwrap();
        let doomed = repo.create(capture("doomed")).await.unwrap();

        let (a, b, summary, deleted) = tokio::join!(
            repo.create(capture("a")),
            repo.create(capture("b")),
            repo.update_summary(seed.id, "seeded"),
            repo.delete(doomed.id),
        );
        a.unwrap();
        b.unwrap();
        assert!(summary.unwrap());
        assert!(deleted.unwrap());

        let listed = repo.list().await.unwrap();
        let mut texts: Vec<&str> = listed.iter().map(|h| h.text.as_str()).collect();
        texts.sort_unstable();
        assert_eq!(texts, vec!["a", "b", "seed"]);
        assert_eq!(listed[0].summary.as_deref(), Some("seeded"));
    }

    #[tokio::test]
    async fn stored_collection_uses_plain_json_records() {
        let store = Arc::new(MemoryStore::new());
        let repo = HighlightRepository::new(store.clone()).with_clock(SteppingClock::new(42, 1));
        repo.create(capture("a")).await.unwrap();

        let raw = store.get(&[HIGHLIGHTS_KEY]).await.unwrap();
        assert_eq!(
            raw[HIGHLIGHTS_KEY],
            json!([{
                "id": 42,
                "text": "a",
                "url": "https://example.com/article",
                "title": "An Article",
                "date": "3/14/2025"
            }])
        );
    }

    #[tokio::test]
    async fn corrupt_collection_is_serialization_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(StoreMap::from([(HIGHLIGHTS_KEY.to_owned(), json!("not a list"))]))
            .await
            .unwrap();
        let repo = HighlightRepository::new(store);
        assert!(matches!(
            repo.list().await,
            Err(GleanError::Serialization { .. })
        ));
    }
}
