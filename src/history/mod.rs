//! Bounded snapshot history
//!
//! Snapshots copy every document field except image binaries. They are
//! taken on a debounced cadence and kept in a ring of fixed depth, oldest
//! evicted first.

mod store;

pub use store::{KeyValueStore, MemoryStore};

use crate::config::HistoryConfig;
use crate::document::{Document, DocumentFields};
use crate::editing::Debouncer;
use crate::error::{BookError, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// One saved document state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub id: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub fields: DocumentFields,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredHistory {
    next_id: u64,
    snapshots: Vec<HistorySnapshot>,
}

/// Snapshot ring with debounced capture
#[derive(Debug)]
pub struct HistoryManager {
    snapshots: VecDeque<HistorySnapshot>,
    depth: usize,
    next_id: u64,
    debouncer: Debouncer,
    storage_key: String,
}

impl HistoryManager {
    pub fn new(config: &HistoryConfig) -> Self {
        let depth = config.depth.max(1);
        Self {
            snapshots: VecDeque::with_capacity(depth),
            depth,
            next_id: 1,
            debouncer: Debouncer::new(config.snapshot_interval_ms),
            storage_key: config.storage_key.clone(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots from oldest to newest
    pub fn snapshots(&self) -> impl Iterator<Item = &HistorySnapshot> {
        self.snapshots.iter()
    }

    pub fn latest(&self) -> Option<&HistorySnapshot> {
        self.snapshots.back()
    }

    /// Capture the document now.
    ///
    /// A state identical to the latest snapshot is not recorded again, so
    /// an idle tick never pushes real history out of the ring. Returns
    /// `None` in that case.
    pub fn record(&mut self, document: &Document, now_ms: u64) -> Option<u64> {
        let fields = document.fields();
        if self.latest().is_some_and(|s| s.fields == fields) {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.snapshots.push_back(HistorySnapshot {
            id,
            timestamp: now_ms,
            fields,
        });
        while self.snapshots.len() > self.depth {
            if let Some(evicted) = self.snapshots.pop_front() {
                debug!(snapshot = evicted.id, "oldest snapshot evicted");
            }
        }
        Some(id)
    }

    /// Note that the document changed; a snapshot follows once edits pause
    pub fn note_mutation(&mut self, now_ms: u64) {
        self.debouncer.poke(now_ms);
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Take the pending snapshot if the quiet period has elapsed
    pub fn tick(&mut self, document: &Document, now_ms: u64) -> Option<u64> {
        if self.debouncer.take_ready(now_ms) {
            self.record(document, now_ms)
        } else {
            None
        }
    }

    /// Replace the document's text and structure with a snapshot.
    ///
    /// Returns how many floating images were dropped because their asset
    /// is gone.
    pub fn restore(&mut self, id: u64, document: &mut Document) -> Result<usize> {
        let snapshot = self
            .snapshots
            .iter()
            .find(|s| s.id == id)
            .ok_or(BookError::UnknownSnapshot(id))?;
        let dropped = document.restore_fields(snapshot.fields.clone());
        if dropped > 0 {
            warn!(snapshot = id, dropped, "restored snapshot referenced missing images");
        }
        self.debouncer.clear();
        info!(snapshot = id, "snapshot restored");
        Ok(dropped)
    }

    /// Write the ring to `store`.
    ///
    /// When the store runs out of quota the oldest snapshots are left out
    /// one at a time until the payload fits. If none fits, whatever the key
    /// held before is removed. Storage failures are logged and never
    /// surface; returns how many snapshots were written.
    pub fn persist(&self, store: &mut dyn KeyValueStore) -> usize {
        let mut skip = 0;
        while skip < self.snapshots.len() {
            let stored = StoredHistory {
                next_id: self.next_id,
                snapshots: self.snapshots.iter().skip(skip).cloned().collect(),
            };
            let blob = match serde_json::to_vec(&stored) {
                Ok(blob) => blob,
                Err(err) => {
                    warn!(error = %err, "history could not be serialized");
                    return 0;
                }
            };

            match store.save(&self.storage_key, &blob) {
                Ok(()) => {
                    debug!(snapshots = stored.snapshots.len(), bytes = blob.len(), "history persisted");
                    return stored.snapshots.len();
                }
                Err(StoreError::QuotaExceeded { needed }) => {
                    warn!(needed, "storage quota exceeded; dropping oldest snapshot");
                    skip += 1;
                }
                Err(err) => {
                    warn!(error = %err, "history not persisted");
                    return 0;
                }
            }
        }

        if !self.snapshots.is_empty() {
            warn!("no snapshot fits in storage; history not persisted");
        }
        // An older ring left under the key would come back on the next load
        if let Err(err) = store.remove(&self.storage_key) {
            warn!(error = %err, "stale history not cleared");
        }
        0
    }

    /// Replace the ring with what `store` holds. Missing or corrupt data
    /// leaves the ring untouched; returns how many snapshots were loaded.
    pub fn load(&mut self, store: &dyn KeyValueStore) -> usize {
        let blob = match store.load(&self.storage_key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return 0,
            Err(err) => {
                warn!(error = %err, "history could not be read");
                return 0;
            }
        };
        let stored: StoredHistory = match serde_json::from_slice(&blob) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "stored history is corrupt; ignoring it");
                return 0;
            }
        };

        let keep = stored.snapshots.len().min(self.depth);
        let skip = stored.snapshots.len() - keep;
        self.snapshots = stored.snapshots.into_iter().skip(skip).collect();
        let max_id = self.snapshots.iter().map(|s| s.id).max().unwrap_or(0);
        self.next_id = stored.next_id.max(max_id + 1);
        self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageAsset, Manuscript, SectionId};
    use crate::editing::EditOp;

    fn config(depth: usize) -> HistoryConfig {
        HistoryConfig {
            depth,
            snapshot_interval_ms: 100,
            ..HistoryConfig::default()
        }
    }

    fn doc() -> Document {
        Document::from_manuscript(&Manuscript {
            title: "T".to_string(),
            front_matter: "start".to_string(),
            ..Manuscript::default()
        })
    }

    fn type_char(doc: &mut Document, c: &str) {
        let len = doc.section(SectionId::FrontMatter).unwrap().rich_text.len();
        doc.apply_edit(SectionId::FrontMatter, &EditOp::insert(len, c))
            .unwrap();
    }

    #[test]
    fn test_history_bound_evicts_oldest() {
        let mut history = HistoryManager::new(&config(5));
        let mut doc = doc();
        let mut ids = Vec::new();
        // Each round changes the text; identical states would be skipped
        for i in 0..8 {
            type_char(&mut doc, "x");
            ids.push(history.record(&doc, i).unwrap());
        }
        assert_eq!(history.len(), 5);
        let kept: Vec<u64> = history.snapshots().map(|s| s.id).collect();
        assert_eq!(kept, ids[3..].to_vec());
    }

    #[test]
    fn test_identical_state_not_recorded() {
        let mut history = HistoryManager::new(&config(5));
        let doc = doc();
        assert!(history.record(&doc, 0).is_some());
        assert!(history.record(&doc, 1).is_none());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_debounced_cadence() {
        let mut history = HistoryManager::new(&config(5));
        let mut doc = doc();
        for now in [0, 50, 90] {
            type_char(&mut doc, "a");
            history.note_mutation(now);
            assert_eq!(history.tick(&doc, now), None);
        }
        assert_eq!(history.tick(&doc, 150), None);
        assert!(history.tick(&doc, 190).is_some());
        assert!(!history.has_pending());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_restore_drops_images_without_assets() {
        let mut history = HistoryManager::new(&config(5));
        let mut doc = doc();
        doc.add_asset(
            "pic",
            ImageAsset {
                mime: "image/png".to_string(),
                natural_width: 10,
                natural_height: 10,
                bytes: vec![1, 2, 3],
            },
        );
        let layer = crate::layout::FloatingLayer::new(crate::Size::new(400.0, 400.0));
        layer
            .attach(&mut doc, SectionId::FrontMatter, 0, "pic", crate::Size::new(10.0, 10.0), None)
            .unwrap();
        let id = history.record(&doc, 0).unwrap();

        type_char(&mut doc, "!");
        doc.remove_asset("pic");
        let dropped = history.restore(id, &mut doc).unwrap();
        assert_eq!(dropped, 1);
        let section = doc.section(SectionId::FrontMatter).unwrap();
        assert_eq!(section.rich_text, "start");
        assert!(section.floating_images.is_empty());
    }

    #[test]
    fn test_restore_unknown_snapshot() {
        let mut history = HistoryManager::new(&config(5));
        let mut doc = doc();
        assert!(matches!(
            history.restore(42, &mut doc),
            Err(BookError::UnknownSnapshot(42))
        ));
    }

    #[test]
    fn test_persist_and_load() {
        let mut history = HistoryManager::new(&config(3));
        let mut doc = doc();
        for i in 0..3 {
            type_char(&mut doc, "y");
            history.record(&doc, i);
        }
        let mut store = MemoryStore::new();
        assert_eq!(history.persist(&mut store), 3);

        let mut fresh = HistoryManager::new(&config(2));
        assert_eq!(fresh.load(&store), 2);
        let ids: Vec<u64> = fresh.snapshots().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3]);
        type_char(&mut doc, "z");
        assert_eq!(fresh.record(&doc, 10), Some(4));
    }

    #[test]
    fn test_quota_evicts_oldest_until_it_fits() {
        let mut history = HistoryManager::new(&config(5));
        let mut doc = doc();
        for i in 0..5 {
            type_char(&mut doc, &"w".repeat(200));
            history.record(&doc, i);
        }

        // Room for roughly two snapshots
        let one = serde_json::to_vec(history.latest().unwrap()).unwrap().len();
        let mut store = MemoryStore::with_quota(one * 2 + 64);
        let written = history.persist(&mut store);
        assert!(written >= 1 && written < 5);
        assert_eq!(history.len(), 5);

        let mut fresh = HistoryManager::new(&config(5));
        assert_eq!(fresh.load(&store), written);
        assert_eq!(fresh.latest(), history.latest());
    }

    #[test]
    fn test_nothing_fits_is_swallowed() {
        let mut history = HistoryManager::new(&config(5));
        history.record(&doc(), 0);
        let mut store = MemoryStore::with_quota(4);
        assert_eq!(history.persist(&mut store), 0);
        assert_eq!(store.used(), 0);
    }

    #[test]
    fn test_nothing_fits_clears_stale_history() {
        let mut history = HistoryManager::new(&config(5));
        let mut doc = doc();
        history.record(&doc, 0);
        let one = serde_json::to_vec(history.latest().unwrap()).unwrap().len();
        let mut store = MemoryStore::with_quota(one + 64);
        assert_eq!(history.persist(&mut store), 1);

        type_char(&mut doc, &"v".repeat(2000));
        history.record(&doc, 1);
        assert_eq!(history.persist(&mut store), 0);
        assert_eq!(store.used(), 0);

        let mut fresh = HistoryManager::new(&config(5));
        assert_eq!(fresh.load(&store), 0);
    }

    #[test]
    fn test_corrupt_store_is_ignored() {
        let mut store = MemoryStore::new();
        store.save("bookpress.history", b"not json").unwrap();
        let mut history = HistoryManager::new(&config(5));
        assert_eq!(history.load(&store), 0);
    }
}
