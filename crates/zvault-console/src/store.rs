//! Client-side record cache.
//!
//! One store per console session, shared by `Arc`. Records are grouped by
//! kind and kept in insertion order. Every mutation is a single write-lock
//! section, so readers never see a half-applied update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use crate::record::{Attributes, Record};
use crate::resource::ResourceKind;

/// Records of one kind: insertion order plus an id index into it.
#[derive(Debug, Default)]
struct Bucket {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl Bucket {
    fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).and_then(|&i| self.records.get(i))
    }

    fn upsert(&mut self, record: Record) {
        match self.index.get(&record.id) {
            Some(&i) => {
                if let Some(slot) = self.records.get_mut(i) {
                    if record.is_new && !slot.is_new {
                        debug!(kind = %record.kind, id = %record.id, "pending record would shadow a saved one");
                        return;
                    }
                    *slot = record;
                }
            }
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<Record> {
        let i = self.index.remove(id)?;
        let record = self.records.remove(i);
        self.reindex_from(i);
        Some(record)
    }

    /// Remove every record matching `pred`, keeping the order of the rest.
    fn drain_where(&mut self, pred: impl Fn(&Record) -> bool) -> Vec<Record> {
        let (drained, kept): (Vec<Record>, Vec<Record>) =
            std::mem::take(&mut self.records).into_iter().partition(pred);
        self.records = kept;
        self.index.clear();
        self.reindex_from(0);
        drained
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, record) in self.records.iter().enumerate().skip(start) {
            self.index.insert(record.id.clone(), i);
        }
    }
}

/// Record cache keyed by `(kind, id)`.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RwLock<HashMap<String, Bucket>>,
    pending_seq: AtomicU64,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert records, replacing any with the same kind and id.
    ///
    /// A pending record never replaces a saved one.
    pub async fn push(&self, records: impl IntoIterator<Item = Record>) {
        let mut map = self.records.write().await;
        for record in records {
            map.entry(record.kind.clone()).or_default().upsert(record);
        }
    }

    pub async fn peek(&self, kind: &str, id: &str) -> Option<Record> {
        self.records.read().await.get(kind)?.get(id).cloned()
    }

    /// All records of a kind in insertion order.
    pub async fn all(&self, kind: &str) -> Vec<Record> {
        self.records
            .read()
            .await
            .get(kind)
            .map(|bucket| bucket.records.clone())
            .unwrap_or_default()
    }

    /// Remove one record. Returns it if it was cached.
    pub async fn unload(&self, kind: &str, id: &str) -> Option<Record> {
        self.records.write().await.get_mut(kind)?.remove(id)
    }

    /// Remove every record of a kind.
    pub async fn unload_all(&self, kind: &str) -> usize {
        self.records
            .write()
            .await
            .remove(kind)
            .map_or(0, |bucket| bucket.records.len())
    }

    /// Instantiate a pending record for a later create.
    ///
    /// The id is always a `new-N` placeholder, replaced once the record is
    /// saved, so a draft never takes the place of a cached record.
    pub async fn create_record(&self, kind: &ResourceKind, attributes: Attributes) -> Record {
        let mut map = self.records.write().await;
        let bucket = map.entry(kind.name.clone()).or_default();
        let id = loop {
            let seq = self.pending_seq.fetch_add(1, Ordering::Relaxed);
            let id = format!("new-{seq}");
            if bucket.get(&id).is_none() {
                break id;
            }
        };

        let mut record = Record::new(kind.name.as_str(), id, attributes);
        record.is_new = true;
        bucket.upsert(record.clone());
        record
    }

    /// Drop every pending record of a kind and return them.
    pub async fn discard_unsaved(&self, kind: &str) -> Vec<Record> {
        let mut map = self.records.write().await;
        let Some(bucket) = map.get_mut(kind) else {
            return Vec::new();
        };
        let discarded = bucket.drain_where(|r| r.is_new);
        if !discarded.is_empty() {
            debug!(kind, count = discarded.len(), "discarded unsaved records");
        }
        discarded
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resource;
    use serde_json::json;

    fn record(kind: &str, id: &str) -> Record {
        Record::new(kind, id, Attributes::new())
    }

    #[tokio::test]
    async fn push_replaces_same_id_and_keeps_order() {
        let store = RecordStore::new();
        store.push([record("policy", "a"), record("policy", "b")]).await;

        let mut updated = record("policy", "a");
        updated.attributes.insert("policy".to_owned(), json!("x"));
        store.push([updated]).await;

        let all = store.all("policy").await;
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(all[0].get_str("policy"), Some("x"));
    }

    #[tokio::test]
    async fn unload_removes_only_that_record() {
        let store = RecordStore::new();
        store.push([record("policy", "a"), record("secret-engine", "a")]).await;
        assert!(store.unload("policy", "a").await.is_some());
        assert!(store.peek("policy", "a").await.is_none());
        assert!(store.peek("secret-engine", "a").await.is_some());
        assert!(store.unload("policy", "a").await.is_none());
    }

    #[tokio::test]
    async fn create_record_always_gets_placeholder_id() {
        let store = RecordStore::new();
        let mut attrs = Attributes::new();
        attrs.insert("path".to_owned(), json!("kv"));
        let pending = store.create_record(&resource::secret_engine(), attrs).await;
        assert!(pending.id.starts_with("new-"));
        assert!(pending.is_new);
        assert_eq!(pending.get_str("path"), Some("kv"));

        let anonymous = store.create_record(&resource::secret_engine(), Attributes::new()).await;
        assert_ne!(anonymous.id, pending.id);
    }

    #[tokio::test]
    async fn draft_named_like_saved_record_leaves_it_cached() {
        let store = RecordStore::new();
        store.push([record("secret-engine", "kv")]).await;

        let mut attrs = Attributes::new();
        attrs.insert("path".to_owned(), json!("kv"));
        store.create_record(&resource::secret_engine(), attrs).await;

        let discarded = store.discard_unsaved("secret-engine").await;
        assert_eq!(discarded.len(), 1);
        let saved = store.peek("secret-engine", "kv").await.unwrap();
        assert!(!saved.is_new);
    }

    #[tokio::test]
    async fn pending_push_does_not_replace_saved_record() {
        let store = RecordStore::new();
        store.push([record("policy", "ops")]).await;
        let mut draft = record("policy", "ops");
        draft.is_new = true;
        store.push([draft]).await;
        assert!(!store.peek("policy", "ops").await.unwrap().is_new);
    }

    #[tokio::test]
    async fn index_follows_removals() {
        let store = RecordStore::new();
        store
            .push([record("policy", "a"), record("policy", "b"), record("policy", "c")])
            .await;
        store.unload("policy", "a").await;
        store.push([record("policy", "d")]).await;

        assert_eq!(store.peek("policy", "c").await.map(|r| r.id), Some("c".to_owned()));
        let ids: Vec<String> = store.all("policy").await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert!(store.unload("policy", "b").await.is_some());
        assert_eq!(store.peek("policy", "d").await.map(|r| r.id), Some("d".to_owned()));
    }

    #[tokio::test]
    async fn discard_unsaved_keeps_persisted_records() {
        let store = RecordStore::new();
        store.push([record("secret-engine", "sys")]).await;
        store.create_record(&resource::secret_engine(), Attributes::new()).await;

        let discarded = store.discard_unsaved("secret-engine").await;
        assert_eq!(discarded.len(), 1);
        let left = store.all("secret-engine").await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "sys");
    }

    #[tokio::test]
    async fn unload_all_reports_count() {
        let store = RecordStore::new();
        store.push([record("policy", "a"), record("policy", "b")]).await;
        assert_eq!(store.unload_all("policy").await, 2);
        assert!(store.all("policy").await.is_empty());
    }
}
