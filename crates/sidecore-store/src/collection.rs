//! A generic keyed document collection (C2).
//!
//! The spec's document store facade is MongoDB-shaped (`findOne`, `find`,
//! `insertOne`, `updateOne`, `findOneAndUpdate` with `sort`/`returnAfter`,
//! `updateMany`) with a small operator set (`$set`, `$inc`, `$in`, `$lt`,
//! `$or`). Per the design note in (§9), that query/update AST is
//! modeled here as a small typed command set instead: predicates are plain
//! `Fn(&T) -> bool` closures and updates are `FnOnce(&mut T)` closures, which
//! is the idiomatic-Rust equivalent of "$set"/"$inc" mutation and is strictly
//! more precise at compile time. Every document type lives in its own
//! [`Collection`]; [`crate::store::Store`] aggregates one per entity kind.
//!
//! A single `tokio::sync::Mutex` per collection gives single-document updates
//! the atomicity required relative to the serial executor, while
//! still being awaitable the way every other store operation in this
//! workspace is (see SPEC_FULL.md §10.1): the lock is held only for the
//! duration of the in-memory mutation, never across an external I/O point.

use tokio::sync::Mutex;

/// A document that can be stored in a [`Collection`]. `key()` is the
/// collection's primary key (e.g. `poolId`, `user_poolId`, `orderId`).
pub trait Document: Clone + Send + Sync + 'static {
    fn key(&self) -> String;
}

pub struct Collection<T: Document> {
    docs: Mutex<Vec<T>>,
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self { docs: Mutex::new(Vec::new()) }
    }
}

impl<T: Document> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `findOne(query)`.
    pub async fn find_one<P: Fn(&T) -> bool>(&self, pred: P) -> Option<T> {
        let docs = self.docs.lock().await;
        docs.iter().find(|d| pred(d)).cloned()
    }

    /// `find(query)`.
    pub async fn find<P: Fn(&T) -> bool>(&self, pred: P) -> Vec<T> {
        let docs = self.docs.lock().await;
        docs.iter().filter(|d| pred(d)).cloned().collect()
    }

    pub async fn all(&self) -> Vec<T> {
        self.docs.lock().await.clone()
    }

    /// `insertOne(doc)`. Fails if a document with the same key already exists
    /// — the facade must preserve document keys.
    pub async fn insert_one(&self, doc: T) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().await;
        let key = doc.key();
        if docs.iter().any(|d| d.key() == key) {
            anyhow::bail!("duplicate key {key}");
        }
        docs.push(doc);
        Ok(())
    }

    /// Insert if absent, otherwise leave the existing document untouched.
    /// Used by idempotent "persist the taker in initial state if new" steps.
    pub async fn insert_if_absent(&self, doc: T) -> bool {
        let mut docs = self.docs.lock().await;
        let key = doc.key();
        if docs.iter().any(|d| d.key() == key) {
            false
        } else {
            docs.push(doc);
            true
        }
    }

    /// `updateOne(query, update)`. Returns whether a document matched.
    pub async fn update_one<P, U>(&self, pred: P, update: U) -> bool
    where
        P: Fn(&T) -> bool,
        U: FnOnce(&mut T),
    {
        let mut docs = self.docs.lock().await;
        match docs.iter_mut().find(|d| pred(d)) {
            Some(d) => {
                update(d);
                true
            }
            None => false,
        }
    }

    /// `updateMany(query, update)`. Returns the number of documents matched.
    pub async fn update_many<P, U>(&self, pred: P, mut update: U) -> usize
    where
        P: Fn(&T) -> bool,
        U: FnMut(&mut T),
    {
        let mut docs = self.docs.lock().await;
        let mut count = 0;
        for d in docs.iter_mut().filter(|d| pred(d)) {
            update(d);
            count += 1;
        }
        count
    }

    /// `findOneAndUpdate(query, update, {sort, returnAfter: true})`.
    ///
    /// Among the documents matching `pred`, picks the one with the smallest
    /// `sort_key` (e.g. `createdAt`), applies `update` to it atomically
    /// relative to other callers of this collection, and returns the
    /// document *after* the update. This is the "pick one, flip to
    /// processing atomically" primitive the bridge worker (C12) depends on
    /// for at-most-once job dispatch.
    pub async fn find_one_and_update_sorted<P, K, O, U>(
        &self,
        pred: P,
        sort_key: K,
        update: U,
    ) -> Option<T>
    where
        P: Fn(&T) -> bool,
        K: Fn(&T) -> O,
        O: Ord,
        U: FnOnce(&mut T),
    {
        let mut docs = self.docs.lock().await;
        let idx = docs
            .iter()
            .enumerate()
            .filter(|(_, d)| pred(d))
            .min_by_key(|(_, d)| sort_key(d))
            .map(|(i, _)| i)?;
        update(&mut docs[idx]);
        Some(docs[idx].clone())
    }

    /// `findOneAndUpdate` without a sort requirement: picks an arbitrary
    /// matching document (the first one found).
    pub async fn find_one_and_update<P, U>(&self, pred: P, update: U) -> Option<T>
    where
        P: Fn(&T) -> bool,
        U: FnOnce(&mut T),
    {
        let mut docs = self.docs.lock().await;
        let idx = docs.iter().position(|d| pred(d))?;
        update(&mut docs[idx]);
        Some(docs[idx].clone())
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// A full snapshot of the collection's current contents, for the store
    /// facade's snapshot-persistence responsibility (§4.2).
    pub async fn snapshot(&self) -> Vec<T> {
        self.all().await
    }

    /// Replace the collection's contents wholesale — used to restore a
    /// snapshot taken with [`Collection::snapshot`].
    pub async fn restore(&self, docs: Vec<T>) {
        *self.docs.lock().await = docs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        id: String,
        created_at: i64,
        value: i64,
    }

    impl Document for Item {
        fn key(&self) -> String {
            self.id.clone()
        }
    }

    #[tokio::test]
    async fn insert_and_find() {
        let c: Collection<Item> = Collection::new();
        c.insert_one(Item { id: "a".into(), created_at: 1, value: 10 }).await.unwrap();
        assert!(c.insert_one(Item { id: "a".into(), created_at: 2, value: 20 }).await.is_err());
        let found = c.find_one(|i| i.id == "a").await.unwrap();
        assert_eq!(found.value, 10);
    }

    #[tokio::test]
    async fn find_one_and_update_sorted_picks_oldest() {
        let c: Collection<Item> = Collection::new();
        c.insert_one(Item { id: "a".into(), created_at: 5, value: 0 }).await.unwrap();
        c.insert_one(Item { id: "b".into(), created_at: 1, value: 0 }).await.unwrap();
        c.insert_one(Item { id: "c".into(), created_at: 3, value: 0 }).await.unwrap();

        let picked = c
            .find_one_and_update_sorted(|_| true, |i| i.created_at, |i| i.value = 99)
            .await
            .unwrap();
        assert_eq!(picked.id, "b");
        assert_eq!(picked.value, 99);

        // b is now value=99; picking again by created_at still returns b unless excluded
        let still_picked = c
            .find_one_and_update_sorted(|i| i.value == 0, |i| i.created_at, |i| i.value = 1)
            .await
            .unwrap();
        assert_eq!(still_picked.id, "c");
    }
}
