// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{KeyValueStore, StorageError};
use crate::{
    models::{history::EventSighting, ticket::Ticket},
    utils::counters::HISTORY_CACHE_SIZE,
};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::HashSet,
    marker::PhantomData,
    sync::{Arc, Mutex},
};
use tracing::warn;

/// Something that can live in a history list.
pub trait HistoryEntry: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Entries sharing a key are the same entry.
    fn dedup_key(&self) -> String;

    /// When the entry was recorded. Entries without a timestamp never expire.
    fn recorded_at(&self) -> Option<DateTime<Utc>>;
}

impl HistoryEntry for EventSighting {
    fn dedup_key(&self) -> String {
        format!(
            "{}:{}",
            self.event_id,
            self.transaction_hash.as_deref().unwrap_or_default()
        )
    }

    fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Some(self.timestamp)
    }
}

impl HistoryEntry for Ticket {
    fn dedup_key(&self) -> String {
        self.id.to_string()
    }

    fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.purchased_at
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Oldest entries are dropped past this many.
    pub capacity: usize,
    pub ttl: Option<Duration>,
}

impl EvictionPolicy {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
        }
    }
}

/// A newest-first list persisted under one storage key.
pub struct HistoryCache<T: HistoryEntry> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    policy: EvictionPolicy,
    // Serializes read-modify-write within this process.
    write_lock: Mutex<()>,
    _entry: PhantomData<T>,
}

impl<T: HistoryEntry> HistoryCache<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, policy: EvictionPolicy) -> Self {
        Self {
            store,
            key: key.into(),
            policy,
            write_lock: Mutex::new(()),
            _entry: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Missing, unreadable or malformed data is an empty list.
    pub fn load(&self) -> Vec<T> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return vec![],
            Err(e) => {
                warn!(storage_key = self.key.as_str(), error = ?e, "[History] Failed to read stored list");
                return vec![];
            },
        };
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(entries) => self.evict(entries, Utc::now()),
            Err(e) => {
                warn!(storage_key = self.key.as_str(), error = ?e, "[History] Stored list is malformed, treating as empty");
                vec![]
            },
        }
    }

    /// Prepend `entry` unless an entry with the same key is already stored. Returns whether
    /// the list changed.
    pub fn append(&self, entry: T) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load();
        let key = entry.dedup_key();
        if entries.iter().any(|existing| existing.dedup_key() == key) {
            return Ok(false);
        }
        entries.insert(0, entry);
        let entries = self.evict(entries, Utc::now());
        self.persist(&entries)?;
        Ok(true)
    }

    /// Apply `f` to the entry with `key`. Returns whether one was found.
    pub fn update<F>(&self, key: &str, f: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut T),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load();
        match entries.iter_mut().find(|entry| entry.dedup_key() == key) {
            Some(entry) => {
                f(entry);
                self.persist(&entries)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        HISTORY_CACHE_SIZE.with_label_values(&[&self.key]).set(0);
        self.store.remove(&self.key)
    }

    fn evict(&self, entries: Vec<T>, now: DateTime<Utc>) -> Vec<T> {
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(|entry| match (self.policy.ttl, entry.recorded_at()) {
                (Some(ttl), Some(at)) => now - at <= ttl,
                _ => true,
            })
            .filter(|entry| seen.insert(entry.dedup_key()))
            .take(self.policy.capacity)
            .collect()
    }

    fn persist(&self, entries: &[T]) -> Result<(), StorageError> {
        let serialized =
            serde_json::to_string(entries).map_err(|source| StorageError::Serialize {
                key: self.key.clone(),
                source,
            })?;
        self.store.set(&self.key, &serialized)?;
        HISTORY_CACHE_SIZE
            .with_label_values(&[&self.key])
            .set(entries.len() as i64);
        Ok(())
    }
}
