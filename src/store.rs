// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Append-only proof-record index.
//!
//! The orchestrator only ever appends complete records and reads them back
//! in insertion order, so the interface is deliberately narrow. Production
//! deployments can back it with a durable table; the in-memory
//! implementation serves single-process deployments and tests.

use std::sync::RwLock;

use chrono::NaiveDate;

use crate::models::ProofRecord;

/// Append-only, insertion-ordered store of proof records.
pub trait ProofStore: Send + Sync {
    /// Append a complete record. Appends are serialized: readers never
    /// observe a partially written record.
    fn append(&self, record: ProofRecord);

    /// All records, in insertion order.
    fn list_all(&self) -> Vec<ProofRecord>;

    /// Records whose date matches exactly, in insertion order.
    fn list_by_date(&self, date: NaiveDate) -> Vec<ProofRecord>;
}

/// In-memory record index.
#[derive(Default)]
pub struct InMemoryProofStore {
    records: RwLock<Vec<ProofRecord>>,
}

impl InMemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProofStore for InMemoryProofStore {
    fn append(&self, record: ProofRecord) {
        self.records
            .write()
            .expect("proof store lock poisoned")
            .push(record);
    }

    fn list_all(&self) -> Vec<ProofRecord> {
        self.records
            .read()
            .expect("proof store lock poisoned")
            .clone()
    }

    fn list_by_date(&self, date: NaiveDate) -> Vec<ProofRecord> {
        self.records
            .read()
            .expect("proof store lock poisoned")
            .iter()
            .filter(|record| record.date == date)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, date: &str) -> ProofRecord {
        ProofRecord {
            id: id.to_string(),
            date: date.parse().unwrap(),
            cid: format!("cid-{id}"),
            url: format!("https://gateway/ipfs/cid-{id}"),
            encrypted: false,
            nonce: None,
            data_hash: None,
            algorithm: None,
            size_bytes: 0,
            created_at: Utc::now(),
            key_source: None,
        }
    }

    #[test]
    fn list_all_preserves_insertion_order() {
        let store = InMemoryProofStore::new();
        store.append(record("a", "2024-01-01"));
        store.append(record("b", "2024-01-02"));
        store.append(record("c", "2024-01-01"));

        let ids: Vec<_> = store.list_all().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn list_by_date_filters_exactly() {
        let store = InMemoryProofStore::new();
        store.append(record("a", "2024-01-01"));
        store.append(record("b", "2024-01-02"));
        store.append(record("c", "2024-01-01"));

        let ids: Vec<_> = store
            .list_by_date("2024-01-01".parse().unwrap())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(store.list_by_date("2024-02-01".parse().unwrap()).is_empty());
    }

    #[test]
    fn concurrent_appends_are_all_visible() {
        let store = std::sync::Arc::new(InMemoryProofStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    store.append(record(&format!("{i}-{j}"), "2024-01-01"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.list_all().len(), 400);
    }
}
