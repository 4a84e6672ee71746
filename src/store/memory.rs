//! In-process store used by tests and short-lived tooling.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RegistrationRecord, RegistrationStore, RequestKey, StoreError};

/// Hash-map backed `RegistrationStore` with the same invariant checks as the
/// durable implementation.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    records: Mutex<HashMap<RequestKey, RegistrationRecord>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing classification. Used to set up
    /// recovery scenarios.
    pub async fn seed(&self, record: RegistrationRecord) -> Result<(), StoreError> {
        record.validate()?;
        self.records.lock().await.insert(record.key(), record);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn find(
        &self,
        url: &str,
        request_id: &str,
    ) -> Result<Option<RegistrationRecord>, StoreError> {
        let key = RequestKey {
            url: url.to_string(),
            request_id: request_id.to_string(),
        };
        Ok(self.records.lock().await.get(&key).cloned())
    }

    async fn insert(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        record.validate()?;
        let mut records = self.records.lock().await;
        let key = record.key();
        if records.contains_key(&key) {
            return Err(StoreError::Duplicate {
                url: key.url,
                request_id: key.request_id,
            });
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, record: &RegistrationRecord) -> Result<RegistrationRecord, StoreError> {
        record.validate()?;
        let mut records = self.records.lock().await;
        let key = record.key();
        let existing = records.get(&key).ok_or_else(|| StoreError::NotFound {
            url: key.url.clone(),
            request_id: key.request_id.clone(),
        })?;
        existing.allows_transition_to(record)?;
        records.insert(key, record.clone());
        Ok(record.clone())
    }

    async fn list_unfinished(&self) -> Result<Vec<RegistrationRecord>, StoreError> {
        let records = self.records.lock().await;
        let mut unfinished: Vec<_> = records
            .values()
            .filter(|record| !record.finished)
            .cloned()
            .collect();
        unfinished.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(unfinished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = MemoryRegistrationStore::new();
        let record = RegistrationRecord::new("https://example.com", "c1");
        store.insert(&record).await.unwrap();
        assert!(matches!(
            store.insert(&record).await,
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn update_returns_stored_version() {
        let store = MemoryRegistrationStore::new();
        let record = RegistrationRecord::new("https://example.com", "c1");
        store.insert(&record).await.unwrap();
        let next = record.with_resolved_name("example_com");
        let stored = store.update(&next).await.unwrap();
        assert_eq!(stored, next);
        assert_eq!(store.find("https://example.com", "c1").await.unwrap(), Some(next));
    }

    #[tokio::test]
    async fn update_rejects_flag_rewind() {
        let store = MemoryRegistrationStore::new();
        let record = RegistrationRecord::new("https://example.com", "c1").with_notified();
        store.seed(record.clone()).await.unwrap();
        let mut rewound = record;
        rewound.notified = false;
        assert!(matches!(
            store.update(&rewound).await,
            Err(StoreError::Invariant(_))
        ));
    }

    #[tokio::test]
    async fn unfinished_scan_skips_finished_records() {
        let store = MemoryRegistrationStore::new();
        store
            .seed(RegistrationRecord::new("https://a.example", "c1"))
            .await
            .unwrap();
        store
            .seed(RegistrationRecord::new("https://b.example", "c2").with_finished())
            .await
            .unwrap();
        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].url, "https://a.example");
    }
}
