//! In-memory document store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{DocumentStore, SaveReceipt};
use crate::error::{AutosaveError, Result};
use crate::handle::DocumentHandle;

/// A persist request as received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub handle: DocumentHandle,
    pub content: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    latest: HashMap<DocumentHandle, (u64, Vec<u8>)>,
    requests: Vec<SaveRequest>,
    fail_next: usize,
    failures: usize,
}

/// Store that keeps everything in memory and records every request.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every save by `latency` before it completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` requests fail with a remote error.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Total persist requests received, including failed ones.
    pub fn save_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn save_count_for(&self, handle: &DocumentHandle) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| &r.handle == handle)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.lock().failures
    }

    pub fn requests(&self) -> Vec<SaveRequest> {
        self.lock().requests.clone()
    }

    /// Latest successfully saved revision and content for `handle`.
    pub fn latest(&self, handle: &DocumentHandle) -> Option<(u64, Vec<u8>)> {
        self.lock().latest.get(handle).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn save(&self, handle: &DocumentHandle, content: Vec<u8>) -> Result<SaveReceipt> {
        let should_fail = {
            let mut inner = self.lock();
            inner.requests.push(SaveRequest {
                handle: handle.clone(),
                content: content.clone(),
            });
            if inner.fail_next > 0 {
                inner.fail_next -= 1;
                inner.failures += 1;
                true
            } else {
                false
            }
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if should_fail {
            return Err(AutosaveError::Remote {
                message: "injected failure".into(),
            });
        }

        let mut inner = self.lock();
        let revision = inner.latest.get(handle).map_or(1, |(rev, _)| rev + 1);
        let receipt = SaveReceipt::new(handle.clone(), revision, &content);
        inner.latest.insert(handle.clone(), (revision, content));
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> DocumentHandle {
        DocumentHandle::new("doc-1").unwrap()
    }

    #[tokio::test]
    async fn test_revisions_increase_per_handle() {
        let store = MemoryStore::new();
        let first = store.save(&handle(), b"a".to_vec()).await.unwrap();
        let second = store.save(&handle(), b"ab".to_vec()).await.unwrap();

        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(second.bytes, 2);
        assert_eq!(store.latest(&handle()), Some((2, b"ab".to_vec())));
    }

    #[tokio::test]
    async fn test_injected_failure_is_logged_but_not_stored() {
        let store = MemoryStore::new();
        store.fail_next(1);

        let result = store.save(&handle(), b"lost".to_vec()).await;
        assert!(matches!(result, Err(AutosaveError::Remote { .. })));
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.failure_count(), 1);
        assert!(store.latest(&handle()).is_none());

        store.save(&handle(), b"kept".to_vec()).await.unwrap();
        assert_eq!(store.latest(&handle()), Some((1, b"kept".to_vec())));
    }
}
