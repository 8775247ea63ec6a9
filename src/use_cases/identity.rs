// C3: Identity Registry. Process-wide name -> (transport, token, pending
// back flag) mapping, guarded by a single mutex (spec.md §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::slot::DETACHED;

#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub name: String,
    /// Connection-set id of the current transport, or `DETACHED`.
    pub transport: u64,
    /// 0 means "never assigned a transport yet".
    pub token: u64,
    pub pending_back: bool,
}

impl IdentityRecord {
    fn new(name: String) -> Self {
        IdentityRecord {
            name,
            transport: DETACHED,
            token: 0,
            pending_back: false,
        }
    }
}

#[derive(Debug)]
pub enum RegistryError {
    Full,
}

/// Global registry of reserved player names. The token sequence is the
/// single source of "which reattach wins" ordering across the whole
/// server (spec.md §4.3, §5).
pub struct IdentityRegistry {
    max_records: usize,
    records: Mutex<HashMap<String, IdentityRecord>>,
    token_seq: AtomicU64,
}

impl IdentityRegistry {
    pub fn new(max_records: usize) -> Self {
        IdentityRegistry {
            max_records,
            records: Mutex::new(HashMap::new()),
            token_seq: AtomicU64::new(0),
        }
    }

    pub async fn has(&self, name: &str) -> bool {
        self.records.lock().await.contains_key(name)
    }

    pub async fn add(&self, name: &str) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        if records.len() >= self.max_records && !records.contains_key(name) {
            return Err(RegistryError::Full);
        }
        records
            .entry(name.to_string())
            .or_insert_with(|| IdentityRecord::new(name.to_string()));
        Ok(())
    }

    /// Sets the record's transport, assigns it a fresh strictly-increasing
    /// token, and returns that token. Returns 0 (never emitted by a real
    /// assignment) if the name is not registered.
    pub async fn set_transport(&self, name: &str, handle: u64) -> u64 {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(name) else {
            return 0;
        };
        // Sequence starts at 1 so 0 stays reserved for "never assigned".
        let token = self.token_seq.fetch_add(1, Ordering::SeqCst) + 1;
        record.transport = handle;
        record.token = token;
        token
    }

    pub async fn remove(&self, name: &str) {
        self.records.lock().await.remove(name);
    }

    /// Removes the record only if its current token still matches `token`.
    /// This is the only path a session's own exit uses, so a stale session
    /// can never evict a reconnected successor (spec.md §3, §4.3).
    pub async fn remove_if_token(&self, name: &str, token: u64) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get(name) {
            if record.token == token {
                records.remove(name);
            } else {
                debug!(name, record_token = record.token, stale_token = token, "stale remove ignored");
            }
        }
    }

    /// Sets the pending-back flag. If `handle` is non-negative-equivalent
    /// (i.e. not `DETACHED`), the record's current transport must match it.
    pub async fn mark_back(&self, name: &str, handle: u64) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(name) {
            if handle == DETACHED || record.transport == handle {
                record.pending_back = true;
            }
        }
    }

    /// Test-and-clear the pending-back flag.
    pub async fn take_back(&self, name: &str, handle: u64) -> bool {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(name) else {
            return false;
        };
        if handle != DETACHED && record.transport != handle {
            return false;
        }
        std::mem::replace(&mut record.pending_back, false)
    }

    pub async fn transport_of(&self, name: &str) -> Option<u64> {
        self.records.lock().await.get(name).map(|r| r.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_strictly_increase_for_the_same_name() {
        let registry = IdentityRegistry::new(16);
        registry.add("alice").await.unwrap();
        let t1 = registry.set_transport("alice", 1).await;
        let t2 = registry.set_transport("alice", 2).await;
        assert!(t1 > 0);
        assert!(t2 > t1);
    }

    #[tokio::test]
    async fn remove_if_token_ignores_stale_token() {
        let registry = IdentityRegistry::new(16);
        registry.add("alice").await.unwrap();
        let stale = registry.set_transport("alice", 1).await;
        let _fresh = registry.set_transport("alice", 2).await;
        registry.remove_if_token("alice", stale).await;
        assert!(registry.has("alice").await, "stale token must not evict the record");
    }

    #[tokio::test]
    async fn remove_if_token_removes_on_matching_token() {
        let registry = IdentityRegistry::new(16);
        registry.add("alice").await.unwrap();
        let token = registry.set_transport("alice", 1).await;
        registry.remove_if_token("alice", token).await;
        assert!(!registry.has("alice").await);
    }

    #[tokio::test]
    async fn registry_rejects_beyond_capacity() {
        let registry = IdentityRegistry::new(1);
        registry.add("alice").await.unwrap();
        assert!(matches!(registry.add("bob").await, Err(RegistryError::Full)));
    }
}
