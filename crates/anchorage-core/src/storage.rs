//! Injected persistence seams and their in-memory reference backends.
//!
//! Durable persistence is the host's concern. The core writes through
//! these traits and keeps its own in-memory state authoritative for
//! queries; the memory backends here power tests and embedded hosts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::config::RetentionPolicy;
use crate::error::StorageError;
use crate::overrides::PlacementOverride;
use crate::record::{DecisionAttempt, DecisionRecord};

/// Persistence seam for decision records and attempts.
pub trait DecisionStorage: Send + Sync {
    fn store_record(&self, record: &DecisionRecord) -> Result<(), StorageError>;
    fn store_attempt(&self, attempt: &DecisionAttempt) -> Result<(), StorageError>;
    fn load_records(&self) -> Result<Vec<DecisionRecord>, StorageError>;
    /// Remove expired records and attempts; returns how many were
    /// dropped.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<usize, StorageError>;
}

/// Persistence seam for overrides.
pub trait OverrideStorage: Send + Sync {
    fn store_override(&self, ov: &PlacementOverride) -> Result<(), StorageError>;
    fn delete_override(&self, id: &str) -> Result<(), StorageError>;
    fn load_overrides(&self) -> Result<Vec<PlacementOverride>, StorageError>;
}

/// In-memory decision storage.
#[derive(Default)]
pub struct MemoryDecisionStorage {
    records: Mutex<Vec<DecisionRecord>>,
    attempts: Mutex<Vec<DecisionAttempt>>,
    fail_writes: AtomicBool,
}

impl MemoryDecisionStorage {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail. Used to exercise storage
    /// error surfacing in tests.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Number of stored attempts.
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("backend in failure mode".into()));
        }
        Ok(())
    }
}

impl DecisionStorage for MemoryDecisionStorage {
    fn store_record(&self, record: &DecisionRecord) -> Result<(), StorageError> {
        self.check_writable()?;
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn store_attempt(&self, attempt: &DecisionAttempt) -> Result<(), StorageError> {
        self.check_writable()?;
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    fn load_records(&self) -> Result<Vec<DecisionRecord>, StorageError> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<usize, StorageError> {
        let mut removed = 0;

        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !r.is_expired_at(now));
        removed += before - records.len();
        drop(records);

        let attempt_cutoff = now - policy.attempt_ttl();
        let mut attempts = self.attempts.lock().unwrap();
        let before = attempts.len();
        attempts.retain(|a| a.started_at > attempt_cutoff);
        removed += before - attempts.len();

        Ok(removed)
    }
}

/// In-memory override storage.
#[derive(Default)]
pub struct MemoryOverrideStorage {
    overrides: Mutex<HashMap<String, PlacementOverride>>,
}

impl MemoryOverrideStorage {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored overrides.
    pub fn count(&self) -> usize {
        self.overrides.lock().unwrap().len()
    }
}

impl OverrideStorage for MemoryOverrideStorage {
    fn store_override(&self, ov: &PlacementOverride) -> Result<(), StorageError> {
        self.overrides
            .lock()
            .unwrap()
            .insert(ov.id.clone(), ov.clone());
        Ok(())
    }

    fn delete_override(&self, id: &str) -> Result<(), StorageError> {
        if self.overrides.lock().unwrap().remove(id).is_none() {
            return Err(StorageError::NotFound(format!("override '{}'", id)));
        }
        Ok(())
    }

    fn load_overrides(&self) -> Result<Vec<PlacementOverride>, StorageError> {
        Ok(self.overrides.lock().unwrap().values().cloned().collect())
    }
}
