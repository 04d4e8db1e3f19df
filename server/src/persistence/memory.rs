use super::{Record, Store, StoreError};
use std::sync::{Arc, Mutex};

/// In-process store. Clones share the same record log, so a test can keep
/// one handle while the worker owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Record>,
    failing: bool,
    failures: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write.
    pub fn failing() -> Self {
        let store = Self::new();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing = failing;
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.inner
            .lock()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }

    pub fn failures(&self) -> usize {
        self.inner.lock().map(|inner| inner.failures).unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn apply(&mut self, record: &Record) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;

        if inner.failing {
            inner.failures += 1;
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        inner.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> Record {
        Record::UpdateUserStats {
            user_id: "p1".to_string(),
            score_gained: 150,
            won: true,
        }
    }

    #[test]
    fn test_clones_share_records() {
        let store = MemoryStore::new();
        let mut writer = store.clone();

        writer.apply(&stats()).unwrap();
        assert_eq!(store.records(), vec![stats()]);
    }

    #[test]
    fn test_failing_store_counts_failures() {
        let mut store = MemoryStore::failing();
        assert!(store.apply(&stats()).is_err());

        store.set_failing(false);
        assert!(store.apply(&stats()).is_ok());
        assert_eq!(store.failures(), 1);
        assert_eq!(store.records().len(), 1);
    }
}
