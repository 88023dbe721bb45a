use crate::{IsolationLevel, MemoryStore, Table};
use std::collections::{BTreeMap, BTreeSet};
use tandem_core::{Error, Result};
use uuid::Uuid;

/// Pending changes of one transaction over a `MemoryStore`.
pub(crate) struct MemoryTransaction {
    pub(crate) id: Uuid,
    pub(crate) isolation: IsolationLevel,
    snapshot: Option<Table>,
    reads: BTreeSet<String>,
    // None means removed
    writes: BTreeMap<String, Option<String>>,
}

impl MemoryTransaction {
    pub(crate) async fn begin(store: &MemoryStore, isolation: IsolationLevel) -> Result<Self> {
        let state = store.read().await;
        if !state.online {
            return Err(Error::msg(format!(
                "Memory store `{}` is offline",
                store.name()
            )));
        }
        let result = Self {
            id: Uuid::new_v4(),
            isolation,
            snapshot: isolation.uses_snapshot().then(|| state.table.clone()),
            reads: Default::default(),
            writes: Default::default(),
        };
        log::trace!(
            "BeginTransaction {}, isolationLevel={}",
            result.id,
            result.isolation
        );
        Ok(result)
    }

    pub(crate) async fn get(&mut self, store: &MemoryStore, key: &str) -> Option<String> {
        if let Some(value) = self.writes.get(key) {
            return value.clone();
        }
        if self.isolation == IsolationLevel::Serializable {
            self.reads.insert(key.to_string());
        }
        match &self.snapshot {
            Some(snapshot) => snapshot.get(key).cloned(),
            None => store.get(key).await,
        }
    }

    pub(crate) fn put(&mut self, key: String, value: String) {
        self.writes.insert(key, Some(value));
    }

    pub(crate) fn remove(&mut self, key: String) {
        self.writes.insert(key, None);
    }

    pub(crate) fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Applies the writes atomically.
    pub(crate) async fn commit(self, store: &MemoryStore) -> Result<()> {
        let mut state = store.write().await;
        if !state.online {
            return Err(Error::msg(format!(
                "Memory store `{}` is offline",
                store.name()
            )));
        }
        if self.isolation == IsolationLevel::Serializable
            && let Some(snapshot) = &self.snapshot
            && let Some(key) = self
                .reads
                .iter()
                .chain(self.writes.keys())
                .find(|k| state.table.get(*k) != snapshot.get(*k))
        {
            return Err(Error::msg(format!(
                "Serialization failure on key `{}`, it was changed by a concurrent transaction",
                key
            )));
        }
        for (key, value) in self.writes {
            match value {
                Some(value) => state.table.insert(key, value),
                None => state.table.remove(&key),
            };
        }
        state.commits += 1;
        log::trace!("CommitTransaction {}", self.id);
        Ok(())
    }
}
