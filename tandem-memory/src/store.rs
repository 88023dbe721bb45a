use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, LazyLock, Mutex, PoisonError},
};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type Table = BTreeMap<String, String>;

// Stores stay registered until `MemoryStore::close`
static STORES: LazyLock<Mutex<HashMap<String, MemoryStore>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

pub(crate) struct StoreState {
    pub(crate) table: Table,
    pub(crate) online: bool,
    pub(crate) commits: u64,
}

/// Named key/value table shared by every participant connected to it.
///
/// Only committed data is stored here, pending writes live in the transactions.
#[derive(Clone)]
pub struct MemoryStore {
    name: Arc<str>,
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    /// Creates a store that is not registered, only reachable through this handle.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(StoreState {
                table: Table::new(),
                online: true,
                commits: 0,
            })),
        }
    }

    /// Returns the store registered as `name`, creating it if missing.
    pub fn open(name: &str) -> Self {
        let mut stores = STORES.lock().unwrap_or_else(PoisonError::into_inner);
        stores
            .entry(name.to_string())
            .or_insert_with(|| {
                log::trace!("Creating memory store `{}`", name);
                MemoryStore::new(name)
            })
            .clone()
    }

    /// Unregisters the store named `name`, returns false if it was not registered.
    ///
    /// Handles already obtained keep working on the old data, the next `open`
    /// creates an empty store.
    pub fn close(name: &str) -> bool {
        let mut stores = STORES.lock().unwrap_or_else(PoisonError::into_inner);
        let closed = stores.remove(name).is_some();
        if closed {
            log::trace!("Closing memory store `{}`", name);
        }
        closed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Committed value of `key`.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.state.read().await.table.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.table.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.table.is_empty()
    }

    /// Copy of the committed data.
    pub async fn snapshot(&self) -> Table {
        self.state.read().await.table.clone()
    }

    /// Number of transactions committed so far.
    pub async fn commits(&self) -> u64 {
        self.state.read().await.commits
    }

    /// Takes the store offline: beginning and committing transactions fails until `start`.
    pub async fn shutdown(&self) {
        self.state.write().await.online = false;
    }

    pub async fn start(&self) {
        self.state.write().await.online = true;
    }

    pub async fn is_online(&self) -> bool {
        self.state.read().await.online
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().await
    }
}
