use crate::{IsolationLevel, MemoryStore, MemoryTransaction};
use std::{borrow::Cow, collections::HashSet, env};
use tandem_core::{
    CommitObservers, Context, Error, Operation, Participant, Result, TransactionError,
};
use url::Url;
use urlencoding::decode;
use uuid::Uuid;

/// Participant over a `MemoryStore`, configured through a url like
/// `memory://orders?isolation=serializable`.
///
/// When the url has no `isolation` parameter the `TANDEM_MEMORY_ISOLATION`
/// environment variable is used, `ReadCommitted` otherwise.
pub struct MemoryParticipant {
    store_name: String,
    isolation: IsolationLevel,
    connection: Option<MemoryStore>,
    transaction: Option<MemoryTransaction>,
    observers: CommitObservers,
    fail_next: HashSet<Operation>,
}

impl MemoryParticipant {
    pub const NAME: &'static str = "memory";

    /// Parses the url, the store is opened on `prepare`.
    pub async fn connect(url: Cow<'static, str>) -> Result<MemoryParticipant> {
        let context = || format!("While trying to connect to `{}`", url);
        let decoded = decode(&url).with_context(context)?;
        let prefix = format!("{}://", Self::NAME);
        if !decoded.starts_with(&prefix) {
            let error = Error::msg(format!(
                "Memory connection url must start with `{}`",
                &prefix
            ))
            .context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        let parsed = Url::parse(&decoded).with_context(context)?;
        let Some(store_name) = parsed.host_str().filter(|v| !v.is_empty()) else {
            let error = Error::msg("Memory connection url must name a store").context(context());
            log::error!("{:#}", error);
            return Err(error);
        };
        let isolation = parsed
            .query_pairs()
            .find(|(k, _)| k == "isolation")
            .map(|(_, v)| v.into_owned())
            .or_else(|| env::var("TANDEM_MEMORY_ISOLATION").ok());
        let isolation = match isolation {
            Some(value) => value.parse().with_context(context)?,
            None => IsolationLevel::default(),
        };
        Ok(Self {
            store_name: store_name.to_string(),
            isolation,
            connection: None,
            transaction: None,
            observers: CommitObservers::new(),
            fail_next: HashSet::new(),
        })
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// The store, once the connection was opened by `prepare`.
    pub fn store(&self) -> Option<&MemoryStore> {
        self.connection.as_ref()
    }

    pub fn transaction_id(&self) -> Option<Uuid> {
        self.transaction.as_ref().map(|t| t.id)
    }

    /// Number of keys written or removed by the open transaction.
    pub fn pending(&self) -> usize {
        self.transaction.as_ref().map_or(0, |t| t.pending())
    }

    /// Value of `key` as seen by the open transaction.
    pub async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let (Some(store), Some(transaction)) = (&self.connection, &mut self.transaction) else {
            return Err(no_transaction());
        };
        Ok(transaction.get(store, key).await)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let transaction = self.transaction.as_mut().ok_or_else(no_transaction)?;
        transaction.put(key.into(), value.into());
        Ok(())
    }

    pub fn remove(&mut self, key: impl Into<String>) -> Result<()> {
        let transaction = self.transaction.as_mut().ok_or_else(no_transaction)?;
        transaction.remove(key.into());
        Ok(())
    }

    /// The next call of `operation` fails without touching the store.
    pub fn fail_next(&mut self, operation: Operation) {
        self.fail_next.insert(operation);
    }

    fn injected_failure(&mut self, operation: Operation) -> Result<()> {
        if !self.fail_next.remove(&operation) {
            return Ok(());
        }
        let error = Error::msg(format!(
            "Injected {} failure on `{}`",
            operation, self.store_name
        ))
        .context(TransactionError::Failed(
            format!("Failed to {}", operation).into(),
        ));
        log::error!("{:#}", error);
        Err(error)
    }
}

impl Participant for MemoryParticipant {
    async fn prepare(&mut self) -> Result<()> {
        self.injected_failure(Operation::Prepare)?;
        let store = self
            .connection
            .get_or_insert_with(|| MemoryStore::open(&self.store_name));
        match MemoryTransaction::begin(store, self.isolation).await {
            Ok(transaction) => {
                self.transaction = Some(transaction);
                Ok(())
            }
            Err(e) => {
                let error = e.context(TransactionError::Failed("Failed to Prepare".into()));
                log::error!("{:#}", error);
                Err(error)
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.injected_failure(Operation::Commit)?;
        let (Some(store), Some(transaction)) = (&self.connection, self.transaction.take()) else {
            return Err(Error::new(TransactionError::Failed(
                "No transaction to commit".into(),
            )));
        };
        if let Err(e) = transaction.commit(store).await {
            let error = e.context(TransactionError::Failed("Failed to Commit".into()));
            log::error!("{:#}", error);
            return Err(error);
        }
        self.observers.notify();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.injected_failure(Operation::Rollback)?;
        let Some(transaction) = self.transaction.take() else {
            return Err(Error::new(TransactionError::Disposed(
                "Memory transaction".into(),
            )));
        };
        log::trace!("RollbackTransaction {}", transaction.id);
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        let result = self.injected_failure(Operation::Abort);
        self.transaction = None;
        result
    }

    async fn clean(&mut self) {
        self.transaction = None;
        self.connection = None;
    }

    fn trace_transaction(&self) -> String {
        match &self.transaction {
            Some(transaction) => format!(
                "Transaction {} isolationLevel={}",
                transaction.id, transaction.isolation
            ),
            None => format!("Transaction none isolationLevel={}", self.isolation),
        }
    }

    fn commit_observers(&mut self) -> &mut CommitObservers {
        &mut self.observers
    }
}

fn no_transaction() -> Error {
    Error::new(TransactionError::InvalidOperation(
        "No memory transaction is open, prepare the participant first".into(),
    ))
}
