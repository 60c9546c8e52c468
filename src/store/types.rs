use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

/// Identifies one client connection to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write the store performs on behalf of a connection once it drops
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectAction {
    Set(Value),
    Remove,
}

/// What a transaction closure decided to do with the value it was shown
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionDecision {
    /// Replace the value; `None` deletes it
    Commit(Option<Value>),
    /// Leave the value untouched
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub committed: bool,
    /// Value at the path after the transaction
    pub snapshot: Option<Value>,
}

/// An atomic multi-path write. Each entry sets or removes one path.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    entries: Vec<(String, Option<Value>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.entries.push((path.into(), Some(value)));
        self
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.entries.push((path.into(), None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(String, Option<Value>)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(String, Option<Value>)> {
        self.entries
    }
}

/// A live "on value changed" listener for one path.
///
/// The first item is the value at subscription time; after that one item is
/// delivered per distinct change. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct StoreSubscription {
    path: String,
    receiver: mpsc::UnboundedReceiver<Option<Value>>,
}

impl StoreSubscription {
    pub(crate) fn new(path: String, receiver: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Self { path, receiver }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next value at the path. `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.receiver.recv().await
    }
}
