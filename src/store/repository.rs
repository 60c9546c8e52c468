use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::path::{overlaps, segments};
use super::types::{
    ConnectionId, DisconnectAction, StoreSubscription, TransactionDecision, TransactionOutcome,
    WriteBatch,
};
use crate::shared::AppError;

/// Trait for the shared realtime store every client talks to
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Opens a connection; disconnect hooks are scoped to it
    async fn connect(&self) -> Result<ConnectionId, AppError>;

    /// Drops a connection, running every disconnect hook it registered
    async fn disconnect(&self, connection: ConnectionId) -> Result<(), AppError>;

    async fn get(&self, path: &str) -> Result<Option<Value>, AppError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), AppError>;

    async fn remove(&self, path: &str) -> Result<(), AppError>;

    /// Applies every entry of the batch atomically
    async fn update(&self, batch: WriteBatch) -> Result<(), AppError>;

    /// Compare-and-swap: `update` sees the current value and decides the new one
    /// while no other write can interleave
    async fn transaction(
        &self,
        path: &str,
        update: &mut (dyn FnMut(Option<Value>) -> TransactionDecision + Send),
    ) -> Result<TransactionOutcome, AppError>;

    async fn subscribe(&self, path: &str) -> Result<StoreSubscription, AppError>;

    /// Registers a write to run when `connection` drops. Replaces any earlier
    /// hook the same connection registered for `path`.
    async fn on_disconnect(
        &self,
        connection: ConnectionId,
        path: &str,
        action: DisconnectAction,
    ) -> Result<(), AppError>;

    async fn cancel_on_disconnect(
        &self,
        connection: ConnectionId,
        path: &str,
    ) -> Result<(), AppError>;

    async fn cancel_all_on_disconnect(&self, connection: ConnectionId) -> Result<(), AppError>;
}

struct Subscriber {
    path: String,
    sender: mpsc::UnboundedSender<Option<Value>>,
}

struct StoreInner {
    root: Value,
    subscribers: Vec<Subscriber>,
    connections: HashSet<ConnectionId>,
    disconnect_hooks: HashMap<ConnectionId, Vec<(String, DisconnectAction)>>,
    next_connection: u64,
}

/// In-memory implementation of RealtimeStore for development and testing
pub struct InMemoryRealtimeStore {
    inner: Mutex<StoreInner>,
}

impl Default for InMemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRealtimeStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                connections: HashSet::new(),
                disconnect_hooks: HashMap::new(),
                next_connection: 1,
            }),
        }
    }

    /// Number of hooks a connection currently has armed
    pub fn pending_disconnect_hooks(&self, connection: ConnectionId) -> usize {
        self.lock()
            .map(|inner| {
                inner
                    .disconnect_hooks
                    .get(&connection)
                    .map_or(0, |hooks| hooks.len())
            })
            .unwrap_or(0)
    }

    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.lock()
            .map(|inner| inner.connections.contains(&connection))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Store("store lock poisoned".to_string()))
    }
}

fn checked_segments(path: &str) -> Result<Vec<&str>, AppError> {
    let segs = segments(path);
    if segs.is_empty() {
        return Err(AppError::Store("cannot write the store root".to_string()));
    }
    Ok(segs)
}

fn value_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = node.as_object()?.get(*seg)?;
    }
    Some(node)
}

/// Drops nulls and empty objects; returns `None` when nothing is left
fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other),
    }
}

fn is_empty_node(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

/// Writes `value` at `segs` below `node`, pruning objects left empty
fn write_at(node: &mut Value, segs: &[&str], value: Option<Value>) {
    let Some((head, rest)) = segs.split_first() else {
        return;
    };

    if !node.is_object() {
        if value.is_none() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() {
        match value.and_then(normalize) {
            Some(v) => {
                map.insert(head.to_string(), v);
            }
            None => {
                map.remove(*head);
            }
        }
        return;
    }

    if value.is_none() && !map.contains_key(*head) {
        return;
    }
    let child = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    write_at(child, rest, value);
    if is_empty_node(child) {
        map.remove(*head);
    }
}

impl StoreInner {
    /// Applies writes and notifies every subscriber whose value changed
    fn apply(&mut self, writes: Vec<(String, Option<Value>)>) -> Result<(), AppError> {
        let touched: Vec<String> = writes.iter().map(|(p, _)| p.clone()).collect();
        let before: Vec<(usize, Option<Value>)> = self
            .subscribers
            .iter()
            .enumerate()
            .filter(|(_, s)| touched.iter().any(|t| overlaps(t, &s.path)))
            .map(|(i, s)| (i, value_at(&self.root, &segments(&s.path)).cloned()))
            .collect();

        for (path, value) in writes {
            let segs = checked_segments(&path)?;
            write_at(&mut self.root, &segs, value);
        }

        let mut closed = Vec::new();
        for (index, old) in before {
            let subscriber = &self.subscribers[index];
            let new = value_at(&self.root, &segments(&subscriber.path)).cloned();
            if new != old && subscriber.sender.send(new).is_err() {
                closed.push(index);
            }
        }
        if !closed.is_empty() {
            let mut index = 0;
            self.subscribers.retain(|_| {
                let keep = !closed.contains(&index);
                index += 1;
                keep
            });
            debug!(removed = closed.len(), "Pruned dropped subscriptions");
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeStore for InMemoryRealtimeStore {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<ConnectionId, AppError> {
        let mut inner = self.lock()?;
        let connection = ConnectionId(inner.next_connection);
        inner.next_connection += 1;
        inner.connections.insert(connection);
        debug!(connection = %connection, "Connection opened");
        Ok(connection)
    }

    #[instrument(skip(self))]
    async fn disconnect(&self, connection: ConnectionId) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !inner.connections.remove(&connection) {
            debug!(connection = %connection, "Connection already closed");
            return Ok(());
        }

        let hooks = inner
            .disconnect_hooks
            .remove(&connection)
            .unwrap_or_default();
        info!(
            connection = %connection,
            hook_count = hooks.len(),
            "Connection dropped, running disconnect hooks"
        );

        let writes = hooks
            .into_iter()
            .map(|(path, action)| match action {
                DisconnectAction::Set(value) => (path, Some(value)),
                DisconnectAction::Remove => (path, None),
            })
            .collect();
        inner.apply(writes)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, AppError> {
        let inner = self.lock()?;
        Ok(value_at(&inner.root, &segments(path)).cloned())
    }

    #[instrument(skip(self, value))]
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError> {
        debug!(path = %path, "Setting value");
        checked_segments(path)?;
        self.lock()?.apply(vec![(path.to_string(), Some(value))])
    }

    #[instrument(skip(self))]
    async fn remove(&self, path: &str) -> Result<(), AppError> {
        debug!(path = %path, "Removing value");
        checked_segments(path)?;
        self.lock()?.apply(vec![(path.to_string(), None)])
    }

    #[instrument(skip(self, batch), fields(entries = batch.len()))]
    async fn update(&self, batch: WriteBatch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }
        for (path, _) in batch.entries() {
            checked_segments(path)?;
        }
        self.lock()?.apply(batch.into_entries())
    }

    #[instrument(skip(self, update))]
    async fn transaction(
        &self,
        path: &str,
        update: &mut (dyn FnMut(Option<Value>) -> TransactionDecision + Send),
    ) -> Result<TransactionOutcome, AppError> {
        let segs = checked_segments(path)?;
        let mut inner = self.lock()?;
        let current = value_at(&inner.root, &segs).cloned();

        match update(current.clone()) {
            TransactionDecision::Abort => {
                debug!(path = %path, "Transaction aborted");
                Ok(TransactionOutcome {
                    committed: false,
                    snapshot: current,
                })
            }
            TransactionDecision::Commit(value) => {
                inner.apply(vec![(path.to_string(), value)])?;
                debug!(path = %path, "Transaction committed");
                Ok(TransactionOutcome {
                    committed: true,
                    snapshot: value_at(&inner.root, &segs).cloned(),
                })
            }
        }
    }

    async fn subscribe(&self, path: &str) -> Result<StoreSubscription, AppError> {
        let mut inner = self.lock()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let current = value_at(&inner.root, &segments(path)).cloned();
        // receiver is held locally, the initial send cannot fail
        let _ = sender.send(current);
        inner.subscribers.push(Subscriber {
            path: path.to_string(),
            sender,
        });
        debug!(path = %path, subscribers = inner.subscribers.len(), "Subscribed");
        Ok(StoreSubscription::new(path.to_string(), receiver))
    }

    async fn on_disconnect(
        &self,
        connection: ConnectionId,
        path: &str,
        action: DisconnectAction,
    ) -> Result<(), AppError> {
        checked_segments(path)?;
        let mut inner = self.lock()?;
        if !inner.connections.contains(&connection) {
            warn!(connection = %connection, path = %path, "Hook registered on closed connection");
            return Err(AppError::Connectivity(format!(
                "connection {connection} is not open"
            )));
        }
        let hooks = inner.disconnect_hooks.entry(connection).or_default();
        hooks.retain(|(p, _)| p != path);
        hooks.push((path.to_string(), action));
        debug!(connection = %connection, path = %path, "Disconnect hook registered");
        Ok(())
    }

    async fn cancel_on_disconnect(
        &self,
        connection: ConnectionId,
        path: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(hooks) = inner.disconnect_hooks.get_mut(&connection) {
            hooks.retain(|(p, _)| p != path);
        }
        debug!(connection = %connection, path = %path, "Disconnect hook cancelled");
        Ok(())
    }

    async fn cancel_all_on_disconnect(&self, connection: ConnectionId) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let cancelled = inner
            .disconnect_hooks
            .remove(&connection)
            .map_or(0, |hooks| hooks.len());
        debug!(connection = %connection, cancelled, "All disconnect hooks cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get_nested() {
        let store = InMemoryRealtimeStore::new();
        store
            .set("rooms/ABC/meta", json!({"status": "waiting", "maxPlayers": 4}))
            .await
            .unwrap();

        assert_eq!(
            store.get("rooms/ABC/meta/status").await.unwrap(),
            Some(json!("waiting"))
        );
        assert_eq!(
            store.get("rooms/ABC").await.unwrap(),
            Some(json!({"meta": {"status": "waiting", "maxPlayers": 4}}))
        );
        assert_eq!(store.get("rooms/XYZ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_parents() {
        let store = InMemoryRealtimeStore::new();
        store.set("rooms/ABC/players/p1/name", json!("Ann")).await.unwrap();
        store.remove("rooms/ABC/players/p1").await.unwrap();

        assert_eq!(store.get("rooms/ABC").await.unwrap(), None);
        assert_eq!(store.get("rooms").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_null_and_empty_objects_are_not_stored() {
        let store = InMemoryRealtimeStore::new();
        store
            .set("rooms/ABC", json!({"meta": {"config": {}, "closedReason": null, "round": 1}}))
            .await
            .unwrap();

        assert_eq!(
            store.get("rooms/ABC").await.unwrap(),
            Some(json!({"meta": {"round": 1}}))
        );
    }

    #[tokio::test]
    async fn test_update_is_atomic_for_subscribers() {
        let store = InMemoryRealtimeStore::new();
        store.set("rooms/ABC/meta/status", json!("waiting")).await.unwrap();
        let mut sub = store.subscribe("rooms/ABC").await.unwrap();
        let _initial = sub.next().await.unwrap();

        store
            .update(
                WriteBatch::new()
                    .set("rooms/ABC/meta/status", json!("playing"))
                    .set("rooms/ABC/gameData/data", json!([1, 2, 3])),
            )
            .await
            .unwrap();

        let value = sub.next().await.unwrap().unwrap();
        assert_eq!(value["meta"]["status"], json!("playing"));
        assert_eq!(value["gameData"]["data"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_value_then_changes() {
        let store = InMemoryRealtimeStore::new();
        let mut sub = store.subscribe("rooms/ABC/meta/status").await.unwrap();
        assert_eq!(sub.next().await.unwrap(), None);

        store.set("rooms/ABC/meta/status", json!("waiting")).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Some(json!("waiting")));

        // unrelated writes do not wake the subscriber
        store.set("rooms/ABC/players/p1/score", json!(5)).await.unwrap();
        store.set("rooms/ABC/meta/status", json!("playing")).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Some(json!("playing")));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = InMemoryRealtimeStore::new();
        let sub = store.subscribe("rooms/ABC").await.unwrap();
        drop(sub);

        store.set("rooms/ABC/meta/status", json!("waiting")).await.unwrap();
        assert!(store.lock().unwrap().subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_commit_and_abort() {
        let store = InMemoryRealtimeStore::new();

        let outcome = store
            .transaction("counters/a", &mut |current: Option<Value>| {
                let next = current.and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                TransactionDecision::Commit(Some(json!(next)))
            })
            .await
            .unwrap();
        assert!(outcome.committed);
        assert_eq!(outcome.snapshot, Some(json!(1)));

        let outcome = store
            .transaction("counters/a", &mut |_: Option<Value>| {
                TransactionDecision::Abort
            })
            .await
            .unwrap();
        assert!(!outcome.committed);
        assert_eq!(store.get("counters/a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_transaction_commit_none_deletes() {
        let store = InMemoryRealtimeStore::new();
        store.set("rooms/ABC/meta/status", json!("ended")).await.unwrap();

        store
            .transaction("rooms/ABC", &mut |_: Option<Value>| {
                TransactionDecision::Commit(None)
            })
            .await
            .unwrap();

        assert_eq!(store.get("rooms/ABC").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disconnect_runs_hooks() {
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect().await.unwrap();
        store.set("rooms/ABC/players/p1/online", json!(true)).await.unwrap();
        store.set("rooms/ABC/players/p2/online", json!(true)).await.unwrap();

        store
            .on_disconnect(
                conn,
                "rooms/ABC/players/p1/online",
                DisconnectAction::Set(json!(false)),
            )
            .await
            .unwrap();
        store
            .on_disconnect(conn, "rooms/ABC/players/p2", DisconnectAction::Remove)
            .await
            .unwrap();
        assert_eq!(store.pending_disconnect_hooks(conn), 2);

        store.disconnect(conn).await.unwrap();

        assert!(!store.is_connected(conn));
        assert_eq!(
            store.get("rooms/ABC/players/p1/online").await.unwrap(),
            Some(json!(false))
        );
        assert_eq!(store.get("rooms/ABC/players/p2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_hooks_do_not_fire() {
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect().await.unwrap();
        store.set("rooms/ABC/players/p1/online", json!(true)).await.unwrap();

        store
            .on_disconnect(
                conn,
                "rooms/ABC/players/p1/online",
                DisconnectAction::Set(json!(false)),
            )
            .await
            .unwrap();
        store.cancel_all_on_disconnect(conn).await.unwrap();
        store.disconnect(conn).await.unwrap();

        assert_eq!(
            store.get("rooms/ABC/players/p1/online").await.unwrap(),
            Some(json!(true))
        );
    }

    #[tokio::test]
    async fn test_hook_on_closed_connection_is_rejected() {
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect().await.unwrap();
        store.disconnect(conn).await.unwrap();

        let result = store
            .on_disconnect(conn, "rooms/ABC/x", DisconnectAction::Remove)
            .await;
        assert!(matches!(result, Err(AppError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_root_writes_are_rejected() {
        let store = InMemoryRealtimeStore::new();
        assert!(matches!(
            store.set("", json!(1)).await,
            Err(AppError::Store(_))
        ));
    }
}
