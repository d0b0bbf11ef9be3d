//! Cross-context claim synchronization.
//!
//! A `SyncChannel` is one context's handle on the shared claim state. The
//! durable store is the source of truth; a shared `tokio::sync::broadcast`
//! sender is the best-effort low-latency path between live contexts. When
//! no broadcast path exists, a storage-poll fallback gives cross-context
//! subscribers the same at-least-once delivery, deduplicated by update id.
//!
//! Same-context subscribers are invoked synchronously inside `publish`,
//! before it returns, independent of either external path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ClaimError;
use crate::record::{ClaimRecord, ClaimStatusUpdate};
use crate::store::ClaimStore;

/// How often the fallback path re-reads the durable log.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub type UpdateCallback = Arc<dyn Fn(&ClaimStatusUpdate) + Send + Sync>;

/// A live-path frame. The origin id lets a context skip its own frames,
/// mirroring how a browser BroadcastChannel never delivers to the posting
/// tab.
#[derive(Clone, Debug)]
pub struct BroadcastFrame {
    pub origin: Uuid,
    pub update: ClaimStatusUpdate,
}

/// Create the shared live-broadcast handle contexts pass to `open`.
pub fn broadcast_channel(capacity: usize) -> broadcast::Sender<BroadcastFrame> {
    broadcast::channel(capacity).0
}

struct SubscriberEntry {
    claim_id: Option<String>,
    callback: UpdateCallback,
}

#[derive(Default)]
struct SubscriberTable {
    next_id: u64,
    entries: HashMap<u64, SubscriberEntry>,
}

/// Deregistration guard returned by `subscribe`/`subscribe_all`.
///
/// Dropping (or `cancel`ing) it removes the callback from every delivery
/// path; no further invocations occur afterwards.
pub struct Subscription {
    id: u64,
    subs: Arc<Mutex<SubscriberTable>>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut table) = self.subs.lock() {
            table.entries.remove(&self.id);
        }
    }
}

pub struct SyncChannel {
    ctx_id: Uuid,
    store: ClaimStore,
    broadcast: Option<broadcast::Sender<BroadcastFrame>>,
    subs: Arc<Mutex<SubscriberTable>>,
    /// Update ids already delivered (or self-published) in this context.
    seen: Arc<Mutex<HashSet<Uuid>>>,
    listener: Option<JoinHandle<()>>,
}

impl SyncChannel {
    /// Open a channel for one execution context.
    ///
    /// Contexts that should see each other's updates share the same store;
    /// passing a clone of the same broadcast sender enables the live path.
    /// With `None` the channel falls back to polling the store.
    pub fn open(store: ClaimStore, broadcast: Option<broadcast::Sender<BroadcastFrame>>) -> Self {
        let ctx_id = Uuid::new_v4();
        let subs: Arc<Mutex<SubscriberTable>> = Arc::default();
        let seen: Arc<Mutex<HashSet<Uuid>>> = Arc::default();

        let listener = match &broadcast {
            Some(tx) => tokio::spawn(broadcast_listener(tx.subscribe(), ctx_id, subs.clone())),
            None => {
                debug!(%ctx_id, "live broadcast unavailable, polling the durable log instead");
                tokio::spawn(poll_listener(store.clone(), subs.clone(), seen.clone()))
            }
        };

        Self {
            ctx_id,
            store,
            broadcast,
            subs,
            seen,
            listener: Some(listener),
        }
    }

    /// Append to the durable log, then deliver: best-effort to live
    /// contexts, synchronously to same-context subscribers.
    pub async fn publish(&self, update: ClaimStatusUpdate) -> Result<ClaimRecord, ClaimError> {
        mark_seen(&self.seen, update.update_id);
        let record = self.store.append(&update).await?;

        if let Some(tx) = &self.broadcast {
            let frame = BroadcastFrame {
                origin: self.ctx_id,
                update: update.clone(),
            };
            if tx.send(frame).is_err() {
                debug!(claim_id = %update.claim_id, "no live listeners for broadcast frame");
            }
        }

        dispatch(&self.subs, &update);
        Ok(record)
    }

    /// Register a callback for one claim's updates.
    pub fn subscribe(
        &self,
        claim_id: &str,
        callback: impl Fn(&ClaimStatusUpdate) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(Some(claim_id.to_string()), Arc::new(callback))
    }

    /// Register a callback for every claim (dashboard-style consumers).
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&ClaimStatusUpdate) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(None, Arc::new(callback))
    }

    fn register(&self, claim_id: Option<String>, callback: UpdateCallback) -> Subscription {
        let mut table = match self.subs.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = table.next_id;
        table.next_id += 1;
        table.entries.insert(id, SubscriberEntry { claim_id, callback });

        Subscription {
            id,
            subs: self.subs.clone(),
        }
    }

    /// Synchronous read of the durable log for one claim.
    pub async fn record(&self, claim_id: &str) -> Result<Option<ClaimRecord>, ClaimError> {
        self.store.record(claim_id).await
    }

    /// All records, most recently updated first.
    pub async fn list_records(&self) -> Result<Vec<ClaimRecord>, ClaimError> {
        self.store.list_records().await
    }

    /// Purge every durable record. Explicit full reset only.
    pub async fn clear_all(&self) -> Result<(), ClaimError> {
        self.store.clear_all().await
    }

    pub fn close(mut self) {
        self.stop_listener();
    }

    fn stop_listener(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

fn mark_seen(seen: &Arc<Mutex<HashSet<Uuid>>>, update_id: Uuid) -> bool {
    match seen.lock() {
        Ok(mut set) => set.insert(update_id),
        Err(poisoned) => poisoned.into_inner().insert(update_id),
    }
}

/// Invoke every matching callback. Callbacks run outside the table lock so
/// they may subscribe/unsubscribe freely.
fn dispatch(subs: &Arc<Mutex<SubscriberTable>>, update: &ClaimStatusUpdate) {
    let callbacks: Vec<UpdateCallback> = {
        let table = match subs.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        table
            .entries
            .values()
            .filter(|e| {
                e.claim_id
                    .as_deref()
                    .is_none_or(|id| id == update.claim_id)
            })
            .map(|e| e.callback.clone())
            .collect()
    };

    for callback in callbacks {
        callback(update);
    }
}

async fn broadcast_listener(
    mut rx: broadcast::Receiver<BroadcastFrame>,
    ctx_id: Uuid,
    subs: Arc<Mutex<SubscriberTable>>,
) {
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if frame.origin != ctx_id {
                    dispatch(&subs, &frame.update);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // The durable log remains authoritative; a lagged frame is
                // only a lost acceleration.
                warn!(missed, "broadcast listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Storage-poll fallback: deliver history entries not yet seen in this
/// context. The first pass only seeds the seen-set, so pre-existing history
/// is not replayed at subscribers.
async fn poll_listener(
    store: ClaimStore,
    subs: Arc<Mutex<SubscriberTable>>,
    seen: Arc<Mutex<HashSet<Uuid>>>,
) {
    let mut tick = interval(POLL_INTERVAL);
    let mut seeded = false;

    loop {
        tick.tick().await;

        let records = match store.list_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "storage poll failed");
                continue;
            }
        };

        for record in records {
            for update in &record.history {
                if mark_seen(&seen, update.update_id) && seeded {
                    dispatch(&subs, update);
                }
            }
        }

        seeded = true;
    }
}
