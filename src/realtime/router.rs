use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::handlers::Reconciler;
use crate::realtime::events::{Channel, InboxEvent};
use crate::realtime::scope::SyncScope;
use crate::realtime::source::EventSource;

/// One item read off a subscription, stamped with the subscription it came from.
#[derive(Debug)]
struct Delivery {
    channel: Channel,
    generation: u64,
    item: Result<InboxEvent, TransportError>,
}

/// A live subscription: the key it was opened with and the task pumping it.
struct Subscription {
    key: String,
    generation: u64,
    task: JoinHandle<()>,
}

/// Keeps one subscription per channel in line with the current scope and
/// funnels every delivery through a single dispatcher, so handlers run one at
/// a time and in delivery order per channel.
///
/// The router itself holds no inbox logic; it hands each delivery to the
/// [`Reconciler`].
pub struct EventRouter<E: EventSource> {
    source: Arc<E>,
    reconciler: Arc<Reconciler>,
    subscriptions: Mutex<HashMap<Channel, Subscription>>,
    next_generation: AtomicU64,
    tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Delivery>>,
}

impl<E: EventSource> EventRouter<E> {
    pub fn new(source: Arc<E>, reconciler: Arc<Reconciler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source,
            reconciler,
            subscriptions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Switch to `scope`: channels whose scoping key changed are torn down
    /// and, if they still have a key, opened again. Must run inside a tokio
    /// runtime.
    pub fn set_scope(&self, scope: SyncScope) {
        let previous = self.reconciler.scope().replace(scope.clone());
        if previous.open_conversation_id() != scope.open_conversation_id() {
            self.reconciler.on_conversation_switch();
        }

        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(tx) = tx else {
            debug!("router is shut down, ignoring scope change");
            return;
        };

        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for channel in Channel::ALL {
            let key = channel.scoping_key(&scope);
            let current = subscriptions.get(&channel).map(|s| s.key.as_str());
            if current == key.as_deref() {
                continue;
            }

            if let Some(old) = subscriptions.remove(&channel) {
                old.task.abort();
                debug!("unsubscribed {} ({})", channel.as_str(), old.key);
            }

            if let Some(key) = key {
                let subscription = self.spawn_subscription(channel, key, tx.clone());
                subscriptions.insert(channel, subscription);
            }
        }
    }

    fn spawn_subscription(
        &self,
        channel: Channel,
        key: String,
        tx: mpsc::UnboundedSender<Delivery>,
    ) -> Subscription {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut stream = self.source.subscribe(channel, &key);
        info!("subscribed {} ({key})", channel.as_str());

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let delivery = Delivery {
                    channel,
                    generation,
                    item,
                };
                if tx.send(delivery).is_err() {
                    break;
                }
            }
            debug!("{} stream ended", channel.as_str());
        });

        Subscription {
            key,
            generation,
            task,
        }
    }

    /// Whether deliveries stamped `generation` still belong to the live
    /// subscription on `channel`.
    fn is_current(&self, channel: Channel, generation: u64) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .is_some_and(|s| s.generation == generation)
    }

    /// Wait for the next delivery and dispatch it. Deliveries left over from
    /// a torn-down subscription are dropped. Returns false once the router is
    /// shut down and drained.
    pub async fn dispatch_next(&self) -> bool {
        let delivery = self.rx.lock().await.recv().await;
        let Some(delivery) = delivery else {
            return false;
        };

        if self.is_current(delivery.channel, delivery.generation) {
            self.reconciler.apply(delivery.channel, delivery.item);
        } else {
            debug!("dropping stale {} delivery", delivery.channel.as_str());
        }
        true
    }

    /// Dispatch until [`shutdown`](Self::shutdown).
    pub async fn run(&self) {
        while self.dispatch_next().await {}
        info!("event router stopped");
    }

    /// Tear down every subscription and let [`run`](Self::run) return.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (channel, subscription) in subscriptions.drain() {
            subscription.task.abort();
            debug!("unsubscribed {} ({})", channel.as_str(), subscription.key);
        }
    }

    /// Channels with a live subscription and the key each was opened with.
    pub fn active_subscriptions(&self) -> HashMap<Channel, String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(channel, s)| (*channel, s.key.clone()))
            .collect()
    }
}

impl<E: EventSource> Drop for EventRouter<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
