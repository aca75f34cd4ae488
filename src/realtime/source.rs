use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::realtime::events::{Channel, InboxEvent};

/// One subscription's deliveries: decoded events or transport failures.
pub type EventStream = BoxStream<'static, Result<InboxEvent, TransportError>>;

/// The subscription transport. Wire framing and reconnection live behind it.
pub trait EventSource: Send + Sync + 'static {
    /// Open `channel` scoped by `scoping_key`. Dropping the stream unsubscribes.
    fn subscribe(&self, channel: Channel, scoping_key: &str) -> EventStream;
}

type Feed = mpsc::UnboundedSender<Result<InboxEvent, TransportError>>;

/// An in-process [`EventSource`] the host feeds by hand: the replay tool,
/// tests, or a bridge from an external subscription client.
#[derive(Default)]
pub struct ChannelSource {
    feeds: Mutex<HashMap<Channel, (String, Feed)>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `item` to the live subscription on `channel`. Returns false if
    /// nothing is subscribed there, in which case the item is dropped.
    pub fn push(&self, channel: Channel, item: Result<InboxEvent, TransportError>) -> bool {
        let feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        match feeds.get(&channel) {
            Some((_, feed)) => feed.send(item).is_ok(),
            None => false,
        }
    }

    /// Deliver an event on the channel it belongs to.
    pub fn push_event(&self, event: InboxEvent) -> bool {
        self.push(event.channel(), Ok(event))
    }

    /// The key `channel` is currently subscribed with, if it is live.
    pub fn subscribed_key(&self, channel: Channel) -> Option<String> {
        let feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        feeds
            .get(&channel)
            .filter(|(_, feed)| !feed.is_closed())
            .map(|(key, _)| key.clone())
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&self, channel: Channel, scoping_key: &str) -> EventStream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        debug!("in-process feed opened for {} ({scoping_key})", channel.as_str());
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, (scoping_key.to_string(), tx));
        stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed()
    }
}
