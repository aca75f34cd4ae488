use inbox_sync::cache::{NormalizedCache, QueryKey, Store};
use inbox_sync::error::TransportError;
use inbox_sync::handlers::{Reconciler, TracingNotifier};
use inbox_sync::realtime::{
    Channel, ChannelSource, EventRouter, InboxEvent, OpenConversation, ScopeCell, SyncScope,
};
use inbox_sync::InboxConfig;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// One line of a replay log.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
enum ReplayRecord {
    /// Open a conversation pane, or close it when `conversationId` is absent.
    Open {
        #[serde(rename = "conversationId", default)]
        conversation_id: Option<String>,
        #[serde(rename = "customerId", default)]
        customer_id: Option<String>,
    },
    /// Put a query result in the cache, as if it had been fetched.
    Seed { query: SeedQuery, data: Value },
    /// Deliver an event on its channel.
    Event { channel: Channel, payload: Value },
    /// Fail the subscription on a channel.
    Error { channel: Channel, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
enum SeedQuery {
    ConversationDetail {
        #[serde(rename = "_id")]
        id: String,
    },
    ConversationMessages {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    Conversations,
    ConversationsTotalUnreadCount,
    ConversationMessagesTotalCount {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
}

impl SeedQuery {
    fn into_key(self, user_id: &str, page_size: usize) -> QueryKey {
        match self {
            SeedQuery::ConversationDetail { id } => QueryKey::detail(id),
            SeedQuery::ConversationMessages { conversation_id } => {
                QueryKey::window(conversation_id, page_size)
            }
            SeedQuery::Conversations => QueryKey::ConversationList {
                user_id: user_id.to_string(),
            },
            SeedQuery::ConversationsTotalUnreadCount => QueryKey::TotalUnreadCount,
            SeedQuery::ConversationMessagesTotalCount { conversation_id } => {
                QueryKey::ConversationMessagesTotalCount { conversation_id }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = InboxConfig::from_env();
    let Some(user_id) = config.user_id.clone() else {
        error!("INBOX_USER_ID must be set");
        std::process::exit(2);
    };

    let store = Arc::new(NormalizedCache::new(&config.cache));
    let reconciler = Arc::new(
        Reconciler::new(store.clone(), ScopeCell::default(), Arc::new(TracingNotifier))
            .with_require_interaction(config.notify_require_interaction),
    );
    let source = Arc::new(ChannelSource::new());
    let router = EventRouter::new(source.clone(), reconciler.clone());
    router.set_scope(SyncScope::for_user(&user_id));
    info!("replaying events for user {user_id}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: ReplayRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("line {line_no}: not a replay record: {e}");
                continue;
            }
        };

        match record {
            ReplayRecord::Open {
                conversation_id,
                customer_id,
            } => {
                let open = conversation_id.map(|id| OpenConversation {
                    id,
                    customer_id,
                    window_limit: config.page_size,
                });
                router.set_scope(reconciler.scope().get().with_conversation(open));
            }
            ReplayRecord::Seed { query, data } => {
                let key = query.into_key(&user_id, config.page_size);
                if let Err(e) = store.write(&key, data) {
                    warn!("line {line_no}: could not seed {}: {e}", key.cache_key());
                }
            }
            ReplayRecord::Event { channel, payload } => {
                let event: InboxEvent =
                    match serde_json::from_value(json!({ "channel": channel, "payload": payload })) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("line {line_no}: bad {} payload: {e}", channel.as_str());
                            continue;
                        }
                    };
                if source.push_event(event) {
                    router.dispatch_next().await;
                } else {
                    warn!("line {line_no}: {} is not subscribed", channel.as_str());
                }
            }
            ReplayRecord::Error { channel, message } => {
                if source.push(channel, Err(TransportError(message))) {
                    router.dispatch_next().await;
                } else {
                    warn!("line {line_no}: {} is not subscribed", channel.as_str());
                }
            }
        }
    }

    router.shutdown();

    let live = reconciler.live();
    let typing = live.typing().map(|t| {
        json!({ "conversationId": t.conversation_id, "text": t.text })
    });
    let output = json!({
        "connection": format!("{:?}", live.connection()).to_lowercase(),
        "typing": typing,
        "cache": store.snapshot(),
    });
    serde_json::to_writer_pretty(std::io::stdout().lock(), &output)?;
    println!();
    Ok(())
}
