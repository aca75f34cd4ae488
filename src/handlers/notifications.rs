use std::collections::HashMap;
use tracing::info;

use crate::handlers::Reconciler;
use crate::models::{ConversationRef, Message};

/// A desktop notification. Fire-and-forget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub content: String,
    pub user_id: Option<String>,
    pub require_interaction: bool,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Used when no desktop sink is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            title = %notification.title,
            require_interaction = notification.require_interaction,
            "{}",
            notification.content
        );
    }
}

/// Notification titles keyed by integration kind.
#[derive(Clone, Debug)]
pub struct NotificationTitles {
    titles: HashMap<String, String>,
}

impl Default for NotificationTitles {
    fn default() -> Self {
        let mut titles = Self {
            titles: HashMap::new(),
        };
        for (kind, title) in [
            ("messenger", "You have a new message"),
            ("lead", "You have a new form submission"),
            ("booking", "You have a new booking"),
            ("facebook-messenger", "You have a new Facebook message"),
            ("facebook-post", "You have a new Facebook comment"),
            ("instagram-messenger", "You have a new Instagram message"),
            ("imap", "You have a new email"),
            ("gmail", "You have a new email"),
            ("calls", "You have a new call"),
            ("callpro", "You have a new call"),
            ("sms", "You have a new SMS"),
            ("whatsapp", "You have a new WhatsApp message"),
        ] {
            titles.register(kind, title);
        }
        titles
    }
}

impl NotificationTitles {
    pub fn empty() -> Self {
        Self {
            titles: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, title: impl Into<String>) {
        self.titles.insert(kind.into(), title.into());
    }

    pub fn title_for(&self, kind: &str) -> String {
        self.titles
            .get(kind)
            .cloned()
            .unwrap_or_else(|| format!("You have a new {kind} message"))
    }
}

/// Drop markup from a message body: tags go, common entities are decoded,
/// runs of whitespace collapse to one space. Tags are removed before entities
/// are decoded, so escaped markup like `&lt;b&gt;` survives as the text `<b>`.
pub fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if in_tag => {}
            _ => text.push(ch),
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Reconciler {
    pub(crate) fn notify_new_message(
        &self,
        message: &Message,
        conversation: &ConversationRef,
        user_id: Option<&str>,
    ) {
        self.notifier.notify(Notification {
            title: self.titles.title_for(conversation.kind()),
            content: strip_markup(&message.content),
            user_id: user_id.map(str::to_string),
            require_interaction: self.require_interaction,
        });
    }
}
