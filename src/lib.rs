pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inbox;
pub mod models;
pub mod realtime;

pub use api::{GraphqlApi, InboxApi, create_client};
pub use cache::{NormalizedCache, Store};
pub use config::InboxConfig;
pub use handlers::Reconciler;
