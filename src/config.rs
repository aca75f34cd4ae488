use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::models::DEFAULT_PAGE_SIZE;

const DEFAULT_GRAPHQL_URL: &str = "http://localhost:4000/graphql";

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct InboxConfig {
    pub graphql_url: String,
    pub auth_token: Option<String>,
    /// The signed-in team member. Required by anything that talks to the server.
    pub user_id: Option<String>,
    pub page_size: usize,
    pub http_timeout: Duration,
    pub notify_require_interaction: bool,
    pub cache: CacheConfig,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            auth_token: None,
            user_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            http_timeout: Duration::from_secs(30),
            notify_require_interaction: false,
            cache: CacheConfig::default(),
        }
    }
}

impl InboxConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            graphql_url: std::env::var("INBOX_GRAPHQL_URL")
                .unwrap_or_else(|_| DEFAULT_GRAPHQL_URL.to_string()),
            auth_token: std::env::var("INBOX_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            user_id: std::env::var("INBOX_USER_ID").ok().filter(|u| !u.is_empty()),
            page_size: parse_env("INBOX_MESSAGE_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            http_timeout: Duration::from_secs(parse_env("INBOX_HTTP_TIMEOUT_SECS", 30)),
            notify_require_interaction: parse_env("INBOX_NOTIFY_REQUIRE_INTERACTION", false),
            cache: CacheConfig::from_env(),
        }
    }
}

/// Parse `env_var`, falling back to `default` when it is unset or malformed.
pub(crate) fn parse_env<T: FromStr>(env_var: &str, default: T) -> T {
    parse_env_opt(env_var).unwrap_or(default)
}

pub(crate) fn parse_env_opt<T: FromStr>(env_var: &str) -> Option<T> {
    std::env::var(env_var).ok().and_then(|v| v.trim().parse().ok())
}
