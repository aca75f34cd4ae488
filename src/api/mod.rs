pub mod messages;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::future::Future;
use tracing::debug;

use crate::config::InboxConfig;
use crate::error::ApiError;
use crate::models::{Message, MessageDraft, PageRequest};

/// The server operations the inbox core calls.
pub trait InboxApi: Send + Sync {
    /// Create a message; resolves to the server's authoritative copy.
    fn send_message(&self, draft: &MessageDraft) -> impl Future<Output = Result<Message, ApiError>> + Send;

    /// One page of history, oldest first, counted back from the newest message.
    fn fetch_messages(
        &self,
        conversation_id: &str,
        page: PageRequest,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;

    fn mark_as_read(&self, conversation_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

/// [`InboxApi`] over GraphQL-on-HTTP.
#[derive(Clone)]
pub struct GraphqlApi {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl GraphqlApi {
    pub fn new(endpoint: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            auth_token,
        }
    }

    /// Run `query` and decode the root field `field` of its result.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        field: &'static str,
    ) -> Result<T, ApiError> {
        debug!("graphql {field} on {}", self.endpoint);

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let body: GraphqlResponse = response.json().await?;
        if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(ApiError::Graphql(messages.join("; ")));
        }

        let mut data = body.data.ok_or(ApiError::MissingData("data"))?;
        let value = data
            .get_mut(field)
            .map(Value::take)
            .ok_or(ApiError::MissingData(field))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Build the GraphQL client from configuration.
pub fn create_client(config: &InboxConfig) -> Result<GraphqlApi, ApiError> {
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    Ok(GraphqlApi {
        client,
        endpoint: config.graphql_url.clone(),
        auth_token: config.auth_token.clone(),
    })
}
