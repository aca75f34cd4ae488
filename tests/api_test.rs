///! Integration tests for the GraphQL client.
///!
///! Each test binds a one-shot HTTP listener on localhost that answers with a
///! canned response and hands back the raw request it received.
///!
///! Run with: `cargo test --test api_test`
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use inbox_sync::api::{InboxApi, create_client};
use inbox_sync::config::InboxConfig;
use inbox_sync::error::ApiError;
use inbox_sync::models::{MessageStatus, PageRequest};

mod common;
use common::{ME, draft};

const TOKEN: &str = "test-token";

/// Serve exactly one request with `status` and `body`, returning the request text.
async fn serve_once(status: &str, body: Value) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/graphql", listener.local_addr().unwrap());
    let status = status.to_string();
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if raw.len() >= head_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

fn request_body(request: &str) -> Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

fn config(url: String) -> InboxConfig {
    InboxConfig {
        graphql_url: url,
        auth_token: Some(TOKEN.to_string()),
        ..InboxConfig::default()
    }
}

fn server_message(id: &str, content: &str) -> Value {
    json!({
        "_id": id,
        "conversationId": "c1",
        "userId": ME,
        "content": content,
        "internal": false,
        "status": "sent",
        "createdAt": "2023-11-14T22:13:20Z",
    })
}

#[tokio::test]
async fn test_send_message_returns_server_copy() {
    let (url, server) = serve_once(
        "200 OK",
        json!({ "data": { "conversationMessageAdd": server_message("srv-9", "hello") } }),
    )
    .await;
    let api = create_client(&config(url)).unwrap();

    let message = api.send_message(&draft("c1", "hello")).await.unwrap();

    assert_eq!(message.id, "srv-9");
    assert_eq!(message.user_id.as_deref(), Some(ME));
    assert_eq!(message.status, MessageStatus::Sent);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /graphql "));
    let body = request_body(&request);
    assert!(body["query"].as_str().unwrap().contains("conversationMessageAdd"));
    assert_eq!(body["variables"]["conversationId"], "c1");
    assert_eq!(body["variables"]["content"], "hello");
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let (url, server) = serve_once(
        "200 OK",
        json!({ "data": { "conversationMarkAsRead": { "_id": "c1" } } }),
    )
    .await;
    let api = create_client(&config(url)).unwrap();

    api.mark_as_read("c1").await.unwrap();

    let request = server.await.unwrap().to_lowercase();
    assert!(request.contains(&format!("authorization: bearer {TOKEN}")));
}

#[tokio::test]
async fn test_fetch_messages_sends_page_variables() {
    let (url, server) = serve_once(
        "200 OK",
        json!({ "data": { "conversationMessages": [
            server_message("m1", "first"),
            server_message("m2", "second"),
        ] } }),
    )
    .await;
    let api = create_client(&config(url)).unwrap();

    let page = api.fetch_messages("c1", PageRequest::new(20, 20)).await.unwrap();

    let ids: Vec<_> = page.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    let body = request_body(&server.await.unwrap());
    assert_eq!(body["variables"]["skip"], 20);
    assert_eq!(body["variables"]["limit"], 20);
}

#[tokio::test]
async fn test_graphql_errors_are_reported() {
    let (url, _server) = serve_once(
        "200 OK",
        json!({
            "data": null,
            "errors": [{ "message": "conversation is closed" }, { "message": "try later" }],
        }),
    )
    .await;
    let api = create_client(&config(url)).unwrap();

    let result = api.send_message(&draft("c1", "hello")).await;

    match result {
        Err(ApiError::Graphql(message)) => {
            assert_eq!(message, "conversation is closed; try later");
        }
        other => panic!("expected a graphql error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_success_status_is_reported() {
    let (url, _server) = serve_once("502 Bad Gateway", json!({})).await;
    let api = create_client(&config(url)).unwrap();

    let result = api.mark_as_read("c1").await;

    assert!(matches!(result, Err(ApiError::Status(502))));
}

#[tokio::test]
async fn test_missing_root_field_is_reported() {
    let (url, _server) = serve_once("200 OK", json!({ "data": { "somethingElse": 1 } })).await;
    let api = create_client(&config(url)).unwrap();

    let result = api.send_message(&draft("c1", "hello")).await;

    assert!(matches!(result, Err(ApiError::MissingData("conversationMessageAdd"))));
}

#[tokio::test]
async fn test_missing_data_is_reported() {
    let (url, _server) = serve_once("200 OK", json!({})).await;
    let api = create_client(&config(url)).unwrap();

    let result = api.fetch_messages("c1", PageRequest::new(0, 20)).await;

    assert!(matches!(result, Err(ApiError::MissingData("data"))));
}
