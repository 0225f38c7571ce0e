use std::time::Duration;

use menu_sync::{HttpStore, RemoteStore, TransportErrorKind};
use reqwest::Method;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one canned HTTP response and hand back the raw request head.
async fn serve_once(
    status: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    (format!("127.0.0.1:{}", addr.port()), handle)
}

/// Read the head and, when announced, the whole body so the client never
/// sees a reset.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&raw).into_owned();
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if raw.len() >= head_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

#[tokio::test]
async fn decodes_successful_json_body() {
    let (addr, server) = serve_once("200 OK", r#"[{"id":"1","name":"Mains"}]"#).await;
    let store = HttpStore::new(&addr, Duration::from_secs(5)).unwrap();
    assert!(store.base_url().starts_with("http://127.0.0.1:"));

    let value = store.request("/categories", Method::GET, None).await.unwrap();
    assert_eq!(value, json!([{ "id": "1", "name": "Mains" }]));
    let head = server.await.unwrap();
    assert!(head.starts_with("GET /categories HTTP/1.1"));
}

#[tokio::test]
async fn error_status_carries_server_message() {
    let (addr, server) = serve_once("404 Not Found", r#"{"message":"dish not found"}"#).await;
    let store = HttpStore::new(&addr, Duration::from_secs(5)).unwrap();

    let err = store
        .request("/dishes/9", Method::PATCH, Some(json!({ "isActive": false })))
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::Status);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "dish not found");
    assert!(err.is_not_found());
    let head = server.await.unwrap();
    assert!(head.starts_with("PATCH /dishes/9 HTTP/1.1"));
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let (addr, server) = serve_once("200 OK", "").await;
    let store = HttpStore::new(&addr, Duration::from_secs(5)).unwrap();
    let value = store.request("/dishes/1", Method::DELETE, None).await.unwrap();
    assert!(value.is_null());
    server.await.unwrap();
}
