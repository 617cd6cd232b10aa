//! Push transport tests against a local one-shot HTTP responder.

use herakles_push_exporter::push::{PushClient, PushError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Received {
    request_line: String,
    body: String,
}

/// Accepts one connection, answers with `status_line` and hands back the request.
async fn respond_once(
    status_line: &'static str,
    reply_body: &'static str,
) -> (String, oneshot::Receiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let (head_end, content_length) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                let length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                break (pos + 4, length);
            }
        };
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            reply_body.len(),
            reply_body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let _ = tx.send(Received {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[head_end..]).to_string(),
        });
    });

    (gateway, rx)
}

#[tokio::test]
async fn test_push_accepted() {
    let (gateway, received) = respond_once("202 Accepted", "").await;
    let mut client = PushClient::new(gateway).unwrap();
    client.set_job("node");
    client.set_instance("host-a");

    let body = "# TYPE up gauge\nup 1\n".to_string();
    client.push(body.clone()).await.unwrap();

    let received = received.await.unwrap();
    assert_eq!(
        received.request_line,
        "POST /metrics/job/node/instance/host-a HTTP/1.1"
    );
    assert_eq!(received.body, body);
}

#[tokio::test]
async fn test_push_ok_with_trailing_slash_gateway() {
    let (gateway, received) = respond_once("200 OK", "").await;
    let client = PushClient::new(format!("{}/", gateway)).unwrap();

    client.push("up 1\n".to_string()).await.unwrap();

    let received = received.await.unwrap();
    assert_eq!(
        received.request_line,
        "POST /metrics/job/defaultJobName/instance/defaultInstanceName HTTP/1.1"
    );
}

#[tokio::test]
async fn test_push_unexpected_status() {
    let (gateway, _received) = respond_once("500 Internal Server Error", "boom").await;
    let client = PushClient::new(gateway.clone()).unwrap();

    match client.push("up 1\n".to_string()).await {
        Err(PushError::UnexpectedStatus { status, url, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(
                url,
                format!("{}/metrics/job/defaultJobName/instance/defaultInstanceName", gateway)
            );
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_push_connection_refused() {
    // bind and drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = PushClient::new(format!("http://{}", addr)).unwrap();
    let result = client.push("up 1\n".to_string()).await;
    assert!(matches!(result, Err(PushError::Network(_))));
}
