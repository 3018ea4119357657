use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Request line and headers of the first request a [`LoopbackServer`] received.
pub(crate) struct CapturedRequest {
    head: String,
}

impl CapturedRequest {
    pub(crate) fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
        })
    }
}

/// One-shot HTTP server on 127.0.0.1 for driving collectors end to end.
pub(crate) struct LoopbackServer {
    pub base_url: String,
    captured: oneshot::Receiver<CapturedRequest>,
}

impl LoopbackServer {
    pub(crate) async fn reply(status_line: &'static str, body: &'static str) -> Self {
        Self::spawn(Some((status_line, body))).await
    }

    /// Reads the request and never answers.
    pub(crate) async fn silent() -> Self {
        Self::spawn(None).await
    }

    async fn spawn(reply: Option<(&'static str, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        let (sender, captured) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buffer = [0_u8; 8192];
            let bytes_read = socket.read(&mut buffer).await.unwrap_or(0);
            let head = String::from_utf8_lossy(&buffer[..bytes_read]).to_string();
            let _ = sender.send(CapturedRequest { head });

            match reply {
                Some((status_line, body)) => {
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.flush().await;
                }
                None => tokio::time::sleep(Duration::from_secs(10)).await,
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            captured,
        }
    }

    pub(crate) async fn request(self) -> CapturedRequest {
        self.captured.await.expect("captured request")
    }
}

/// Base URL of a port nothing listens on.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    drop(listener);
    format!("http://{addr}")
}
