use async_trait::async_trait;
use futures::future;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::Result;

/// A raw response from the query endpoint, before wrapping.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// One read request: endpoint path plus query parameters.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
}

/// The HTTP side of the TSDB, as seen by the client.
///
/// `retry_safe` is an explicit per-call marking: pipelined batches are not
/// safely retryable as a unit, so the batch executor always passes `false`
/// for them. Implementations that retry must honor it; this crate's own
/// implementations never retry either way.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
        retry_safe: bool,
    ) -> Result<RawResponse>;

    /// Issue an ordered batch of requests over one pipelined round-trip.
    /// Responses are returned in request order regardless of arrival order;
    /// a transport-level failure fails the whole batch.
    async fn get_batch(
        &self,
        requests: &[ReadRequest],
        retry_safe: bool,
    ) -> Result<Vec<RawResponse>>;
}

/// The line-oriented write side of the TSDB.
#[async_trait]
pub trait WriteChannel: Send + Sync {
    /// Send one protocol line (newline appended) to the write port.
    async fn send_line(&self, line: &str) -> Result<()>;
}

/// Production [`QueryTransport`] over a persistent reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// `base_url` is the TSDB root, e.g. `http://localhost:4242/`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        HttpTransport {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
        _retry_safe: bool,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "issuing GET");

        let response = self.http.get(&url).query(params).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    async fn get_batch(
        &self,
        requests: &[ReadRequest],
        retry_safe: bool,
    ) -> Result<Vec<RawResponse>> {
        debug!(count = requests.len(), "issuing pipelined batch");

        // join_all keeps the responses in request order even when they
        // complete out of network order.
        let pending = requests
            .iter()
            .map(|request| self.get(&request.path, &request.params, retry_safe));
        future::join_all(pending).await.into_iter().collect()
    }
}

/// Production [`WriteChannel`]: one TCP connection per put line.
#[derive(Debug, Clone)]
pub struct TcpWriteChannel {
    host: String,
    port: u16,
}

impl TcpWriteChannel {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpWriteChannel {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl WriteChannel for TcpWriteChannel {
    async fn send_line(&self, line: &str) -> Result<()> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    /// Minimal HTTP responder: echoes the request target back in the body.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    let body = target;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_get_hits_path_with_params() {
        let base = spawn_echo_server().await;
        let transport = HttpTransport::new(base);

        let params = vec![("q".to_string(), "sys".to_string())];
        let response = tokio_test::assert_ok!(transport.get("api/suggest", &params, true).await);

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "/api/suggest?q=sys");
    }

    #[tokio::test]
    async fn test_batch_preserves_request_order() {
        let base = spawn_echo_server().await;
        let transport = HttpTransport::new(base);

        let requests: Vec<ReadRequest> = (0..5)
            .map(|i| ReadRequest {
                path: "api/query".to_string(),
                params: vec![("start".to_string(), i.to_string())],
            })
            .collect();

        let responses = tokio_test::assert_ok!(transport.get_batch(&requests, false).await);
        assert_eq!(responses.len(), 5);
        for (i, response) in responses.iter().enumerate() {
            assert_eq!(response.body, format!("/api/query?start={}", i));
        }
    }

    #[tokio::test]
    async fn test_base_url_gains_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:4242");
        assert_eq!(transport.base_url(), "http://localhost:4242/");
    }

    #[tokio::test]
    async fn test_tcp_write_channel_sends_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut line = String::new();
            BufReader::new(socket).read_line(&mut line).await.unwrap();
            line
        });

        let channel = TcpWriteChannel::new(addr.ip().to_string(), addr.port());
        channel.send_line("put cpu.load 1420676750 1 host=web01").await.unwrap();

        let received = accept.await.unwrap();
        assert_eq!(received, "put cpu.load 1420676750 1 host=web01\n");
    }

    #[tokio::test]
    async fn test_tcp_write_channel_connection_refused() {
        let channel = TcpWriteChannel::new("127.0.0.1", 1);
        let err = channel.send_line("put m 1 1").await.unwrap_err();
        assert!(matches!(err, crate::ClientError::Transport(_)));
    }
}
