//! Size-bounded HTTP GET.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status code {0}")]
    Status(u16),

    #[error("Response exceeds allowed size ({limit} bytes)")]
    TooLarge { limit: usize },

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Download `url` into memory, aborting once more than `limit` bytes arrive.
///
/// The transfer is dropped as soon as the limit is crossed (or up front when
/// `Content-Length` already exceeds it); the body is never truncated.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(FetchError::TooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::Body(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// One-shot HTTP server streaming `count` chunks of `size` bytes with
    /// chunked transfer encoding (no `Content-Length`).
    async fn chunked_server(count: usize, size: usize, pause: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
            if socket.write_all(head).await.is_err() {
                return;
            }
            for _ in 0..count {
                let mut frame = format!("{size:x}\r\n").into_bytes();
                frame.extend(std::iter::repeat(b'x').take(size));
                frame.extend_from_slice(b"\r\n");
                if socket.write_all(&frame).await.is_err() || socket.flush().await.is_err() {
                    return;
                }
                tokio::time::sleep(pause).await;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        format!("http://{addr}/stream")
    }

    #[tokio::test]
    async fn test_fetch_within_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let body = fetch_bytes(&client, &format!("{}/page", server.uri()), 5)
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_bytes(&client, &server.uri(), 63).await.unwrap_err();
        assert_eq!(err, FetchError::TooLarge { limit: 63 });
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_bytes(&client, &server.uri(), 1024).await.unwrap_err();
        assert_eq!(err, FetchError::Status(404));
    }

    #[tokio::test]
    async fn test_streamed_body_within_limit() {
        let url = chunked_server(4, 16, Duration::from_millis(5)).await;
        let client = reqwest::Client::new();
        let body = fetch_bytes(&client, &url, 64).await.unwrap();
        assert_eq!(body, vec![b'x'; 64]);
    }

    #[tokio::test]
    async fn test_streamed_body_aborted_once_over_limit() {
        // 100 chunks at 10ms each would take a second to arrive in full
        let url = chunked_server(100, 16, Duration::from_millis(10)).await;
        let client = reqwest::Client::new();

        let started = Instant::now();
        let err = fetch_bytes(&client, &url, 40).await.unwrap_err();
        assert_eq!(err, FetchError::TooLarge { limit: 40 });
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let client = reqwest::Client::new();
        // Port 9 (discard) is closed on test hosts.
        let err = fetch_bytes(&client, "http://127.0.0.1:9/", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }
}
