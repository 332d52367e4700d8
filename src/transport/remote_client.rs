use crate::core::error::{HybridResult, RemoteError};
use crate::transport::{HttpMethod, RemoteRequest, Transport};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_RATE_LIMIT_RETRIES: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Issues requests against the remote store. Applies bounded exponential
/// backoff on rate-limit responses internally — callers never see a
/// rate-limit error unless the retry budget is exhausted — and surfaces
/// every other transport failure as a retriable error. Concurrent callers
/// share the limiter.
pub struct RemoteClient {
    http: Client,
    base_url: String,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, token: &str, max_concurrent: usize, timeout_ms: u64) -> HybridResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {token}").parse().map_err(|_| RemoteError::Authentication {
                message: "Token is not a valid header value".to_string(),
            })?,
        );
        headers.insert("Accept", "application/json".parse().unwrap());
        headers.insert("User-Agent", "hybridtask-sync".parse().unwrap());

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RemoteError::Transport {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[async_trait]
impl Transport for RemoteClient {
    async fn send(&self, request: RemoteRequest) -> HybridResult<Value> {
        let _permit = self.limiter.acquire().await.map_err(|e| RemoteError::Transport {
            message: format!("Rate limiter closed: {e}"),
        })?;

        let url = format!("{}{}", self.base_url, request.path);
        let mut attempt = 0u32;

        loop {
            let mut builder = match request.method {
                HttpMethod::Get => self.http.get(&url),
                HttpMethod::Post => self.http.post(&url),
                HttpMethod::Patch => self.http.patch(&url),
                HttpMethod::Delete => self.http.delete(&url),
            };
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(RemoteError::Transport {
                        message: format!("Request to {url} timed out after {:?}", self.timeout),
                    }
                    .into());
                }
                Err(e) => {
                    return Err(RemoteError::Transport {
                        message: format!("Request to {url} failed: {e}"),
                    }
                    .into());
                }
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                if attempt > MAX_RATE_LIMIT_RETRIES {
                    return Err(RemoteError::RateLimit {
                        message: format!("Exceeded {MAX_RATE_LIMIT_RETRIES} rate-limit retries for {url}"),
                    }
                    .into());
                }
                tokio::time::sleep(backoff_delay(attempt)).await;
                continue;
            }

            if !response.status().is_success() {
                return Err(RemoteError::Transport {
                    message: format!(
                        "Remote store returned {}: {}",
                        response.status(),
                        response.text().await.unwrap_or_default()
                    ),
                }
                .into());
            }

            if response.content_length() == Some(0) {
                return Ok(Value::Null);
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| RemoteError::Transport {
                    message: format!("Failed to parse response from {url}: {e}"),
                })
                .map_err(Into::into);
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF * 2u32.pow(attempt.saturating_sub(1));
    let jitter_ms = (rand::random::<f32>() * 250.0) as u64;
    exp + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HybridError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_backoff_delay_grows_with_attempt() {
        let first = backoff_delay(1).as_millis();
        let third = backoff_delay(3).as_millis();
        assert!(third > first);
    }

    fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            429 => "Too Many Requests",
            _ => "Unknown",
        }
    }

    /// Serves one bare-bones HTTP response per accepted connection, then
    /// closes it, so the client is forced to reconnect for the next retry.
    async fn serve_sequence(listener: TcpListener, statuses: Vec<u16>) {
        for status in statuses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let body = if status == 200 { "{}" } else { "" };
            let response = format!(
                "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}",
                reason_phrase(status),
                body.len(),
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    }

    /// Exercises the actual HTTP-429 retry loop end to end: a single
    /// rate-limited response followed by success must surface as success to
    /// the caller, who never observes the intermediate rejection.
    #[tokio::test]
    async fn test_send_retries_on_rate_limit_then_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_sequence(listener, vec![429, 200]));

        let client = RemoteClient::new(format!("http://{addr}"), "test-token", 1, 5_000).unwrap();
        let result = client.send(RemoteRequest::get("/boards")).await;

        assert!(result.is_ok(), "expected the retried request to succeed, got {result:?}");
    }

    /// Once the retry budget is exhausted, the caller sees a classified
    /// rate-limit error rather than a generic transport failure.
    #[tokio::test]
    async fn test_send_surfaces_rate_limit_error_once_budget_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let statuses = vec![429; MAX_RATE_LIMIT_RETRIES as usize + 1];
        tokio::spawn(serve_sequence(listener, statuses));

        let client = RemoteClient::new(format!("http://{addr}"), "test-token", 1, 30_000).unwrap();
        let result = client.send(RemoteRequest::get("/boards")).await;

        match result {
            Err(HybridError::Remote(RemoteError::RateLimit { .. })) => {}
            other => panic!("expected a rate-limit error, got {other:?}"),
        }
    }
}
