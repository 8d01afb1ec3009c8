//! HTTP collaborators: processor and internal APIs, Slack webhooks
//!
//! Reads are retried with exponential backoff. Client errors other than
//! `429 Too Many Requests` are not retried.

pub mod slack;
pub mod source;

pub use slack::*;
pub use source::*;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::types::*;

/// Per-request timeout for outbound calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to keep retrying a failing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }
}

pub(crate) fn build_client() -> RunResult<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// GET `url` and decode the body as JSON, retrying transient failures
pub(crate) async fn get_json(
    client: &Client,
    url: &str,
    policy: RetryPolicy,
) -> RunResult<serde_json::Value> {
    let body = retry(policy.backoff(), || async move {
        let response = client.get(url).send().await.map_err(|e| {
            tracing::warn!(url, error = %e, "request failed; retrying");
            backoff::Error::transient(e)
        })?;

        let status = response.status();
        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) if is_retryable(status) => {
                tracing::warn!(url, %status, "server error; retrying");
                return Err(backoff::Error::transient(e));
            }
            Err(e) => return Err(backoff::Error::permanent(e)),
        };

        response
            .json::<serde_json::Value>()
            .await
            .map_err(backoff::Error::permanent)
    })
    .await?;

    Ok(body)
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Minimal HTTP/1.1 responder for exercising the clients

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// A request as seen by the server: request line and body
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub request_line: String,
        pub body: String,
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Serve `responses` in order, one connection each, then stop
    pub async fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Recorded>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut recorded = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let read = socket.read(&mut chunk).await.unwrap();
                    buffer.extend_from_slice(&chunk[..read]);
                    if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    if read == 0 {
                        break buffer.len();
                    }
                };
                let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
                let wanted = content_length(&head);
                while buffer.len() < header_end + wanted {
                    let read = socket.read(&mut chunk).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&chunk[..read]);
                }

                recorded.push(Recorded {
                    request_line: head.lines().next().unwrap_or_default().to_string(),
                    body: String::from_utf8_lossy(&buffer[header_end..]).to_string(),
                });

                let response = format!(
                    "HTTP/1.1 {} STATUS\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            recorded
        });

        (base_url, handle)
    }
}
