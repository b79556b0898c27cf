//! Outbound HTTP plumbing shared by webhooks, remote functions, the mail relay and the
//! identity providers.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Status and decoded body of a remote call. `body` is `None` when the response is empty
/// or not JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    pub status: u16,
    pub body: Option<Value>,
}

impl RemoteReply {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Best-effort human readable message out of an error body.
    pub fn message(&self) -> String {
        match &self.body {
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("Remote endpoint answered with status {}.", self.status),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 2)
    }
}

impl HttpClient {
    pub fn new(timeout: Duration, attempts: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
            attempts: attempts.max(1),
        }
    }

    /// POSTs `payload` as JSON. Only failures to connect are retried: once the request may
    /// have reached the server (a timeout, a dropped response) it is not sent again. Any HTTP
    /// status, including errors, is returned to the caller.
    pub async fn post_json<T: Serialize>(&self, url: &str, payload: &T) -> Result<RemoteReply> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http
                .post(url)
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Self::read(resp).await,
                Err(e) => {
                    if !e.is_connect() || attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::warn!("POST {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    pub async fn get_json(&self, url: &str) -> Result<RemoteReply> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self.http.get(url).timeout(self.timeout).send().await;

            match response {
                Ok(resp) => return Self::read(resp).await,
                Err(e) => {
                    if !e.is_connect() || attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::warn!("GET {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    async fn read(resp: reqwest::Response) -> Result<RemoteReply> {
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        let body = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };
        Ok(RemoteReply { status, body })
    }
}
