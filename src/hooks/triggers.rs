//! Before/after triggers around mutations.
//!
//! A webhook is configured per class, phase and verb:
//! `{"endpoint": "http://hooks", "methods": {"posts": {"before": {"post": "/posts/before"}}}}`.
//! Combinations without a configured path are silently skipped.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::client::HttpClient;
use super::types::{HookError, TriggerEvent, object_body};
use crate::error::ApiResult;
use crate::storage::types::Document;

/// class → phase → verb → endpoint path.
pub type WebhookMethods = HashMap<String, HashMap<String, HashMap<String, String>>>;

#[async_trait]
pub trait TriggerService: Send + Sync {
    /// Fires `event`. A returned document replaces the request body in the before phase.
    async fn fire(&self, event: &TriggerEvent) -> ApiResult<Option<Document>>;
}

/// Used when no webhook is configured.
pub struct NoopTriggers;

#[async_trait]
impl TriggerService for NoopTriggers {
    async fn fire(&self, _event: &TriggerEvent) -> ApiResult<Option<Document>> {
        Ok(None)
    }
}

pub struct WebhookTriggers {
    http: Arc<HttpClient>,
    endpoint: String,
    methods: WebhookMethods,
}

impl WebhookTriggers {
    pub fn new(http: Arc<HttpClient>, endpoint: String, methods: WebhookMethods) -> Self {
        Self {
            http,
            endpoint,
            methods,
        }
    }

    /// Full URL of the hook for `event`, if one is configured.
    pub fn url_for(&self, event: &TriggerEvent) -> Option<String> {
        let path = self
            .methods
            .get(&event.class)?
            .get(event.phase.as_str())?
            .get(event.verb.as_str())?;
        Some(format!("{}{}", self.endpoint, path))
    }
}

#[async_trait]
impl TriggerService for WebhookTriggers {
    async fn fire(&self, event: &TriggerEvent) -> ApiResult<Option<Document>> {
        let Some(url) = self.url_for(event) else {
            return Ok(None);
        };
        tracing::debug!(
            "Firing {} {} trigger for {}",
            event.phase.as_str(),
            event.verb,
            event.class
        );

        let reply = self
            .http
            .post_json(&url, &event.payload())
            .await
            .map_err(|e| HookError::Transport(e.to_string()))?;
        if reply.is_error() {
            let message = reply.message();
            return Err(HookError::Remote {
                status: reply.status,
                message,
            }
            .into());
        }
        Ok(object_body(reply.body))
    }
}
