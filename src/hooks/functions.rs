//! Server-side functions, addressed as `/<resource>/-<name>`.
//!
//! Functions registered in-process take precedence. Unknown names fall through to the
//! remote function server when one is configured.

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::client::HttpClient;
use super::types::{FunctionCall, HookError, object_body};
use crate::error::ApiResult;
use crate::storage::types::Document;

#[async_trait]
pub trait FunctionService: Send + Sync {
    async fn invoke(&self, call: FunctionCall) -> ApiResult<Document>;
}

/// Type-erased in-process function.
pub type FunctionHandlerFn = Arc<
    dyn Fn(FunctionCall) -> Pin<Box<dyn Future<Output = ApiResult<Document>> + Send>>
        + Send
        + Sync,
>;

pub struct FunctionRegistry {
    handlers: DashMap<String, FunctionHandlerFn>,
    remote: Option<RemoteFunctions>,
}

impl FunctionRegistry {
    pub fn new(remote: Option<RemoteFunctions>) -> Arc<Self> {
        Arc::new(Self {
            handlers: DashMap::new(),
            remote,
        })
    }

    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(FunctionCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Document>> + Send + 'static,
    {
        let handler_fn: FunctionHandlerFn = Arc::new(move |call: FunctionCall| {
            Box::pin(handler(call)) as Pin<Box<dyn Future<Output = ApiResult<Document>> + Send>>
        });
        self.handlers.insert(name.to_string(), handler_fn);

        tracing::info!("Registered function: {}", name);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn function_names(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl FunctionService for FunctionRegistry {
    async fn invoke(&self, call: FunctionCall) -> ApiResult<Document> {
        // Clone out of the map so no shard lock is held across the await.
        let local = self.handlers.get(&call.name).map(|entry| entry.value().clone());
        if let Some(handler_fn) = local {
            tracing::debug!("Executing function '{}' on {}", call.name, call.res);
            return handler_fn(call).await;
        }

        match &self.remote {
            Some(remote) => remote.invoke(&call).await,
            None => Err(HookError::UnknownFunction(call.name).into()),
        }
    }
}

/// Functions served by an external HTTP endpoint: function `name` lives at
/// `endpoint + name`.
pub struct RemoteFunctions {
    http: Arc<HttpClient>,
    endpoint: String,
}

impl RemoteFunctions {
    pub fn new(http: Arc<HttpClient>, endpoint: String) -> Self {
        Self { http, endpoint }
    }

    pub async fn invoke(&self, call: &FunctionCall) -> ApiResult<Document> {
        let url = format!("{}{}", self.endpoint, call.name);
        tracing::debug!("Calling remote function {}", url);

        let reply = self
            .http
            .post_json(&url, &call.payload())
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
        Ok(object_body(reply.body).unwrap_or_default())
    }
}
