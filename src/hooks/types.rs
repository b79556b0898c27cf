use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ApiError;
use crate::resource::types::{QueryParams, Verb};
use crate::storage::types::Document;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("hook is not configured: {0}")]
    NotConfigured(String),
    #[error("hook transport failed: {0}")]
    Transport(String),
    #[error("hook endpoint answered {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("function not found: {0}")]
    UnknownFunction(String),
}

pub type HookResult<T> = Result<T, HookError>;

impl From<HookError> for ApiError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::NotConfigured(message) => ApiError::Internal(message),
            HookError::Transport(_) => ApiError::internal("Sending request to hook server failed."),
            HookError::Remote { status, message } => ApiError::from_status(status, message),
            HookError::UnknownFunction(name) => {
                ApiError::not_found(format!("Function with name '{}' not found.", name))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerPhase {
    Before,
    After,
}

impl TriggerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// A mutation about to happen (or that happened) on `class`. Owned so that after-phase
/// events can move into a detached task.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub class: String,
    pub phase: TriggerPhase,
    pub verb: Verb,
    pub params: QueryParams,
    pub body: Option<Document>,
    /// The caller's user document, password removed.
    pub user: Option<Document>,
}

impl TriggerEvent {
    pub fn payload(&self) -> HookPayload<'_> {
        HookPayload {
            res: None,
            user: self.user.as_ref(),
            parameters: &self.params,
            body: self.body.as_ref(),
        }
    }
}

/// A function invocation: `name` applied to the resource at `res`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub res: String,
    pub user: Option<Document>,
    pub parameters: QueryParams,
    pub body: Option<Document>,
}

impl FunctionCall {
    pub fn payload(&self) -> HookPayload<'_> {
        HookPayload {
            res: Some(&self.res),
            user: self.user.as_ref(),
            parameters: &self.parameters,
            body: self.body.as_ref(),
        }
    }
}

/// JSON body posted to webhook and function endpoints.
#[derive(Debug, Serialize)]
pub struct HookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res: Option<&'a str>,
    pub user: Option<&'a Document>,
    pub parameters: &'a QueryParams,
    pub body: Option<&'a Document>,
}

/// Interprets a JSON reply body: objects are taken as they are, anything else is ignored.
pub fn object_body(body: Option<Value>) -> Option<Map<String, Value>> {
    match body {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}
