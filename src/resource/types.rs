use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;

use crate::error::ApiError;
use crate::storage::types::{Document, USERS_CLASS};

/// Segments starting with this marker address a server-side function, whatever their depth.
pub const FUNCTION_MARKER: char = '-';

pub type QueryParams = HashMap<String, String>;

/// Normalized slash-delimited address of a node: leading `/`, no trailing `/`
/// (except the root itself), no empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn parse(raw: &str) -> Self {
        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        Self(format!("/{}", segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn first_segment(&self) -> Option<&str> {
        self.segments().next()
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn child(&self, segment: &str) -> Self {
        if self.is_root() {
            Self(format!("/{}", segment))
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }

    /// Splits a function address into the resource it operates on and the function name:
    /// `/posts/12/-like` becomes (`/posts/12`, `like`).
    pub fn function_target(&self) -> Option<(ResourcePath, &str)> {
        let last = self.last_segment()?;
        let name = last.strip_prefix(FUNCTION_MARKER)?;
        let base_len = self.0.len() - last.len();
        Some((ResourcePath::parse(&self.0[..base_len]), name))
    }

    pub fn is_account_path(&self) -> bool {
        AccountRoute::for_path(self).is_some()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed account paths. They bypass the legality matrix and the permission check,
/// and are always bound to the `users` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRoute {
    Login,
    Register,
    ResetPassword,
    ChangePassword,
}

impl AccountRoute {
    pub fn for_path(path: &ResourcePath) -> Option<Self> {
        match path.as_str().to_ascii_lowercase().as_str() {
            "/login" => Some(Self::Login),
            "/register" => Some(Self::Register),
            "/resetpassword" => Some(Self::ResetPassword),
            "/changepassword" => Some(Self::ChangePassword),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Collection,
    Item,
    Attribute,
    Function,
}

impl NodeKind {
    pub fn classify(path: &ResourcePath) -> Self {
        if path
            .last_segment()
            .is_some_and(|segment| segment.starts_with(FUNCTION_MARKER))
        {
            return Self::Function;
        }
        match path.depth() {
            0 => Self::Root,
            1 => Self::Collection,
            2 => Self::Item,
            _ => Self::Attribute,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Collection => "collection",
            Self::Item => "item",
            Self::Attribute => "attribute",
            Self::Function => "function",
        }
    }
}

/// Class (collection name) a node operates on: the first path segment, or `users` for
/// the fixed account paths. Root and root-level functions are bound to no class.
pub fn bound_class(path: &ResourcePath) -> Option<String> {
    if path.is_account_path() {
        return Some(USERS_CLASS.to_string());
    }
    path.first_segment()
        .filter(|segment| !segment.starts_with(FUNCTION_MARKER))
        .map(str::to_string)
}

/// Identity of a resource node, shared with the request handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub path: ResourcePath,
    pub kind: NodeKind,
    pub class: Option<String>,
}

impl NodeInfo {
    pub fn for_path(path: ResourcePath) -> Self {
        let kind = NodeKind::classify(&path);
        let class = bound_class(&path);
        Self { path, kind, class }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::Get, Verb::Post, Verb::Put, Verb::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

impl TryFrom<&Method> for Verb {
    type Error = ApiError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match *method {
            Method::GET => Ok(Self::Get),
            Method::POST => Ok(Self::Post),
            Method::PUT => Ok(Self::Put),
            Method::DELETE => Ok(Self::Delete),
            _ => Err(ApiError::bad_request(format!(
                "Method {} is not supported.",
                method
            ))),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// One part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An inbound request as seen by the resource tree.
#[derive(Debug, Clone)]
pub struct Request {
    pub target: ResourcePath,
    pub verb: Verb,
    pub headers: HeaderMap,
    pub params: QueryParams,
    pub body: Option<Document>,
    pub raw_body: Option<Bytes>,
    pub files: Vec<UploadedFile>,
    /// Forwarding hops taken so far, incremented by each node that routes the request onward.
    pub hops: usize,
}

impl Request {
    pub fn new(verb: Verb, target: &str) -> Self {
        Self {
            target: ResourcePath::parse(target),
            verb,
            headers: HeaderMap::new(),
            params: QueryParams::new(),
            body: None,
            raw_body: None,
            files: Vec::new(),
            hops: 0,
        }
    }

    pub fn with_body(mut self, body: Document) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }
}

/// A request travelling through the tree together with its one-shot reply channel.
/// Exactly one response is written to `reply`, by the addressee node only.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

impl Envelope {
    pub fn new(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (reply, receiver) = oneshot::channel();
        (Self { request, reply }, receiver)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Option<Document>,
    pub raw: Option<RawContent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    pub content_type: String,
    pub bytes: Bytes,
}

impl Response {
    pub fn with_body(status: StatusCode, body: Document) -> Self {
        Self {
            status,
            body: Some(body),
            raw: None,
        }
    }

    pub fn ok(body: Document) -> Self {
        Self::with_body(StatusCode::OK, body)
    }

    pub fn created(body: Document) -> Self {
        Self::with_body(StatusCode::CREATED, body)
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
            raw: None,
        }
    }

    pub fn raw(content_type: String, bytes: Bytes) -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
            raw: Some(RawContent {
                content_type,
                bytes,
            }),
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        Self::with_body(err.status(), err.body())
    }
}
