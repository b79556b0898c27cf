//! Schema-less Object Storage Server Library
//!
//! Every resource path (`/`, `/posts`, `/posts/42`, `/posts/42/-like`) is owned by its own
//! actor in a lazily grown tree. Requests enter at the root and are forwarded one segment
//! at a time until they reach the node that owns their path, which then runs them.
//!
//! ## Architecture Modules
//! - **`resource`**: Paths, node kinds, the router and the node actors themselves.
//! - **`dispatch`**: What a node does with a request addressed to it: legality,
//!   permissions, storage operations, account flows and triggers.
//! - **`auth`**: Principals, ACL evaluation, access tokens, password hashing and
//!   third-party identity providers.
//! - **`storage`**: The `DataStore` and `FileStore` seams with in-memory implementations.
//! - **`hooks`**: Webhook triggers, server-side functions and password mails.
//! - **`http`**: The axum transport.
//! - **`config`** and **`app`**: Configuration file and server wiring.

pub mod app;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod http;
pub mod resource;
pub mod storage;
