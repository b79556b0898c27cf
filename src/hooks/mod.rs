//! Hooks Module
//!
//! Everything the server calls out to besides the document store: before/after triggers
//! around mutations, server-side functions and password mail delivery. Each concern sits
//! behind a trait so the dispatcher never knows whether it is talking to an in-process
//! implementation or a remote endpoint.
//!
//! ## Submodules
//! - **`triggers`**: `TriggerService`, the webhook implementation and a no-op default.
//! - **`functions`**: `FunctionService`, the in-process registry and the remote fallback.
//! - **`mailer`**: `Mailer` for reset-password delivery.
//! - **`client`**: Shared outbound HTTP client with transport retries.
//! - **`types`**: Events, calls, payloads and `HookError`.

pub mod client;
pub mod functions;
pub mod mailer;
pub mod triggers;
pub mod types;
