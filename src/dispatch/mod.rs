//! Dispatch Module
//!
//! The logic each resource node runs once a request has reached it. The node itself only
//! routes; the [`dispatcher::Dispatcher`] is the `RequestHandler` it hands requests to.
//!
//! ## Submodules
//! - **`dispatcher`**: Legality, permission, execution and trigger wrapping.
//! - **`legality`**: The verb × node kind matrix.
//! - **`query`**: Collection query parameters (`where`, `sort`, `limit`, `skip`, `aggregate`).
//! - **`account`**: Register, login, change password and reset password.
//! - **`expand`**: Reference expansion.
//! - **`redact`**: Password removal from outgoing bodies.

pub mod account;
pub mod dispatcher;
pub mod expand;
pub mod legality;
pub mod query;
pub mod redact;
