//! Document Storage Module
//!
//! The persistence boundary of the server. Resource nodes never touch a database
//! directly; they go through the [`store::DataStore`] and [`files::FileStore`] traits,
//! which are injected at construction.
//!
//! ## Submodules
//! - **`store`**: The `DataStore` contract and its error type.
//! - **`memory`**: `MemoryStore`, a concurrent in-process implementation.
//! - **`filter`**: Filter, sort and aggregation-pipeline evaluation used by `MemoryStore`.
//! - **`files`**: Blob storage for the reserved `files` class.
//! - **`types`**: The `Document` model, reserved field names and result types.

pub mod files;
pub mod filter;
pub mod memory;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
