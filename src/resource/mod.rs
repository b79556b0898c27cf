//! Resource Tree Module
//!
//! Maps slash-delimited resource paths onto a dynamically grown tree of concurrent
//! workers, one per path. Nodes are created lazily by their parent the first time a
//! message addresses them or one of their descendants.
//!
//! ## Submodules
//! - **`types`**: Paths, node kinds, verbs and the request/response envelopes.
//! - **`router`**: Pure next-hop computation.
//! - **`node`**: The per-path actor loop, its handler seam and idle reaping.
//! - **`tree`**: Bootstraps the root node and submits requests to it.

pub mod node;
pub mod router;
pub mod tree;
pub mod types;
