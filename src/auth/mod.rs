//! Authentication & Authorization Module
//!
//! Decides who the caller is and what they may do on a resource. Roles are flat tokens
//! (`*`, `user:<id>`, `role:<name>`) and objects carry their own ACL under `_acl`.
//!
//! ## Submodules
//! - **`gate`**: `PermissionGate`, principal resolution and the grant decision.
//! - **`permissions`**: Abilities, the verb-to-ability mapping and ACL evaluation.
//! - **`principal`**: The caller and its derived role set.
//! - **`credentials`**: HS256 bearer tokens.
//! - **`passwords`**: Salted, iterated password hashes.
//! - **`providers`**: Facebook and Google token verification for registration.

pub mod credentials;
pub mod gate;
pub mod passwords;
pub mod permissions;
pub mod principal;
pub mod providers;

#[cfg(test)]
mod tests;
