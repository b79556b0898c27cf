use serde_json::Value;
use std::collections::BTreeSet;

use crate::storage::types::{Document, ID_FIELD, ROLES_FIELD};

/// Role token held by every principal, authenticated or not.
pub const EVERYONE: &str = "*";

/// The caller a request is evaluated for.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: Option<String>,
    pub roles: BTreeSet<String>,
    /// The caller's stored user document, when authenticated.
    pub user: Option<Document>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            roles: BTreeSet::from([EVERYONE.to_string()]),
            user: None,
        }
    }

    /// Roles are `*`, `user:<_id>` and one `role:<r>` per string entry of `_roles`.
    pub fn from_user(user: Document) -> Self {
        let mut principal = Self::anonymous();
        if let Some(id) = user.get(ID_FIELD).and_then(Value::as_str) {
            principal.roles.insert(format!("user:{}", id));
            principal.user_id = Some(id.to_string());
        }
        if let Some(Value::Array(roles)) = user.get(ROLES_FIELD) {
            for role in roles.iter().filter_map(Value::as_str) {
                principal.roles.insert(format!("role:{}", role));
            }
        }
        principal.user = Some(user);
        principal
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}
