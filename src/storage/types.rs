use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored object: an ordered string-keyed map of JSON values.
pub type Document = Map<String, Value>;

/// Class holding user accounts. Its documents carry `_roles` and a hashed `password`.
pub const USERS_CLASS: &str = "users";
/// Class whose collection is backed by the file store instead of the document store.
pub const FILES_CLASS: &str = "files";

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const ACL_FIELD: &str = "_acl";
pub const ROLES_FIELD: &str = "_roles";
pub const PASSWORD_FIELD: &str = "password";

/// Result of a successful insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: String,
    pub created_at: i32,
}

/// Result of a successful merge update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updated {
    pub updated_at: i32,
}

/// Sort direction of a single sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A find-style query against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Option<Document>,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    /// Equality filter on a single (possibly dotted) field.
    pub fn field_equals(field: &str, value: Value) -> Self {
        let mut condition = Map::new();
        condition.insert("$eq".to_string(), value);
        let mut filter = Map::new();
        filter.insert(field.to_string(), Value::Object(condition));
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

/// Current unix time in seconds, the resolution of the reserved timestamp fields.
pub fn now_secs() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i32
}

/// Generates a fresh 32 hex character document identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
