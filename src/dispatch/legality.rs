//! Which verb may be applied to which kind of node.
//!
//! | verb \ kind | collection | item   | function |
//! |-------------|------------|--------|----------|
//! | GET         | query      | fetch  | -        |
//! | POST        | create     | -      | invoke   |
//! | PUT         | -          | update | -        |
//! | DELETE      | -          | delete | -        |
//!
//! Root and attribute nodes accept nothing.

use crate::error::{ApiError, ApiResult};
use crate::resource::types::{NodeKind, Verb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Fetch,
    Create,
    Update,
    Delete,
    Invoke,
}

pub fn operation_for(kind: NodeKind, verb: Verb) -> ApiResult<Operation> {
    let operation = match (kind, verb) {
        (NodeKind::Collection, Verb::Get) => Some(Operation::Query),
        (NodeKind::Collection, Verb::Post) => Some(Operation::Create),
        (NodeKind::Item, Verb::Get) => Some(Operation::Fetch),
        (NodeKind::Item, Verb::Put) => Some(Operation::Update),
        (NodeKind::Item, Verb::Delete) => Some(Operation::Delete),
        (NodeKind::Function, Verb::Post) => Some(Operation::Invoke),
        _ => None,
    };
    operation.ok_or_else(|| {
        ApiError::bad_request(format!(
            "{} is not allowed on {} resources.",
            verb,
            kind.as_str()
        ))
    })
}
