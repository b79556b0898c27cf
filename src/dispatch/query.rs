//! Query parameters of a collection GET.
//!
//! Every value is JSON encoded: `where={"votes":{"$gt":3}}`, `sort="-createdAt"`,
//! `limit=10`, `skip=20`, `aggregate=[{"$match":{}}]`. Only `expand` is a plain string.

use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::resource::types::QueryParams;
use crate::storage::filter::parse_sort;
use crate::storage::types::QuerySpec;

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionQuery {
    Find(QuerySpec),
    Aggregate(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub query: CollectionQuery,
    pub expand: Option<String>,
}

fn json_param(params: &QueryParams, key: &str) -> ApiResult<Option<Value>> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("Parsing {} parameter failed.", key))),
    }
}

fn usize_param(params: &QueryParams, key: &str) -> ApiResult<Option<usize>> {
    match json_param(params, key)? {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ApiError::bad_request(format!("The key '{}' must be an integer.", key))),
    }
}

pub fn parse_collection_query(params: &QueryParams) -> ApiResult<QueryOptions> {
    if params.contains_key("where") && params.contains_key("aggregate") {
        return Err(ApiError::bad_request(
            "Where and aggregate parameters cannot be used at the same request.",
        ));
    }

    let expand = params
        .get("expand")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(pipeline) = json_param(params, "aggregate")? {
        let Value::Array(stages) = pipeline else {
            return Err(ApiError::bad_request("The key 'aggregate' must be a JSON array."));
        };
        return Ok(QueryOptions {
            query: CollectionQuery::Aggregate(stages),
            expand,
        });
    }

    let filter = match json_param(params, "where")? {
        None => None,
        Some(Value::Object(filter)) => Some(filter),
        Some(_) => return Err(ApiError::bad_request("The key 'where' must be a JSON object.")),
    };
    let sort = match json_param(params, "sort")? {
        None => Vec::new(),
        Some(Value::String(expression)) => parse_sort(&expression),
        Some(_) => return Err(ApiError::bad_request("The key 'sort' must be a valid string.")),
    };

    Ok(QueryOptions {
        query: CollectionQuery::Find(QuerySpec {
            filter,
            sort,
            skip: usize_param(params, "skip")?,
            limit: usize_param(params, "limit")?,
        }),
        expand,
    })
}
