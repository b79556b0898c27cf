//! Reference expansion.
//!
//! A reference is an object of exactly three fields:
//! `{"_type": "reference", "_class": "users", "_id": "42"}`. `expand=author,post(author)`
//! replaces `author` by the referenced user and expands `author` inside the referenced
//! post as well. Plain embedded objects are descended into without a fetch.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::redact::redacted;
use crate::error::{ApiError, ApiResult};
use crate::storage::store::DataStore;
use crate::storage::types::{Document, ID_FIELD};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandField {
    pub name: String,
    pub children: Vec<ExpandField>,
}

/// Parses `a,b(c,d(e))`. Commas inside parentheses belong to the nested list.
pub fn parse_expand(config: &str) -> ApiResult<Vec<ExpandField>> {
    let mut fields = Vec::new();
    for part in split_top_level(config)? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let field = match part.find('(') {
            Some(open) => {
                if !part.ends_with(')') {
                    return Err(invalid_expand(config));
                }
                ExpandField {
                    name: part[..open].trim().to_string(),
                    children: parse_expand(&part[open + 1..part.len() - 1])?,
                }
            }
            None => ExpandField {
                name: part.to_string(),
                children: Vec::new(),
            },
        };
        if field.name.is_empty() {
            return Err(invalid_expand(config));
        }
        fields.push(field);
    }
    Ok(fields)
}

fn invalid_expand(config: &str) -> ApiError {
    ApiError::bad_request(format!("Expand parameter '{}' is not valid.", config))
}

fn split_top_level(config: &str) -> ApiResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in config.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(|| invalid_expand(config))?,
            ',' if depth == 0 => {
                parts.push(&config[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid_expand(config));
    }
    parts.push(&config[start..]);
    Ok(parts)
}

/// `(class, id)` of a reference object.
pub fn as_reference(value: &Value) -> Option<(&str, &str)> {
    let Value::Object(map) = value else {
        return None;
    };
    if map.len() != 3 || map.get("_type").and_then(Value::as_str) != Some("reference") {
        return None;
    }
    let class = map.get("_class").and_then(Value::as_str)?;
    let id = map.get(ID_FIELD).and_then(Value::as_str)?;
    Some((class, id))
}

type ExpandFuture<'a> = Pin<Box<dyn Future<Output = ApiResult<()>> + Send + 'a>>;

pub struct Expander {
    store: Arc<dyn DataStore>,
}

impl Expander {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Expands `fields` of `doc` in place. Missing and non-object fields are left alone;
    /// a dangling reference fails the whole expansion.
    pub fn expand_item<'a>(&'a self, doc: &'a mut Document, fields: &'a [ExpandField]) -> ExpandFuture<'a> {
        Box::pin(async move {
            for field in fields {
                let Some(value) = doc.get(&field.name) else {
                    continue;
                };
                let mut target = match as_reference(value) {
                    Some((class, id)) => redacted(self.store.get_by_id(class, id).await?),
                    None => match value {
                        Value::Object(map) => map.clone(),
                        _ => continue,
                    },
                };
                if !field.children.is_empty() {
                    self.expand_item(&mut target, &field.children).await?;
                }
                doc.insert(field.name.clone(), Value::Object(target));
            }
            Ok(())
        })
    }

    pub async fn expand_all(&self, docs: &mut [Document], fields: &[ExpandField]) -> ApiResult<()> {
        for doc in docs.iter_mut() {
            self.expand_item(doc, fields).await?;
        }
        Ok(())
    }
}
