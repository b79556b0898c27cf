//! Query evaluation for the in-memory store.
//!
//! Supports the subset of the document query language the API exposes: field equality,
//! comparison operators, `$in`/`$nin`, `$exists`, `$and`/`$or` and dotted field paths,
//! plus the `$match`, `$sort`, `$skip`, `$limit`, `$project` and `$count` pipeline stages.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::store::{StoreError, StoreResult};
use super::types::{Document, ID_FIELD, SortOrder};

/// Resolves a dotted path (`author.name`, `tags.0`) inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidQuery(format!(
                    "Unsupported operator '{}'.",
                    op
                )));
            }
            field => field_matches(lookup(doc, field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, value: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let invalid = || StoreError::InvalidQuery(format!("'{}' expects an array of objects.", operator));
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|clause| clause.as_object().ok_or_else(invalid))
        .collect()
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    let operators = match condition {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops,
        literal => return Ok(equals(actual, literal)),
    };

    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => compare(actual, operand) == Some(Ordering::Greater),
            "$gte" => matches!(
                compare(actual, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lt" => compare(actual, operand) == Some(Ordering::Less),
            "$lte" => matches!(
                compare(actual, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" => candidates(op, operand)?
                .iter()
                .any(|candidate| equals(actual, candidate)),
            "$nin" => !candidates(op, operand)?
                .iter()
                .any(|candidate| equals(actual, candidate)),
            "$exists" => {
                let expected = operand.as_bool().ok_or_else(|| {
                    StoreError::InvalidQuery("'$exists' expects a boolean.".to_string())
                })?;
                actual.is_some() == expected
            }
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "Unsupported operator '{}'.",
                    other
                )));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn candidates<'a>(operator: &str, operand: &'a Value) -> StoreResult<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("'{}' expects an array.", operator)))
}

/// Equality with array-contains semantics: a scalar matches an array holding it.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    compare_values(actual?, operand)
}

/// Orders two values of the same JSON type. Mixed types are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Parses a sort expression such as `-createdAt,title`. A leading `-` sorts descending.
pub fn parse_sort(expression: &str) -> Vec<(String, SortOrder)> {
    expression
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| match field.strip_prefix('-') {
            Some(name) => (name.to_string(), SortOrder::Descending),
            None => (
                field.trim_start_matches('+').to_string(),
                SortOrder::Ascending,
            ),
        })
        .collect()
}

/// Stable sort; documents missing a key order before documents that have it.
pub fn sort_documents(docs: &mut [Document], keys: &[(String, SortOrder)]) {
    docs.sort_by(|a, b| {
        for (field, order) in keys {
            let ordering = match (lookup(a, field), lookup(b, field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Value]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let (operator, argument) = stage
            .as_object()
            .filter(|stage| stage.len() == 1)
            .and_then(|stage| stage.iter().next())
            .ok_or_else(|| {
                StoreError::InvalidQuery(
                    "Each aggregate stage must be an object with a single operator.".to_string(),
                )
            })?;

        docs = match operator.as_str() {
            "$match" => {
                let filter = stage_object(operator, argument)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => {
                let mut keys = Vec::new();
                for (field, direction) in stage_object(operator, argument)? {
                    let order = match direction.as_i64() {
                        Some(1) => SortOrder::Ascending,
                        Some(-1) => SortOrder::Descending,
                        _ => {
                            return Err(StoreError::InvalidQuery(
                                "'$sort' directions must be 1 or -1.".to_string(),
                            ));
                        }
                    };
                    keys.push((field.clone(), order));
                }
                sort_documents(&mut docs, &keys);
                docs
            }
            "$skip" => {
                let count = stage_count(operator, argument)?;
                docs.into_iter().skip(count).collect()
            }
            "$limit" => {
                let count = stage_count(operator, argument)?;
                docs.into_iter().take(count).collect()
            }
            "$project" => project(docs, stage_object(operator, argument)?)?,
            "$count" => {
                let field = argument.as_str().filter(|f| !f.is_empty()).ok_or_else(|| {
                    StoreError::InvalidQuery("'$count' expects a field name.".to_string())
                })?;
                let mut counted = Map::new();
                counted.insert(field.to_string(), Value::from(docs.len()));
                vec![counted]
            }
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "Unsupported aggregate stage '{}'.",
                    other
                )));
            }
        };
    }
    Ok(docs)
}

fn stage_object<'a>(operator: &str, argument: &'a Value) -> StoreResult<&'a Document> {
    argument
        .as_object()
        .ok_or_else(|| StoreError::InvalidQuery(format!("'{}' expects an object.", operator)))
}

fn stage_count(operator: &str, argument: &Value) -> StoreResult<usize> {
    argument
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| {
            StoreError::InvalidQuery(format!("'{}' expects a non-negative integer.", operator))
        })
}

fn project(docs: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let flag = |value: &Value| match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    };

    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut keep_id = true;
    for (field, value) in spec {
        let on = flag(value).ok_or_else(|| {
            StoreError::InvalidQuery("'$project' values must be 0, 1 or booleans.".to_string())
        })?;
        if field == ID_FIELD {
            keep_id = on;
        } else if on {
            include.push(field.as_str());
        } else {
            exclude.push(field.as_str());
        }
    }
    if !include.is_empty() && !exclude.is_empty() {
        return Err(StoreError::InvalidQuery(
            "'$project' cannot mix inclusion and exclusion.".to_string(),
        ));
    }

    Ok(docs
        .into_iter()
        .map(|mut doc| {
            if !include.is_empty() {
                doc.retain(|key, _| {
                    include.contains(&key.as_str()) || (keep_id && key == ID_FIELD)
                });
            } else {
                doc.retain(|key, _| !exclude.contains(&key.as_str()));
                if !keep_id {
                    doc.remove(ID_FIELD);
                }
            }
            doc
        })
        .collect())
}
