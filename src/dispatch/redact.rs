use serde_json::Value;

use crate::storage::types::{Document, PASSWORD_FIELD};

/// Strips `password` from a response body and from every object in its `data` array.
pub fn redact(body: &mut Document) {
    body.remove(PASSWORD_FIELD);
    if let Some(Value::Array(items)) = body.get_mut("data") {
        for item in items.iter_mut() {
            if let Value::Object(doc) = item {
                doc.remove(PASSWORD_FIELD);
            }
        }
    }
}

pub fn redacted(mut doc: Document) -> Document {
    doc.remove(PASSWORD_FIELD);
    doc
}
