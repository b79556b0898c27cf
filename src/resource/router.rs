//! Path routing between resource nodes.
//!
//! A node that is not the addressee of a message forwards it one level down. The routing
//! decision needs nothing but two strings, so it lives here as pure functions.

/// The single path segment, directly below `own`, on the way to `target`.
///
/// Both paths are slash-trimmed first, so `"/users/"` and `"/users"` route identically.
pub fn next_segment<'a>(target: &'a str, own: &str) -> &'a str {
    let target = target.trim_matches('/');
    let own = own.trim_matches('/');
    let suffix = target.get(own.len()..).unwrap_or_default().trim_matches('/');
    suffix.split('/').next().unwrap_or_default()
}

/// Full path of the child of `own` that a message for `target` is forwarded to.
///
/// `next_hop("/users/123/", "/users/") == "/users/123"`.
pub fn next_hop(target: &str, own: &str) -> String {
    let segment = next_segment(target, own);
    let own = own.trim_matches('/');
    if own.is_empty() {
        format!("/{}", segment)
    } else {
        format!("/{}/{}", own, segment)
    }
}
