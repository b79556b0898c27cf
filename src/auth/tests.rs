//! Auth Module Tests
//!
//! ## Test Scopes
//! - **Permissions**: Verb-to-ability mapping, defaults, ACL union and role monotonicity.
//! - **Principal**: Role derivation from the user document.
//! - **Credentials**: Token round trip, tampering, expiry and claim contents.
//! - **Passwords**: Hash format, salting and verification.
//! - **Gate**: Principal resolution, bypassed account paths and ACL-gated decisions.

#[cfg(test)]
mod tests {
    use crate::auth::credentials::{
        CredentialError, CredentialService, HmacCredentials, TOKEN_VERSION, TokenClaims, TokenUser,
    };
    use crate::auth::gate::{PermissionGate, bearer_token};
    use crate::auth::passwords::{PasswordHasher, SaltedSha256};
    use crate::auth::permissions::{Ability, PermissionSet, required_abilities};
    use crate::auth::principal::Principal;
    use crate::error::ApiError;
    use crate::resource::types::{NodeInfo, ResourcePath, Verb};
    use crate::storage::files::{FileStore, MemoryFileStore};
    use crate::storage::memory::MemoryStore;
    use crate::storage::types::Document;
    use axum::http::HeaderMap;
    use bytes::Bytes;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn credentials() -> Arc<HmacCredentials> {
        Arc::new(HmacCredentials::new(
            b"test-signing-key".to_vec(),
            Duration::from_secs(3600),
        ))
    }

    fn auth_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {}", token).parse().unwrap());
        headers
    }

    fn node(path: &str) -> NodeInfo {
        NodeInfo::for_path(ResourcePath::parse(path))
    }

    /// Store with user `bob` (role `editor`), an open post `p1` and a post `p2` whose ACL
    /// only lets `role:editor` update it.
    fn seeded() -> (Arc<MemoryStore>, PermissionGate, Arc<HmacCredentials>) {
        let store = MemoryStore::new();
        store
            .insert_raw(
                "users",
                doc(json!({"_id": "bob", "username": "bob", "_roles": ["editor"]})),
            )
            .unwrap();
        store
            .insert_raw("posts", doc(json!({"_id": "p1", "title": "open"})))
            .unwrap();
        store
            .insert_raw(
                "posts",
                doc(json!({
                    "_id": "p2",
                    "title": "guarded",
                    "_acl": {"*": {"get": true}, "role:editor": {"update": true}}
                })),
            )
            .unwrap();
        let credentials = credentials();
        let gate = PermissionGate::new(store.clone(), credentials.clone());
        (store, gate, credentials)
    }

    // ============================================================
    // PERMISSION TESTS
    // ============================================================

    #[test]
    fn test_required_abilities_per_verb() {
        assert_eq!(required_abilities(Verb::Get), &[Ability::Get, Ability::Query]);
        assert_eq!(required_abilities(Verb::Post), &[Ability::Create]);
        assert_eq!(required_abilities(Verb::Put), &[Ability::Update]);
        assert_eq!(required_abilities(Verb::Delete), &[Ability::Delete]);
    }

    #[test]
    fn test_default_permission_sets() {
        let collection = PermissionSet::collection_defaults();
        assert!(collection.allows_verb(Verb::Get));
        assert!(collection.allows_verb(Verb::Post));
        assert!(!collection.allows_verb(Verb::Put));
        assert!(!collection.allows_verb(Verb::Delete));

        let object = PermissionSet::object_defaults();
        assert!(object.allows_verb(Verb::Get));
        assert!(!object.allows_verb(Verb::Post));
        assert!(object.allows_verb(Verb::Put));
        assert!(object.allows_verb(Verb::Delete));
    }

    #[test]
    fn test_acl_union_counts_only_true_entries() {
        let acl = doc(json!({
            "*": {"get": true, "delete": false},
            "user:u1": {"update": true, "bogus": true},
            "role:admin": {"delete": true}
        }));

        let anonymous = PermissionSet::from_acl(&acl, ["*"]);
        let user = PermissionSet::from_acl(&acl, ["*", "user:u1"]);

        assert_eq!(anonymous, PermissionSet::of(&[Ability::Get]));
        assert_eq!(user, PermissionSet::of(&[Ability::Get, Ability::Update]));
    }

    #[test]
    fn test_grant_is_monotonic_in_roles() {
        let acl = doc(json!({
            "*": {"get": true},
            "role:a": {"update": true},
            "role:b": {"delete": true},
            "user:x": {"create": true}
        }));
        let universe = ["*", "role:a", "role:b", "user:x", "role:none"];

        // Every subset against every superset obtained by adding one more role.
        for mask in 0u32..(1 << universe.len()) {
            let subset: Vec<&str> = (0..universe.len())
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| universe[i])
                .collect();
            let smaller = PermissionSet::from_acl(&acl, subset.iter().copied());
            for extra in universe {
                let mut bigger_roles = subset.clone();
                bigger_roles.push(extra);
                let bigger = PermissionSet::from_acl(&acl, bigger_roles.iter().copied());
                for verb in Verb::ALL {
                    if smaller.allows_verb(verb) {
                        assert!(bigger.allows_verb(verb), "{:?} + {} lost {}", subset, extra, verb);
                    }
                }
            }
        }
    }

    // ============================================================
    // PRINCIPAL TESTS
    // ============================================================

    #[test]
    fn test_anonymous_holds_only_everyone_role() {
        let principal = Principal::anonymous();

        assert!(principal.is_anonymous());
        assert_eq!(principal.roles, BTreeSet::from(["*".to_string()]));
    }

    #[test]
    fn test_user_roles_are_derived_from_document() {
        let principal = Principal::from_user(doc(json!({"_id": "u1", "_roles": ["admin", "ops", 3]})));

        let expected: BTreeSet<String> = ["*", "user:u1", "role:admin", "role:ops"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(principal.roles, expected);
        assert_eq!(principal.user_id.as_deref(), Some("u1"));
    }

    // ============================================================
    // CREDENTIAL TESTS
    // ============================================================

    #[test]
    fn test_issued_token_verifies_with_user_claims() {
        let service = credentials();

        let token = service
            .issue("u1", &doc(json!({"username": "alice", "email": ""})))
            .unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(claims.ver, TOKEN_VERSION);
        assert_eq!(claims.user.user_id, "u1");
        assert_eq!(claims.user.username.as_deref(), Some("alice"));
        assert_eq!(claims.user.email, None);
    }

    #[test]
    fn test_token_signed_with_other_key_is_rejected() {
        let other = HmacCredentials::new(b"another-key".to_vec(), Duration::from_secs(60));
        let token = other.issue("u1", &Document::new()).unwrap();

        assert_eq!(credentials().verify(&token), Err(CredentialError::BadSignature));
    }

    #[test]
    fn test_expired_and_malformed_tokens_are_rejected() {
        let service = credentials();
        let expired = service.sign_for_test(&TokenClaims {
            ver: TOKEN_VERSION.to_string(),
            exp: 1,
            user: TokenUser {
                user_id: "u1".into(),
                username: None,
                email: None,
            },
        });

        assert_eq!(service.verify(&expired), Err(CredentialError::Expired));
        assert_eq!(service.verify("not-a-token"), Err(CredentialError::Malformed));
        assert_eq!(service.verify("a.b.c.d"), Err(CredentialError::Malformed));
    }

    #[test]
    fn test_huge_ttl_token_saturates_expiry() {
        let service = HmacCredentials::new(b"test-key".to_vec(), Duration::MAX);

        let token = service.issue("u1", &Document::new()).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.exp, i64::MAX);
    }

    #[test]
    fn test_bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "raw-token".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("raw-token"));

        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    // ============================================================
    // PASSWORD TESTS
    // ============================================================

    #[test]
    fn test_password_hash_verifies_and_is_salted() {
        let hasher = SaltedSha256::with_rounds(50);

        let first = hasher.hash("s3cret").unwrap();
        let second = hasher.hash("s3cret").unwrap();

        assert!(first.starts_with("sha256$50$"));
        assert_ne!(first, second);
        assert!(hasher.verify("s3cret", &first));
        assert!(hasher.verify("s3cret", &second));
        assert!(!hasher.verify("wrong", &first));
        assert!(!hasher.verify("s3cret", "s3cret"));
    }

    // ============================================================
    // GATE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_missing_token_resolves_anonymous() {
        let (_, gate, _) = seeded();

        let principal = gate.resolve_principal(&HeaderMap::new()).await.unwrap();

        assert!(principal.is_anonymous());
    }

    #[tokio::test]
    async fn test_valid_token_loads_user_roles() {
        let (_, gate, credentials) = seeded();
        let token = credentials.issue("bob", &Document::new()).unwrap();

        let principal = gate.resolve_principal(&auth_headers(&token)).await.unwrap();

        assert!(principal.roles.contains("role:editor"));
        assert!(principal.roles.contains("user:bob"));
        assert_eq!(principal.user.unwrap()["username"], json!("bob"));
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized_except_leniently() {
        let (_, gate, _) = seeded();
        let headers = auth_headers("garbage");

        let strict = gate.resolve_principal(&headers).await;
        let lenient = gate.resolve_lenient(&headers).await.unwrap();

        assert!(matches!(strict, Err(ApiError::Unauthorized(_))));
        assert!(lenient.is_anonymous());
    }

    #[tokio::test]
    async fn test_token_of_deleted_user_is_unauthorized() {
        let (_, gate, credentials) = seeded();
        let token = credentials.issue("ghost", &Document::new()).unwrap();

        let result = gate.resolve_principal(&auth_headers(&token)).await;

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_account_paths_are_always_granted() {
        let (_, gate, _) = seeded();
        let anonymous = Principal::anonymous();

        for path in ["/login", "/register", "/resetpassword", "/changepassword"] {
            for verb in Verb::ALL {
                assert!(gate.authorize(&node(path), verb, &anonymous).await.is_ok());
            }
        }
    }

    #[tokio::test]
    async fn test_object_without_acl_gets_defaults() {
        let (_, gate, _) = seeded();
        let anonymous = Principal::anonymous();

        assert!(gate.authorize(&node("/posts/p1"), Verb::Put, &anonymous).await.is_ok());
        assert!(gate.authorize(&node("/posts/p1"), Verb::Delete, &anonymous).await.is_ok());
    }

    #[tokio::test]
    async fn test_acl_gated_update() {
        // ARRANGE
        let (store, gate, _) = seeded();
        let editor = Principal::from_user(
            crate::storage::store::DataStore::get_by_id(store.as_ref(), "users", "bob")
                .await
                .unwrap(),
        );
        let anonymous = Principal::anonymous();

        // ACT
        let as_anonymous = gate.authorize(&node("/posts/p2"), Verb::Put, &anonymous).await;
        let as_editor = gate.authorize(&node("/posts/p2"), Verb::Put, &editor).await;
        let read = gate.authorize(&node("/posts/p2"), Verb::Get, &anonymous).await;
        let delete = gate.authorize(&node("/posts/p2"), Verb::Delete, &editor).await;

        // ASSERT
        assert!(matches!(as_anonymous, Err(ApiError::Unauthorized(_))));
        assert!(as_editor.is_ok());
        assert!(read.is_ok());
        assert!(matches!(delete, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_missing_object_propagates_not_found() {
        let (_, gate, _) = seeded();

        let result = gate
            .authorize(&node("/posts/missing"), Verb::Get, &Principal::anonymous())
            .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_items_are_resolved_through_file_store() {
        // ARRANGE
        let (store, _, credentials) = seeded();
        let files = MemoryFileStore::new();
        let stored = files
            .put(Some("a.txt"), None, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let gate = PermissionGate::new(store, credentials).with_files(files);
        let anonymous = Principal::anonymous();

        // ACT
        let existing = gate
            .authorize(&node(&format!("/files/{}", stored.id)), Verb::Get, &anonymous)
            .await;
        let missing = gate.authorize(&node("/files/nothing"), Verb::Get, &anonymous).await;

        // ASSERT
        assert!(existing.is_ok());
        assert_eq!(missing, Err(ApiError::not_found("File not found.")));
    }

    #[tokio::test]
    async fn test_function_is_evaluated_on_its_base_resource() {
        let (_, gate, _) = seeded();
        let anonymous = Principal::anonymous();

        // POST needs `create`: granted on collections, not on objects by default.
        assert!(gate.authorize(&node("/posts/-count"), Verb::Post, &anonymous).await.is_ok());
        assert!(gate.authorize(&node("/-hello"), Verb::Post, &anonymous).await.is_ok());
        assert!(matches!(
            gate.authorize(&node("/posts/p1/-like"), Verb::Post, &anonymous).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_deep_paths_cannot_be_evaluated() {
        let (_, gate, _) = seeded();

        let result = gate
            .authorize(&node("/posts/p1/title"), Verb::Get, &Principal::anonymous())
            .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
