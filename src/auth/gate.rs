//! The permission gate every non-account operation passes through.
//!
//! Evaluation order: resolve the principal from the bearer token, derive the permission
//! set of the target (collection defaults, the object's `_acl`, or object defaults), then
//! grant if any ability required by the verb is in the set.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde_json::Value;
use std::sync::Arc;

use super::credentials::CredentialService;
use super::permissions::PermissionSet;
use super::principal::Principal;
use crate::error::{ApiError, ApiResult};
use crate::resource::types::{NodeInfo, ResourcePath, Verb, bound_class};
use crate::storage::files::FileStore;
use crate::storage::store::{DataStore, StoreError};
use crate::storage::types::{ACL_FIELD, FILES_CLASS, USERS_CLASS};

pub struct PermissionGate {
    store: Arc<dyn DataStore>,
    credentials: Arc<dyn CredentialService>,
    /// Items of the `files` class live here rather than in the document store.
    files: Option<Arc<dyn FileStore>>,
}

/// The credential in an `Authorization` header, with an optional `Bearer ` prefix removed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim(),
        _ => raw,
    };
    (!token.is_empty()).then_some(token)
}

impl PermissionGate {
    pub fn new(store: Arc<dyn DataStore>, credentials: Arc<dyn CredentialService>) -> Self {
        Self {
            store,
            credentials,
            files: None,
        }
    }

    pub fn with_files(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialService> {
        &self.credentials
    }

    /// Anonymous without a credential; `Unauthorized` when the credential does not verify
    /// or its user no longer exists.
    pub async fn resolve_principal(&self, headers: &HeaderMap) -> ApiResult<Principal> {
        let Some(token) = bearer_token(headers) else {
            return Ok(Principal::anonymous());
        };
        let claims = self.credentials.verify(token).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            ApiError::from(e)
        })?;

        match self.store.get_by_id(USERS_CLASS, &claims.user.user_id).await {
            Ok(user) => Ok(Principal::from_user(user)),
            Err(StoreError::NotFound) => Err(ApiError::unauthorized(
                "User of the access token doesn't exist.",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Principal resolution for the account paths: a credential that fails to verify
    /// degrades to anonymous instead of failing the request.
    pub async fn resolve_lenient(&self, headers: &HeaderMap) -> ApiResult<Principal> {
        match self.resolve_principal(headers).await {
            Err(ApiError::Unauthorized(_)) => Ok(Principal::anonymous()),
            other => other,
        }
    }

    /// Permission set of `principal` on the resource at `path`, which must be a
    /// collection or an item of `class`.
    pub async fn permissions_for(
        &self,
        class: &str,
        path: &ResourcePath,
        principal: &Principal,
    ) -> ApiResult<PermissionSet> {
        match path.depth() {
            // Root-level function targets and collections share the collection grants.
            0 | 1 => Ok(PermissionSet::collection_defaults()),
            2 if class == FILES_CLASS && self.files.is_some() => {
                let id = path.last_segment().unwrap_or_default();
                if let Some(files) = &self.files {
                    files.get(id).await.map_err(|e| match e {
                        StoreError::NotFound => ApiError::not_found("File not found."),
                        other => other.into(),
                    })?;
                }
                // Stored files carry no ACL.
                Ok(PermissionSet::object_defaults())
            }
            2 => {
                let id = path.last_segment().unwrap_or_default();
                let object = self.store.get_by_id(class, id).await?;
                Ok(match object.get(ACL_FIELD) {
                    None | Some(Value::Null) => PermissionSet::object_defaults(),
                    Some(Value::Object(acl)) => PermissionSet::from_acl(acl, principal.role_names()),
                    Some(_) => PermissionSet::default(),
                })
            }
            _ => Err(ApiError::bad_request(format!(
                "Permissions cannot be evaluated on {}.",
                path
            ))),
        }
    }

    /// Grants or denies `verb` on `node` for `principal`. Account paths are always granted.
    /// Function nodes are evaluated against the resource they are attached to.
    pub async fn authorize(&self, node: &NodeInfo, verb: Verb, principal: &Principal) -> ApiResult<()> {
        if node.path.is_account_path() {
            return Ok(());
        }

        let target = match node.path.function_target() {
            Some((base, _)) => base,
            None => node.path.clone(),
        };
        let class = bound_class(&target).unwrap_or_default();
        let permissions = self.permissions_for(&class, &target, principal).await?;

        if permissions.allows_verb(verb) {
            Ok(())
        } else {
            tracing::debug!(
                "Denied {} on {} for {:?}",
                verb,
                node.path,
                principal.user_id
            );
            Err(ApiError::unauthorized(
                "You don't have permission for this operation.",
            ))
        }
    }
}
