//! Per-node request execution.
//!
//! Order of evaluation for a request that reached its addressee:
//! 1. Account paths run their own flow and skip the legality matrix and the gate.
//! 2. The verb is checked against the node kind (400 for everyone, whatever their roles).
//! 3. The principal is resolved and the gate decides.
//! 4. The operation runs against the store, the file store or the function service.
//!    Mutations are wrapped in before/after triggers.
//!
//! `password` is removed from every body the dispatcher returns.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;

use super::account::AccountService;
use super::expand::{Expander, parse_expand};
use super::legality::{Operation, operation_for};
use super::query::{CollectionQuery, parse_collection_query};
use super::redact::{redact, redacted};
use crate::auth::credentials::CredentialService;
use crate::auth::gate::PermissionGate;
use crate::auth::passwords::PasswordHasher;
use crate::auth::principal::Principal;
use crate::auth::providers::IdentityProvider;
use crate::error::{ApiError, ApiResult};
use crate::hooks::functions::FunctionService;
use crate::hooks::mailer::Mailer;
use crate::hooks::triggers::TriggerService;
use crate::hooks::types::{FunctionCall, TriggerEvent, TriggerPhase};
use crate::resource::node::RequestHandler;
use crate::resource::types::{AccountRoute, NodeInfo, Request, Response, Verb};
use crate::storage::files::FileStore;
use crate::storage::store::{DataStore, StoreError};
use crate::storage::types::{
    CREATED_AT_FIELD, Document, FILES_CLASS, ID_FIELD, PASSWORD_FIELD, ROLES_FIELD, UPDATED_AT_FIELD,
    USERS_CLASS,
};

/// Everything the dispatcher delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DataStore>,
    pub files: Arc<dyn FileStore>,
    pub credentials: Arc<dyn CredentialService>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub triggers: Arc<dyn TriggerService>,
    pub functions: Arc<dyn FunctionService>,
    pub mailer: Arc<dyn Mailer>,
    pub providers: Vec<Arc<dyn IdentityProvider>>,
}

/// A mutation wrapped by triggers.
enum Mutation<'a> {
    Create,
    Register,
    StoreFile,
    Update(&'a str),
    Delete(&'a str),
}

pub struct Dispatcher {
    store: Arc<dyn DataStore>,
    files: Arc<dyn FileStore>,
    triggers: Arc<dyn TriggerService>,
    functions: Arc<dyn FunctionService>,
    gate: PermissionGate,
    accounts: AccountService,
    expander: Expander,
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators) -> Arc<Self> {
        let Collaborators {
            store,
            files,
            credentials,
            hasher,
            triggers,
            functions,
            mailer,
            providers,
        } = collaborators;

        Arc::new(Self {
            gate: PermissionGate::new(store.clone(), credentials.clone()).with_files(files.clone()),
            accounts: AccountService::new(store.clone(), hasher, credentials, providers, mailer),
            expander: Expander::new(store.clone()),
            store,
            files,
            triggers,
            functions,
        })
    }

    pub async fn dispatch(&self, node: &NodeInfo, request: Request) -> ApiResult<Response> {
        if let Some(route) = AccountRoute::for_path(&node.path) {
            return self.account(node, route, request).await;
        }

        let operation = operation_for(node.kind, request.verb)?;
        let principal = self.gate.resolve_principal(&request.headers).await?;
        self.gate.authorize(node, request.verb, &principal).await?;

        let class = node.class.clone().unwrap_or_default();
        let id = node.path.last_segment().unwrap_or_default().to_string();
        match operation {
            Operation::Query => self.query(&class, &request).await,
            Operation::Fetch => self.fetch(&class, &id, &request).await,
            Operation::Create => {
                let mutation = match class.as_str() {
                    USERS_CLASS => Mutation::Register,
                    FILES_CLASS => Mutation::StoreFile,
                    _ => Mutation::Create,
                };
                self.mutate(&class, mutation, request, &principal).await
            }
            Operation::Update => self.mutate(&class, Mutation::Update(&id), request, &principal).await,
            Operation::Delete => self.mutate(&class, Mutation::Delete(&id), request, &principal).await,
            Operation::Invoke => self.invoke(node, request, principal).await,
        }
    }

    async fn account(&self, node: &NodeInfo, route: AccountRoute, request: Request) -> ApiResult<Response> {
        if request.verb != Verb::Post {
            return Err(ApiError::bad_request(format!(
                "{} is not allowed on {}.",
                request.verb, node.path
            )));
        }
        let principal = self.gate.resolve_lenient(&request.headers).await?;
        let body = request.body.clone().unwrap_or_default();

        match route {
            AccountRoute::Login => Ok(Response::ok(self.accounts.login(&body).await?)),
            AccountRoute::Register => {
                self.mutate(USERS_CLASS, Mutation::Register, request, &principal)
                    .await
            }
            AccountRoute::ChangePassword => Ok(Response::ok(
                self.accounts.change_password(&principal, &body).await?,
            )),
            AccountRoute::ResetPassword => {
                Ok(Response::ok(self.accounts.reset_password(&body).await?))
            }
        }
    }

    async fn query(&self, class: &str, request: &Request) -> ApiResult<Response> {
        let options = parse_collection_query(&request.params)?;
        let fields = match &options.expand {
            Some(config) => parse_expand(config)?,
            None => Vec::new(),
        };

        let mut docs = match &options.query {
            CollectionQuery::Find(spec) => self.store.query(class, spec).await?,
            CollectionQuery::Aggregate(pipeline) => self.store.aggregate(class, pipeline).await?,
        };
        if !fields.is_empty() {
            self.expander.expand_all(&mut docs, &fields).await?;
        }

        let mut body = Document::new();
        body.insert(
            "data".to_string(),
            Value::Array(docs.into_iter().map(Value::Object).collect()),
        );
        Ok(Response::ok(body))
    }

    async fn fetch(&self, class: &str, id: &str, request: &Request) -> ApiResult<Response> {
        if class == FILES_CLASS {
            let file = self.files.get(id).await.map_err(|e| match e {
                StoreError::NotFound => ApiError::not_found("File not found."),
                other => other.into(),
            })?;
            let content_type = file
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            return Ok(Response::raw(content_type, file.bytes));
        }

        let mut doc = self.store.get_by_id(class, id).await?;
        if let Some(config) = request.params.get("expand") {
            let fields = parse_expand(config)?;
            self.expander.expand_item(&mut doc, &fields).await?;
        }
        Ok(Response::ok(doc))
    }

    /// Runs a mutation between the before trigger (which may replace the body) and a
    /// detached after trigger that sees the final body whatever the outcome.
    async fn mutate(
        &self,
        class: &str,
        mutation: Mutation<'_>,
        request: Request,
        principal: &Principal,
    ) -> ApiResult<Response> {
        let user = principal.user.clone().map(redacted);
        let mut event = TriggerEvent {
            class: class.to_string(),
            phase: TriggerPhase::Before,
            verb: request.verb,
            params: request.params.clone(),
            body: request.body.clone(),
            user,
        };
        if let Some(replacement) = self.triggers.fire(&event).await? {
            event.body = Some(replacement);
        }

        let outcome = self.execute(class, mutation, event.body.clone(), &request).await;

        event.phase = TriggerPhase::After;
        if let Ok((_, Some(final_body))) = &outcome {
            event.body = Some(redacted(final_body.clone()));
        }
        let triggers = self.triggers.clone();
        tokio::spawn(async move {
            if let Err(e) = triggers.fire(&event).await {
                tracing::warn!(
                    "After trigger for {} {} failed: {}",
                    event.verb,
                    event.class,
                    e
                );
            }
        });

        outcome.map(|(response, _)| response)
    }

    /// The mutation itself. Returns the response and the body reported to the after trigger.
    async fn execute(
        &self,
        class: &str,
        mutation: Mutation<'_>,
        body: Option<Document>,
        request: &Request,
    ) -> ApiResult<(Response, Option<Document>)> {
        match mutation {
            Mutation::Create => {
                let mut body = body.ok_or_else(|| {
                    ApiError::bad_request("Request body cannot be empty for create requests.")
                })?;
                let created = self.store.create(class, body.clone()).await?;
                body.insert(ID_FIELD.to_string(), json!(created.id));
                body.insert(CREATED_AT_FIELD.to_string(), json!(created.created_at));
                body.insert(UPDATED_AT_FIELD.to_string(), json!(created.created_at));

                let mut response = Document::new();
                response.insert(ID_FIELD.to_string(), json!(created.id));
                response.insert(CREATED_AT_FIELD.to_string(), json!(created.created_at));
                Ok((Response::created(response), Some(body)))
            }
            Mutation::Register => {
                let registration = self.accounts.register(body.unwrap_or_default()).await?;
                Ok((
                    Response::created(registration.response),
                    Some(registration.stored),
                ))
            }
            Mutation::StoreFile => {
                let response = self.store_file(request).await?;
                Ok((Response::created(response.clone()), Some(response)))
            }
            Mutation::Update(id) => {
                let mut partial = body.ok_or_else(|| {
                    ApiError::bad_request("Request body cannot be empty for update requests.")
                })?;
                if class == USERS_CLASS {
                    // Same rule as registration: roles are never written by the client.
                    partial.remove(ROLES_FIELD);
                }
                if class == USERS_CLASS
                    && let Some(Value::String(plain)) = partial.get(PASSWORD_FIELD)
                {
                    let hashed = self.accounts.hasher().hash(plain)?;
                    partial.insert(PASSWORD_FIELD.to_string(), Value::String(hashed));
                }
                let updated = self.store.update(class, id, partial.clone()).await?;
                partial.insert(UPDATED_AT_FIELD.to_string(), json!(updated.updated_at));

                let mut response = Document::new();
                response.insert(UPDATED_AT_FIELD.to_string(), json!(updated.updated_at));
                Ok((Response::ok(response), Some(partial)))
            }
            Mutation::Delete(id) => {
                self.store.delete(class, id).await?;
                Ok((Response::no_content(), None))
            }
        }
    }

    async fn store_file(&self, request: &Request) -> ApiResult<Document> {
        let (name, content_type, bytes) = match request.files.as_slice() {
            [] => {
                let raw = request.raw_body.clone().unwrap_or_default();
                if raw.is_empty() {
                    return Err(ApiError::bad_request("File content must be provided."));
                }
                (None, None, decode_upload(raw))
            }
            [file] => (
                file.file_name.clone(),
                file.content_type.clone(),
                file.bytes.clone(),
            ),
            _ => {
                return Err(ApiError::bad_request(
                    "Only one file can be uploaded with one request.",
                ));
            }
        };

        let stored = self.files.put(name.as_deref(), content_type, bytes).await?;
        let mut response = Document::new();
        response.insert(ID_FIELD.to_string(), json!(stored.id));
        response.insert(CREATED_AT_FIELD.to_string(), json!(stored.created_at));
        Ok(response)
    }

    async fn invoke(&self, node: &NodeInfo, request: Request, principal: Principal) -> ApiResult<Response> {
        let Some((base, name)) = node.path.function_target() else {
            return Err(ApiError::bad_request("Function name is missing."));
        };
        let call = FunctionCall {
            name: name.to_string(),
            res: base.to_string(),
            user: principal.user.map(redacted),
            parameters: request.params,
            body: request.body,
        };
        Ok(Response::ok(self.functions.invoke(call).await?))
    }
}

/// Raw upload bodies are accepted base64 encoded; anything that does not decode is stored
/// as sent.
fn decode_upload(raw: Bytes) -> Bytes {
    let trimmed = raw.trim_ascii();
    match STANDARD.decode(trimmed) {
        Ok(decoded) if !decoded.is_empty() => Bytes::from(decoded),
        _ => raw,
    }
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle(&self, node: &NodeInfo, request: Request) -> Response {
        let verb = request.verb;
        let mut response = match self.dispatch(node, request).await {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_server_error() {
                    tracing::error!("{} {} failed: {}", verb, node.path, e);
                } else {
                    tracing::debug!("{} {} rejected: {}", verb, node.path, e);
                }
                Response::from(e)
            }
        };
        if let Some(body) = response.body.as_mut() {
            redact(body);
        }
        response
    }
}
