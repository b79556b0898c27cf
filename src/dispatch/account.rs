//! Account flows behind the fixed paths and `POST /users`.

use rand::seq::SliceRandom;
use serde_json::{Value, json};
use std::sync::Arc;

use super::redact::redacted;
use crate::auth::credentials::CredentialService;
use crate::auth::passwords::PasswordHasher;
use crate::auth::principal::Principal;
use crate::auth::providers::IdentityProvider;
use crate::error::{ApiError, ApiResult};
use crate::hooks::mailer::Mailer;
use crate::storage::store::DataStore;
use crate::storage::types::{
    CREATED_AT_FIELD, Created, Document, ID_FIELD, PASSWORD_FIELD, QuerySpec, ROLES_FIELD, UPDATED_AT_FIELD,
    USERS_CLASS,
};

const QUANTITIES: &[&str] = &["two", "three", "four", "five", "six", "seven", "eight", "nine", "ten"];

const FRUITS: &[&str] = &[
    "apples", "apricots", "avocados", "bananas", "cherries", "coconuts", "cranberries",
    "damsons", "dates", "durians", "grapes", "guavas", "jambuls", "jujubes", "kiwis", "lemons",
    "limes", "mangos", "melons", "olives", "oranges", "mandarines", "papayas", "peaches",
    "pears", "plums", "pineapples", "pumpkins", "pomelos", "raspberries", "satsumas",
    "strawberries", "tomatoes",
];

/// A readable password such as `twoapplesandfivekiwis`.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let mut half = || {
        format!(
            "{}{}",
            QUANTITIES.choose(&mut rng).copied().unwrap_or("two"),
            FRUITS.choose(&mut rng).copied().unwrap_or("apples")
        )
    };
    let first = half();
    let second = half();
    format!("{}and{}", first, second)
}

/// Outcome of a registration: the response body and the stored document, which is the
/// body handed to the after trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub response: Document,
    pub stored: Document,
}

fn non_empty_str<'a>(body: &'a Document, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub struct AccountService {
    store: Arc<dyn DataStore>,
    hasher: Arc<dyn PasswordHasher>,
    credentials: Arc<dyn CredentialService>,
    providers: Vec<Arc<dyn IdentityProvider>>,
    mailer: Arc<dyn Mailer>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn DataStore>,
        hasher: Arc<dyn PasswordHasher>,
        credentials: Arc<dyn CredentialService>,
        providers: Vec<Arc<dyn IdentityProvider>>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            hasher,
            credentials,
            providers,
            mailer,
        }
    }

    pub fn hasher(&self) -> &Arc<dyn PasswordHasher> {
        &self.hasher
    }

    /// The account identified by the body: `username`, else `email`, else the id of a
    /// provider section such as `facebook.id`.
    pub async fn find_account(&self, body: &Document) -> ApiResult<Option<Document>> {
        let lookup = if let Some(username) = non_empty_str(body, "username") {
            Some(("username".to_string(), username.to_string()))
        } else if let Some(email) = non_empty_str(body, "email") {
            Some(("email".to_string(), email.to_string()))
        } else {
            self.providers.iter().find_map(|provider| {
                let Some(Value::Object(data)) = body.get(provider.field()) else {
                    return None;
                };
                let id = non_empty_str(data, "id")?;
                Some((format!("{}.id", provider.field()), id.to_string()))
            })
        };
        let Some((field, value)) = lookup else {
            return Ok(None);
        };

        let mut spec = QuerySpec::field_equals(&field, Value::String(value));
        spec.limit = Some(1);
        let mut found = self.store.query(USERS_CLASS, &spec).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    fn issue_token(&self, user_id: &str, user: &Document) -> ApiResult<String> {
        Ok(self.credentials.issue(user_id, user)?)
    }

    pub async fn register(&self, mut body: Document) -> ApiResult<Registration> {
        // Roles are granted by administrators, never by the registering client.
        body.remove(ROLES_FIELD);

        if body.contains_key("username") || body.contains_key("email") {
            return self.register_local(body).await;
        }
        let provider = self
            .providers
            .iter()
            .find(|provider| body.contains_key(provider.field()))
            .cloned();
        match provider {
            Some(provider) => self.register_with_provider(provider.as_ref(), body).await,
            None => Err(ApiError::bad_request("No suitable registration data found.")),
        }
    }

    async fn register_local(&self, mut body: Document) -> ApiResult<Registration> {
        let Some(password) = body.get(PASSWORD_FIELD).and_then(Value::as_str) else {
            return Err(ApiError::bad_request(
                "Username or email, and password must be provided.",
            ));
        };
        if self.find_account(&body).await?.is_some() {
            return Err(ApiError::Conflict(
                "User with same email-username already exists.".to_string(),
            ));
        }
        let hashed = self.hasher.hash(password)?;

        body.insert(PASSWORD_FIELD.to_string(), Value::String(hashed));
        let (created, stored) = self.create_user(body).await?;
        let token = self.issue_token(&created.id, &stored)?;

        let mut response = Document::new();
        response.insert(ID_FIELD.to_string(), json!(created.id));
        response.insert(CREATED_AT_FIELD.to_string(), json!(created.created_at));
        response.insert("accessToken".to_string(), json!(token));
        Ok(Registration { response, stored })
    }

    async fn register_with_provider(
        &self,
        provider: &dyn IdentityProvider,
        body: Document,
    ) -> ApiResult<Registration> {
        let data = match body.get(provider.field()) {
            Some(Value::Object(data)) => data.clone(),
            _ => {
                return Err(ApiError::bad_request(format!(
                    "The key '{}' must be an object.",
                    provider.field()
                )));
            }
        };
        provider.verify(&data).await?;

        let (user_id, stored, is_new) = match self.find_account(&body).await? {
            Some(existing) => {
                let id = existing
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (id, existing, false)
            }
            None => {
                let (created, stored) = self.create_user(body).await?;
                (created.id, stored, true)
            }
        };
        let token = self.issue_token(&user_id, &stored)?;

        let mut response = redacted(stored.clone());
        response.insert("isNewUser".to_string(), json!(is_new));
        response.insert("accessToken".to_string(), json!(token));
        Ok(Registration { response, stored })
    }

    async fn create_user(&self, mut body: Document) -> ApiResult<(Created, Document)> {
        let created = self.store.create(USERS_CLASS, body.clone()).await?;
        body.insert(ID_FIELD.to_string(), json!(created.id));
        body.insert(CREATED_AT_FIELD.to_string(), json!(created.created_at));
        body.insert(UPDATED_AT_FIELD.to_string(), json!(created.created_at));
        tracing::info!("Registered user {}", created.id);
        Ok((created, body))
    }

    pub async fn login(&self, body: &Document) -> ApiResult<Document> {
        let has_identity = body.contains_key("username") || body.contains_key("email");
        let Some(password) = body.get(PASSWORD_FIELD).and_then(Value::as_str).filter(|_| has_identity)
        else {
            return Err(ApiError::bad_request(
                "Login request must contain username or email, and password.",
            ));
        };

        let mismatch = || ApiError::unauthorized("Credentials don't match or account doesn't exist.");
        let account = self.find_account(body).await?.ok_or_else(mismatch)?;
        let stored_hash = account
            .get(PASSWORD_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !self.hasher.verify(password, stored_hash) {
            return Err(mismatch());
        }

        let user_id = account
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut response = redacted(account);
        let token = self.issue_token(&user_id, &response)?;
        response.insert("accessToken".to_string(), json!(token));
        Ok(response)
    }

    pub async fn change_password(&self, principal: &Principal, body: &Document) -> ApiResult<Document> {
        let (Some(user_id), Some(user)) = (&principal.user_id, &principal.user) else {
            return Err(ApiError::unauthorized(
                "Access token must be provided for change password request.",
            ));
        };
        let Some(current) = body.get(PASSWORD_FIELD).and_then(Value::as_str) else {
            return Err(ApiError::bad_request(
                "Password must be provided in the body with field 'password'.",
            ));
        };
        let Some(new_password) = body.get("newPassword").and_then(Value::as_str) else {
            return Err(ApiError::bad_request(
                "New password must be provided in the body with field 'newPassword'.",
            ));
        };

        let stored_hash = user.get(PASSWORD_FIELD).and_then(Value::as_str).unwrap_or_default();
        if !self.hasher.verify(current, stored_hash) {
            return Err(ApiError::unauthorized("Existing password is not correct."));
        }
        self.set_password(user_id, new_password).await
    }

    pub async fn reset_password(&self, body: &Document) -> ApiResult<Document> {
        if !self.mailer.is_configured() {
            return Err(ApiError::internal(
                "Email reset configuration is not set in configuration file.",
            ));
        }
        let Some(email) = non_empty_str(body, "email") else {
            return Err(ApiError::bad_request("Email must be provided in the body."));
        };

        let mut lookup = Document::new();
        lookup.insert("email".to_string(), json!(email));
        let account = self
            .find_account(&lookup)
            .await?
            .ok_or_else(|| ApiError::not_found("Item not found."))?;
        let user_id = account
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let generated = generate_password();
        let response = self.set_password(&user_id, &generated).await?;
        self.mailer.send_password(email, &generated).await?;
        tracing::info!("Password of user {} was reset", user_id);
        Ok(response)
    }

    async fn set_password(&self, user_id: &str, plain: &str) -> ApiResult<Document> {
        let mut partial = Document::new();
        partial.insert(PASSWORD_FIELD.to_string(), json!(self.hasher.hash(plain)?));
        let updated = self.store.update(USERS_CLASS, user_id, partial).await?;

        let mut response = Document::new();
        response.insert(UPDATED_AT_FIELD.to_string(), json!(updated.updated_at));
        Ok(response)
    }
}
