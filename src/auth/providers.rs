//! External identity providers used by registration.
//!
//! A provider checks that the client-supplied token really belongs to the claimed
//! provider-side user id. The account itself is then looked up by `<provider>.id`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::hooks::client::HttpClient;
use crate::storage::types::Document;

pub const FACEBOOK_DEBUG_TOKEN_URL: &str = "https://graph.facebook.com/debug_token";
pub const GOOGLE_TOKEN_INFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Body field carrying this provider's data, e.g. `facebook`.
    fn field(&self) -> &'static str;

    /// Verifies the provider data found under [`field`](Self::field).
    async fn verify(&self, data: &Document) -> ApiResult<()>;
}

fn string_field<'a>(data: &'a Document, name: &str) -> Option<&'a str> {
    data.get(name).and_then(Value::as_str)
}

async fn fetch_token_info(http: &HttpClient, url: &str) -> ApiResult<Document> {
    let reply = http.get_json(url).await.map_err(|e| {
        tracing::warn!("Token verification request failed: {}", e);
        ApiError::internal("Verifying token failed.")
    })?;
    if reply.status != 200 {
        return Err(ApiError::internal("Verifying token failed."));
    }
    match reply.body {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::internal("Parsing token response failed.")),
    }
}

pub struct FacebookProvider {
    http: Arc<HttpClient>,
    app_id: String,
    app_token: String,
    endpoint: String,
}

impl FacebookProvider {
    pub fn new(http: Arc<HttpClient>, app_id: String, app_token: String) -> Self {
        Self::with_endpoint(http, app_id, app_token, FACEBOOK_DEBUG_TOKEN_URL.to_string())
    }

    pub fn with_endpoint(
        http: Arc<HttpClient>,
        app_id: String,
        app_token: String,
        endpoint: String,
    ) -> Self {
        Self {
            http,
            app_id,
            app_token,
            endpoint,
        }
    }
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn field(&self) -> &'static str {
        "facebook"
    }

    async fn verify(&self, data: &Document) -> ApiResult<()> {
        let (Some(user_id), Some(access_token)) =
            (string_field(data, "id"), string_field(data, "accessToken"))
        else {
            return Err(ApiError::bad_request(
                "Facebook data must contain id and access token.",
            ));
        };
        if self.app_token.is_empty() {
            return Err(ApiError::internal(
                "Facebook information is not provided in server configuration.",
            ));
        }

        let url = format!(
            "{}?access_token={}&input_token={}",
            self.endpoint, self.app_token, access_token
        );
        let info = fetch_token_info(&self.http, &url).await?;
        let Some(Value::Object(token)) = info.get("data") else {
            return Err(ApiError::internal("Unexpected token response from platform."));
        };

        let (Some(app_id), Some(token_user), Some(is_valid)) = (
            string_field(token, "app_id"),
            string_field(token, "user_id"),
            token.get("is_valid").and_then(Value::as_bool),
        ) else {
            return Err(ApiError::internal(
                "Unexpected response from Facebook while validating.",
            ));
        };

        if !app_id.eq_ignore_ascii_case(&self.app_id) {
            return Err(ApiError::internal("App id doesn't match to the token's app id."));
        }
        if !token_user.eq_ignore_ascii_case(user_id) {
            return Err(ApiError::bad_request(
                "User id doesn't match to the token's user id.",
            ));
        }
        if !is_valid {
            return Err(ApiError::bad_request("Token is not valid."));
        }
        Ok(())
    }
}

pub struct GoogleProvider {
    http: Arc<HttpClient>,
    client_id: String,
    endpoint: String,
}

impl GoogleProvider {
    pub fn new(http: Arc<HttpClient>, client_id: String) -> Self {
        Self::with_endpoint(http, client_id, GOOGLE_TOKEN_INFO_URL.to_string())
    }

    pub fn with_endpoint(http: Arc<HttpClient>, client_id: String, endpoint: String) -> Self {
        Self {
            http,
            client_id,
            endpoint,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn field(&self) -> &'static str {
        "google"
    }

    async fn verify(&self, data: &Document) -> ApiResult<()> {
        let (Some(_), Some(id_token)) = (string_field(data, "id"), string_field(data, "idToken"))
        else {
            return Err(ApiError::bad_request(
                "Google data must contain user id and id token.",
            ));
        };
        if self.client_id.is_empty() {
            return Err(ApiError::internal(
                "Google information is not provided in server configuration.",
            ));
        }

        let url = format!("{}?id_token={}", self.endpoint, id_token);
        let info = fetch_token_info(&self.http, &url).await?;
        let Some(audience) = string_field(&info, "aud") else {
            return Err(ApiError::internal("Unexpected token response from platform."));
        };
        if !audience.eq_ignore_ascii_case(&self.client_id) {
            return Err(ApiError::internal(
                "Client id doesn't match to the token's client id.",
            ));
        }
        Ok(())
    }
}
