use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::client::HttpClient;
use crate::error::{ApiError, ApiResult};

/// Placeholder replaced by the generated password in mail templates.
pub const PASSWORD_PLACEHOLDER: &str = "{password}";

/// Delivers freshly generated passwords to users.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send_password(&self, recipient: &str, password: &str) -> ApiResult<()>;
}

pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    fn is_configured(&self) -> bool {
        false
    }

    async fn send_password(&self, _recipient: &str, _password: &str) -> ApiResult<()> {
        Err(ApiError::internal(
            "Email reset configuration is not set in configuration file.",
        ))
    }
}

/// Hands the mail to an HTTP relay as `{to, subject, content}`.
pub struct RelayMailer {
    http: Arc<HttpClient>,
    endpoint: String,
    subject: String,
    template: String,
}

impl RelayMailer {
    pub fn new(http: Arc<HttpClient>, endpoint: String, subject: String, template: String) -> Self {
        Self {
            http,
            endpoint,
            subject,
            template,
        }
    }

    pub fn render(&self, password: &str) -> String {
        if self.template.contains(PASSWORD_PLACEHOLDER) {
            self.template.replace(PASSWORD_PLACEHOLDER, password)
        } else {
            format!("{}{}", self.template, password)
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }

    async fn send_password(&self, recipient: &str, password: &str) -> ApiResult<()> {
        let payload = json!({
            "to": recipient,
            "subject": self.subject,
            "content": self.render(password),
        });
        let reply = self.http.post_json(&self.endpoint, &payload).await.map_err(|e| {
            tracing::error!("Mail relay unreachable: {}", e);
            ApiError::internal("Sending email failed.")
        })?;
        if reply.is_error() {
            tracing::error!("Mail relay rejected message: {}", reply.message());
            return Err(ApiError::internal("Sending email failed."));
        }
        Ok(())
    }
}
