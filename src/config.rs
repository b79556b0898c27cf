//! Configuration
//!
//! Loaded from a JSON file (`dock-config.json` by default). Every section is optional. A
//! missing provider, mailer, functions or webhook section disables that collaborator.
//!
//! ```json
//! {
//!   "server": { "bind": "0.0.0.0:1707", "logLevel": "debug" },
//!   "tree": { "mailboxCapacity": 64, "idleTimeoutSecs": 300 },
//!   "auth": { "signingKey": "change-me", "tokenTtlHours": 72 },
//!   "facebook": { "appId": "...", "appToken": "..." },
//!   "google": { "clientId": "..." },
//!   "resetPassword": { "endpoint": "http://mailer/send" },
//!   "functions": { "endpoint": "http://functions/" },
//!   "webhook": { "endpoint": "http://hooks", "methods": { "posts": { "before": { "post": "/posts" } } } }
//! }
//! ```

use anyhow::Context;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::credentials::HmacCredentials;
use crate::auth::passwords::SaltedSha256;
use crate::auth::providers::{FacebookProvider, GoogleProvider, IdentityProvider};
use crate::dispatch::dispatcher::Collaborators;
use crate::hooks::client::HttpClient;
use crate::hooks::functions::{FunctionRegistry, RemoteFunctions};
use crate::hooks::mailer::{DisabledMailer, Mailer, PASSWORD_PLACEHOLDER, RelayMailer};
use crate::hooks::triggers::{NoopTriggers, TriggerService, WebhookMethods, WebhookTriggers};
use crate::resource::node::TreeSettings;
use crate::storage::files::MemoryFileStore;
use crate::storage::memory::MemoryStore;

pub const DEFAULT_CONFIG_PATH: &str = "dock-config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub server: ServerConfig,
    pub tree: TreeConfig,
    pub auth: AuthConfig,
    pub facebook: Option<FacebookConfig>,
    pub google: Option<GoogleConfig>,
    pub reset_password: Option<ResetPasswordConfig>,
    pub functions: Option<FunctionsConfig>,
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub bind: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:1707".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeConfig {
    pub mailbox_capacity: usize,
    /// `0` keeps idle nodes alive forever.
    pub idle_timeout_secs: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            idle_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    pub signing_key: Option<String>,
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            token_ttl_hours: 72,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordConfig {
    pub endpoint: String,
    #[serde(default = "default_reset_subject")]
    pub subject: String,
    /// Mail body; `{password}` is replaced by the generated password.
    #[serde(default = "default_reset_template")]
    pub template: String,
}

fn default_reset_subject() -> String {
    "Your password has been reset".to_string()
}

fn default_reset_template() -> String {
    format!("Your new password is {}", PASSWORD_PLACEHOLDER)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionsConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub endpoint: String,
    #[serde(default)]
    pub methods: WebhookMethods,
}

impl Config {
    /// Reads `path`. A missing file is not an error: the server starts on defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Reading {} failed", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Parsing {} failed", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn log_level(&self) -> tracing::Level {
        self.server
            .log_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }

    pub fn tree_settings(&self) -> TreeSettings {
        TreeSettings {
            mailbox_capacity: self.tree.mailbox_capacity.max(1),
            idle_timeout: match self.tree.idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// The configured signing key, or a random one that invalidates every token on restart.
    pub fn signing_key(&self) -> Vec<u8> {
        match &self.auth.signing_key {
            Some(key) if !key.is_empty() => key.as_bytes().to_vec(),
            _ => {
                tracing::warn!("No signing key configured; tokens will not survive a restart");
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_hours.saturating_mul(3600))
    }

    /// Builds every collaborator the dispatcher needs, backed by the in-memory stores.
    pub fn collaborators(&self) -> (Collaborators, Arc<FunctionRegistry>) {
        let http = Arc::new(HttpClient::default());

        let mut providers: Vec<Arc<dyn IdentityProvider>> = Vec::new();
        if let Some(facebook) = &self.facebook {
            providers.push(Arc::new(FacebookProvider::new(
                http.clone(),
                facebook.app_id.clone(),
                facebook.app_token.clone(),
            )));
        }
        if let Some(google) = &self.google {
            providers.push(Arc::new(GoogleProvider::new(
                http.clone(),
                google.client_id.clone(),
            )));
        }

        let mailer: Arc<dyn Mailer> = match &self.reset_password {
            Some(reset) => Arc::new(RelayMailer::new(
                http.clone(),
                reset.endpoint.clone(),
                reset.subject.clone(),
                reset.template.clone(),
            )),
            None => Arc::new(DisabledMailer),
        };

        let triggers: Arc<dyn TriggerService> = match &self.webhook {
            Some(webhook) => Arc::new(WebhookTriggers::new(
                http.clone(),
                webhook.endpoint.clone(),
                webhook.methods.clone(),
            )),
            None => Arc::new(NoopTriggers),
        };

        let functions = FunctionRegistry::new(
            self.functions
                .as_ref()
                .map(|f| RemoteFunctions::new(http.clone(), f.endpoint.clone())),
        );

        let collaborators = Collaborators {
            store: MemoryStore::new(),
            files: MemoryFileStore::new(),
            credentials: Arc::new(HmacCredentials::new(self.signing_key(), self.token_ttl())),
            hasher: Arc::new(SaltedSha256::default()),
            triggers,
            functions: functions.clone(),
            mailer,
            providers,
        };
        (collaborators, functions)
    }
}
