//! Hands out a NewStore API token to other services, reusing it for as long
//! as the warm container lives and the token has not expired.

use crate::clients::newstore::{InvocationContext, NewStoreClient, TokenResponse};
use crate::clients::token::TokenCache;
use crate::config::env;
use crate::config::param_store::{NewStoreConfig, ParamStore};
use crate::domain::ports::{ParameterSource, SecretSource};
use crate::utils::error::{IntegrationError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_name: String,
    pub force: bool,
    pub expiry_offset: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            secret_name: env::required("SECRET_NAME_NEWSTORE_API_USER")?,
            force: env::optional("FORCE", "0") == "1",
            expiry_offset: env::parse_or("EXPIRY_OFFSET", 0)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

/// API Gateway proxy response carrying the token as a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenVendingResponse {
    pub is_base64_encoded: bool,
    pub status_code: u16,
    pub body: Option<String>,
}

pub struct TokenVendor<P: ParameterSource, X: SecretSource> {
    params: ParamStore<P>,
    secrets: X,
    settings: Settings,
    cache: Mutex<TokenCache>,
}

impl<P: ParameterSource, X: SecretSource> TokenVendor<P, X> {
    pub fn new(params: ParamStore<P>, secrets: X, settings: Settings) -> Self {
        Self {
            params,
            secrets,
            settings,
            cache: Mutex::new(TokenCache::new()),
        }
    }

    async fn request_token(&self, context: &InvocationContext) -> Result<TokenResponse> {
        let raw = self.secrets.get_secret_string(&self.settings.secret_name).await?;
        let credentials: Credentials = serde_json::from_str(&raw).map_err(|e| IntegrationError::InvalidConfigValueError {
            field: self.settings.secret_name.clone(),
            value: "<secret>".to_string(),
            reason: e.to_string(),
        })?;

        let newstore = self.params.newstore_config().await?;
        let client = NewStoreClient::new(
            NewStoreConfig {
                username: credentials.username,
                password: credentials.password,
                ..newstore
            },
            context.clone(),
        );
        client.auth_request().await
    }

    async fn token(&self, context: &InvocationContext) -> Result<TokenResponse> {
        let mut cache = self.cache.lock().await;
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = cache.current(now, self.settings.force, self.settings.expiry_offset) {
            return Ok(token.clone());
        }

        tracing::info!("requesting new access token (forced? {})", self.settings.force);
        let response = self.request_token(context).await?;
        Ok(cache.store(response)?.clone())
    }

    /// Never fails: on error the previous token, if any, is returned.
    pub async fn handle(&self, context: &InvocationContext) -> TokenVendingResponse {
        let token = match self.token(context).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::info!("{}", e);
                tracing::error!("❌ Error during token generation.");
                self.cache.lock().await.last().cloned()
            }
        };

        TokenVendingResponse {
            is_base64_encoded: false,
            status_code: 200,
            body: token.and_then(|t| serde_json::to_string(&t).ok()),
        }
    }
}
