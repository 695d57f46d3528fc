use crate::config::param_store::NewStoreConfig;
use crate::utils::error::{IntegrationError, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

const GRAPHQL_PATH: &str = "/api/v1/org/data/query";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Identifies the calling function in request headers.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub function_name: String,
    pub function_version: String,
    pub request_id: String,
}

impl InvocationContext {
    /// Reads the variables the Lambda runtime sets.
    pub fn from_env() -> Self {
        Self {
            function_name: std::env::var("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_default(),
            function_version: std::env::var("AWS_LAMBDA_FUNCTION_VERSION").unwrap_or_default(),
            request_id: String::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = request_id.to_string();
        self
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// REST client for the NewStore API with password-grant authentication.
///
/// The bearer token is cached until it expires and shared between clones,
/// so one client per warm container authenticates once.
#[derive(Clone)]
pub struct NewStoreClient {
    client: Client,
    base_url: String,
    config: NewStoreConfig,
    context: InvocationContext,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl NewStoreClient {
    pub fn new(config: NewStoreConfig, context: InvocationContext) -> Self {
        let base_url = if config.host.starts_with("http://") || config.host.starts_with("https://") {
            config.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.host.trim_end_matches('/'))
        };

        Self {
            client: Client::new(),
            base_url,
            config,
            context,
            token: Arc::new(Mutex::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tenant(&self) -> &str {
        &self.config.tenant
    }

    fn user_agent(&self) -> String {
        format!(
            "lambda-name#{}/{} integrator-name#newstore-integrations",
            self.context.function_name, self.context.function_version
        )
    }

    /// Requests a fresh token, bypassing the cache.
    pub async fn auth_request(&self) -> Result<TokenResponse> {
        let url = format!("{}/v0/token", self.base_url);
        tracing::info!("Getting token from newstore {}", self.base_url);

        let form = [
            ("grant_type", "password"),
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];
        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Not able to get the token: {} {}", status, body);
            return Err(IntegrationError::NewStoreApiError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn bearer(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.access_token.clone());
            }
            tracing::debug!("Cached NewStore token expired");
        }

        let response = self.auth_request().await?;
        let expires_at = response
            .expires_at
            .or_else(|| response.expires_in.map(|secs| now + secs))
            .unwrap_or(now);
        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            expires_at,
        });
        Ok(response.access_token)
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("Content-Type", "application/json")
            .header("tenant", self.config.tenant.as_str())
            .header("User-Agent", self.user_agent());
        if self.context.request_id.is_empty() {
            builder
        } else {
            builder.header("X-AWS-Request-ID", self.context.request_id.as_str())
        }
    }

    async fn request(&self, method: Method, path: &str, query: &[(&str, &str)], body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::info!("{} {}", method, url);
        if let Some(body) = body {
            tracing::debug!("Sending: {}", body);
        }

        let token = self.bearer().await?;
        let mut builder = self
            .with_headers(self.client.request(method, &url))
            .bearer_auth(token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!("Response: {}; status: {}", text, status);
            return Err(IntegrationError::NewStoreApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn create_import(&self, payload: &Value) -> Result<Value> {
        self.request(Method::POST, "/v0/d/import", &[], Some(payload)).await
    }

    pub async fn start_import(&self, import_id: &str, payload: &Value) -> Result<Value> {
        let path = format!("/v0/d/import/{}/start", import_id);
        self.request(Method::POST, &path, &[], Some(payload)).await
    }

    pub async fn get_import_jobs_by_state(&self, state: &str) -> Result<Value> {
        self.request(Method::GET, "/v0/d/import", &[("state", state)], None).await
    }

    pub async fn get_import_job(&self, import_id: &str) -> Result<Value> {
        let path = format!("/v0/d/import/{}", import_id);
        self.request(Method::GET, &path, &[], None).await
    }

    pub async fn get_stores(&self) -> Result<Value> {
        self.request(Method::GET, "/_/v0/dontuse/stores", &[], None).await
    }

    pub async fn fulfill_order(&self, order: &Value) -> Result<Value> {
        self.request(Method::POST, "/v0/d/fulfill_order", &[], Some(order)).await
    }

    pub async fn create_return(&self, order_id: &str, payload: &Value) -> Result<Value> {
        let path = format!("/v0/d/orders/{}/returns", order_id);
        self.request(Method::POST, &path, &[], Some(payload)).await
    }

    /// Runs a query against the data API and returns its `data` member.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let response = self.request(Method::POST, GRAPHQL_PATH, &[], Some(&body)).await?;

        if let Some(errors) = response.get("errors").filter(|e| !e.is_null()) {
            return Err(IntegrationError::processing(format!("GraphQL errors: {}", errors)));
        }
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> NewStoreClient {
        NewStoreClient::new(
            NewStoreConfig {
                host: server.base_url(),
                tenant: "acme".to_string(),
                username: "integrations@acme.com".to_string(),
                password: "secret".to_string(),
            },
            InvocationContext {
                function_name: "price-import".to_string(),
                function_version: "$LATEST".to_string(),
                request_id: "req-1".to_string(),
            },
        )
    }

    #[test]
    fn test_bare_host_gets_https() {
        let client = NewStoreClient::new(
            NewStoreConfig {
                host: "acme.x.newstore.net/".to_string(),
                tenant: "acme".to_string(),
                username: String::new(),
                password: String::new(),
            },
            InvocationContext::default(),
        );
        assert_eq!(client.base_url(), "https://acme.x.newstore.net");
    }

    #[tokio::test]
    async fn test_token_is_reused_between_calls() {
        let server = MockServer::start();
        let token_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v0/token")
                .body_contains("grant_type=password");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "tok-1", "expires_in": 3600}));
        });
        let stores_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/_/v0/dontuse/stores")
                .header("authorization", "Bearer tok-1")
                .header("tenant", "acme")
                .header("X-AWS-Request-ID", "req-1");
            then.status(200)
                .json_body(serde_json::json!({"stores": [{"store_id": "S1"}]}));
        });

        let client = client_for(&server);
        let first = client.get_stores().await.unwrap();
        let second = client.clone().get_stores().await.unwrap();

        token_mock.assert_hits(1);
        stores_mock.assert_hits(2);
        assert_eq!(first, second);
        assert_eq!(first["stores"][0]["store_id"], "S1");
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v0/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "tok", "expires_in": 60}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/v0/d/fulfill_order");
            then.status(400).body(r#"{"error_code": "product_not_reachable"}"#);
        });

        let client = client_for(&server);
        let err = client
            .fulfill_order(&serde_json::json!({"external_id": "1001"}))
            .await
            .unwrap_err();

        match err {
            IntegrationError::NewStoreApiError { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("product_not_reachable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_graphql_returns_data() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v0/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "tok", "expires_in": 60}));
        });
        server.mock(|when, then| {
            when.method(POST).path(GRAPHQL_PATH).body_contains("externalId");
            then.status(200).json_body(serde_json::json!({
                "data": {"orders": {"edges": [{"node": {"id": "uuid-1"}}]}}
            }));
        });

        let client = client_for(&server);
        let data = client
            .graphql("query { orders }", serde_json::json!({"externalId": "1001"}))
            .await
            .unwrap();
        assert_eq!(data["orders"]["edges"][0]["node"]["id"], "uuid-1");
    }
}
