use crate::domain::ports::ParameterSource;
use crate::utils::error::{IntegrationError, Result};
use crate::utils::validation::{validate_host, validate_non_empty_string, Validate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Connection settings stored under the `newstore` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStoreConfig {
    pub host: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Validate for NewStoreConfig {
    fn validate(&self) -> Result<()> {
        validate_host("newstore.host", &self.host)?;
        validate_non_empty_string("newstore.tenant", &self.tenant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Name relative to the tenant/stage root.
    pub key: String,
    pub value: String,
}

/// Tenant/stage scoped access to the parameter store.
///
/// Parameters live under `/<tenant>/<stage>/<name>`. Values are cached for
/// the lifetime of the instance, which for a Lambda is the warm container.
pub struct ParamStore<P: ParameterSource> {
    source: P,
    tenant: String,
    stage: String,
    path_root: String,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl<P: ParameterSource> ParamStore<P> {
    pub fn new(source: P, tenant: &str, stage: &str) -> Self {
        Self {
            source,
            tenant: tenant.to_string(),
            stage: stage.to_string(),
            path_root: format!("/{}/{}/", tenant, stage),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn path_root(&self) -> &str {
        &self.path_root
    }

    fn cached(&self, key: &str) -> Option<Option<String>> {
        self.cache.lock().ok().and_then(|c| c.get(key).cloned())
    }

    /// Value of `key` below the root, `None` when it does not exist.
    pub async fn get_param(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.cached(key) {
            tracing::debug!("Parameter {} served from cache", key);
            return Ok(value);
        }

        let path = format!("{}{}", self.path_root, key);
        tracing::debug!("Fetching parameter {}", path);
        let value = self.source.get_parameter(&path).await.map_err(|e| {
            tracing::error!("Error when trying to get parameter {}: {}", path, e);
            e
        })?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key.to_string(), value.clone());
        }
        Ok(value)
    }

    pub async fn require_param(&self, key: &str) -> Result<String> {
        self.get_param(key)
            .await?
            .ok_or_else(|| IntegrationError::MissingConfigError {
                field: format!("{}{}", self.path_root, key),
            })
    }

    /// Parses a JSON encoded parameter.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw = self.require_param(key).await?;
        serde_json::from_str(&raw).map_err(|e| IntegrationError::InvalidConfigValueError {
            field: key.to_string(),
            value: "<json>".to_string(),
            reason: e.to_string(),
        })
    }

    /// All direct children of `input_path`, following pagination. Keys are
    /// returned without the root prefix.
    pub async fn get_params_by_path(&self, input_path: &str) -> Result<Vec<Parameter>> {
        let path = format!("{}{}", self.path_root, input_path);
        let prefix_len = self.path_root.len();
        let mut parameters = Vec::new();
        let mut next_token = None;

        loop {
            let page = self.source.get_parameters_by_path(&path, next_token).await?;
            parameters.extend(page.parameters.into_iter().map(|(name, value)| Parameter {
                key: name.get(prefix_len..).unwrap_or_default().to_string(),
                value,
            }));

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(parameters)
    }

    pub async fn newstore_config(&self) -> Result<NewStoreConfig> {
        let mut config: NewStoreConfig = self.get_json("newstore").await?;
        if config.tenant.is_empty() {
            config.tenant = self.tenant.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Distribution centre name to fulfillment node id.
    pub async fn distribution_centres(&self) -> Result<BTreeMap<String, String>> {
        self.get_json("distribution_centres").await
    }
}
