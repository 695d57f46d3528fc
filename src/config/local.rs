use crate::domain::ports::{ParameterPage, ParameterSource, Storage};
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem storage; buckets are directories below `base_path`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    fn full_path(&self, bucket: &str, key: &str) -> PathBuf {
        Path::new(&self.base_path).join(bucket).join(key)
    }

    fn collect_keys(dir: &Path, root: &Path, keys: &mut Vec<String>) -> std::io::Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_keys(&path, root, keys)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                let key: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.full_path(bucket, key))?;
        Ok(data)
    }

    async fn write_file(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(bucket, key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.full_path(bucket, key).is_file())
    }

    async fn copy_file(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> Result<()> {
        let data = self.read_file(src_bucket, src_key).await?;
        self.write_file(dst_bucket, dst_key, &data).await
    }

    async fn delete_file(&self, bucket: &str, key: &str) -> Result<()> {
        fs::remove_file(self.full_path(bucket, key))?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let root = Path::new(&self.base_path).join(bucket);
        let mut keys = Vec::new();
        Self::collect_keys(&root, &root, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    async fn presigned_url(&self, bucket: &str, key: &str) -> Result<String> {
        let path = fs::canonicalize(self.full_path(bucket, key))?;
        url::Url::from_file_path(&path)
            .map(|u| u.to_string())
            .map_err(|_| IntegrationError::storage(format!("cannot build URL for {}", path.display())))
    }
}

#[derive(Debug, Deserialize)]
struct ParametersFile {
    parameters: BTreeMap<String, String>,
}

/// Parameters read from a TOML file, for running integrations outside AWS.
///
/// ```toml
/// [parameters]
/// "/acme/x/newstore" = '{"host": "acme.x.newstore.net", "password": "${NS_PASSWORD}"}'
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalParameters {
    values: BTreeMap<String, String>,
}

impl LocalParameters {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content)?;
        let file: ParametersFile = toml::from_str(&processed).map_err(|e| IntegrationError::InvalidConfigValueError {
            field: "parameters".to_string(),
            value: "<toml>".to_string(),
            reason: format!("TOML parsing error: {}", e),
        })?;
        Ok(Self {
            values: file.parameters,
        })
    }
}

/// 替換環境變數 (例如 ${NS_PASSWORD})；未設定的變數保持原樣
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| IntegrationError::config(e.to_string()))?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.to_string())
}

#[async_trait]
impl ParameterSource for LocalParameters {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.get(name).cloned())
    }

    async fn get_parameters_by_path(&self, path: &str, _next_token: Option<String>) -> Result<ParameterPage> {
        let base = path.trim_end_matches('/');
        let parameters = self
            .values
            .iter()
            .filter(|(name, _)| {
                name.strip_prefix(base)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(ParameterPage {
            parameters,
            next_token: None,
        })
    }
}
