use super::INTEGRATION_ROOT;
use crate::clients::circleci::Pipeline;
use crate::clients::CircleCiClient;
use crate::utils::error::Result;
use serde_json::{json, Value};
use std::path::Path;

/// `integrations/price_import` and `price_import` both name `price_import`.
pub fn integration_name(integration_path: &str) -> &str {
    integration_path
        .strip_prefix(INTEGRATION_ROOT)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(integration_path)
}

pub fn has_makefile(base_dir: &Path, integration: &str) -> bool {
    base_dir
        .join(INTEGRATION_ROOT)
        .join(integration)
        .join("Makefile")
        .is_file()
}

pub fn pipeline_parameters(integration: &str, run_make: bool) -> Value {
    json!({
        "run_default": !run_make,
        "trigger": false,
        "integration": integration,
        "run_make": run_make,
    })
}

pub async fn run_workflow(
    circleci: &CircleCiClient,
    base_dir: &Path,
    integration_path: &str,
    branch: &str,
) -> Result<Pipeline> {
    let integration = integration_name(integration_path);
    tracing::info!("got integration name {}", integration);

    let run_make = has_makefile(base_dir, integration);
    if run_make {
        tracing::info!("make file found. Running make workflow");
    }

    circleci
        .run_pipeline(branch, pipeline_parameters(integration, run_make))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_integration_name() {
        assert_eq!(integration_name("integrations/price_import"), "price_import");
        assert_eq!(integration_name("price_import"), "price_import");
    }

    #[test]
    fn test_makefile_switches_workflow() {
        let dir = TempDir::new().unwrap();
        let integration = dir.path().join(INTEGRATION_ROOT).join("auth_token");
        std::fs::create_dir_all(&integration).unwrap();
        assert!(!has_makefile(dir.path(), "auth_token"));

        std::fs::write(integration.join("Makefile"), "deploy:\n").unwrap();
        assert!(has_makefile(dir.path(), "auth_token"));
        assert_eq!(
            pipeline_parameters("auth_token", true),
            json!({"run_default": false, "trigger": false, "integration": "auth_token", "run_make": true})
        );
    }
}
