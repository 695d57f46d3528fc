//! Creates and starts a NewStore import job for each chunk released into the
//! import location.

use crate::clients::NewStoreClient;
use crate::config::env;
use crate::domain::model::S3Event;
use crate::domain::ports::Storage;
use crate::utils::error::{IntegrationError, Result};
use crate::utils::validation::{validate_non_empty_string, Validate};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: String,
    pub entities: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            provider: env::required("PROVIDER")?,
            entities: parse_entities(&env::required("ENTITIES")?),
        })
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("PROVIDER", &self.provider)?;
        if self.entities.is_empty() {
            return Err(IntegrationError::MissingConfigError {
                field: "ENTITIES".to_string(),
            });
        }
        Ok(())
    }
}

pub fn parse_entities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

fn field<'v>(value: &'v Value, name: &str) -> Result<&'v str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| IntegrationError::processing(format!("response has no '{}': {}", name, value)))
}

/// Starts jobs left in `received` whose first entity matches ours, e.g. after
/// an earlier invocation timed out between create and start.
pub async fn start_previously_received(client: &NewStoreClient, entities: &[String]) -> Result<usize> {
    let jobs = client.get_import_jobs_by_state("received").await?;
    let items = jobs.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
    if items.is_empty() {
        tracing::info!("No previous imports to start");
        return Ok(0);
    }

    let mut started = 0;
    for job in items {
        let first_entity = job
            .get("entities")
            .and_then(Value::as_array)
            .and_then(|e| e.first())
            .and_then(Value::as_str);
        if first_entity != entities.first().map(String::as_str) {
            continue;
        }

        tracing::info!("Start previously received import {}", job);
        let details = client.get_import_job(field(&job, "import_id")?).await?;
        let body = json!({ "transformed_uri": field(&details, "source_uri")? });
        client.start_import(field(&details, "import_id")?, &body).await?;
        tracing::info!("Started previously received import");
        started += 1;
    }
    Ok(started)
}

/// Returns the ids of the imports created for the event.
pub async fn handle<S: Storage>(storage: &S, client: &NewStoreClient, settings: &Settings, event: &S3Event) -> Result<Vec<String>> {
    start_previously_received(client, &settings.entities).await?;

    let mut import_ids = Vec::new();
    for record in &event.records {
        if !matches!(record.event_name.as_str(), "ObjectCreated:Put" | "ObjectCreated:Copy") {
            tracing::warn!("Ignoring {} event", record.event_name);
            continue;
        }

        let key = record.decoded_key();
        let link = storage.presigned_url(record.bucket(), &key).await?;

        let import_body = json!({
            "provider": settings.provider,
            "source_uri": link,
            "revision": chrono::Utc::now().timestamp_millis(),
            "entities": settings.entities,
        });
        let created = client.create_import(&import_body).await?;
        let import_id = field(&created, "id")?.to_string();
        tracing::info!("Created import {}", import_id);

        let response = client
            .start_import(&import_id, &json!({ "transformed_uri": link }))
            .await?;
        tracing::info!("Started import {}", import_id);
        tracing::debug!("{}", response);
        import_ids.push(import_id);
    }

    Ok(import_ids)
}
