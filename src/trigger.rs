use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::TriggerConfig;
use crate::models::ListingType;

/// Notifies the workflow orchestrator that a new batch is ready by starting
/// a DAG run with the batch locations as its conf.
pub struct DagTrigger {
    client: Client,
    base_url: String,
    dag_id: String,
}

impl DagTrigger {
    /// `None` when no orchestrator is configured
    pub fn from_config(config: &TriggerConfig) -> Result<Option<Self>> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Some(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            dag_id: config.dag_id.clone(),
        }))
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/v1/dags/{}/dagRuns", self.base_url, self.dag_id)
    }

    pub async fn trigger(&self, paths: &BTreeMap<ListingType, String>) -> Result<()> {
        let body = json!({ "conf": { "s3_paths": paths } });
        info!("Triggering DAG '{}' with {}", self.dag_id, body);

        let response = self.client.post(self.endpoint()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("orchestrator returned {}", response.status()));
        }
        info!("Triggered DAG '{}'", self.dag_id);
        Ok(())
    }

    /// Best-effort: failures are logged and swallowed
    pub async fn notify(&self, listing_type: ListingType, path: &str) {
        let mut paths = BTreeMap::new();
        paths.insert(listing_type, path.to_string());
        if let Err(e) = self.trigger(&paths).await {
            warn!("Failed to trigger DAG '{}', but data was scraped: {:#}", self.dag_id, e);
            info!("You can manually trigger the DAG with path: {}", path);
        }
    }
}
