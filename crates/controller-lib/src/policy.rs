//! Policy engine client
//!
//! Asks the external policy engine whether one relocation may proceed.
//! The engine is advisory: when it is unreachable, answers with a non-2xx
//! status, or returns an undecodable body, the client reports "no opinion"
//! and the executor proceeds. `fail_open: false` turns an unreachable
//! engine into a denial instead.

use crate::models::{MigrationDecision, PodInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

const POLICY_PATH: &str = "/api/v1/migration/policy";

/// Client-side view of the policy engine
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// `None` means the engine had no opinion (unreachable or undecodable)
    async fn migration_policy(
        &self,
        pod: &PodInfo,
        source_node: &str,
        target_node: &str,
    ) -> Option<MigrationDecision>;

    /// Whether an absent opinion counts as permission
    fn fail_open(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct PolicyRequest<'a> {
    pod: &'a PodInfo,
    source_node: &'a str,
    target_node: &'a str,
}

/// HTTP client for the policy engine service
pub struct PolicyEngineClient {
    client: Client,
    base_url: Url,
    fail_open: bool,
}

impl PolicyEngineClient {
    pub fn new(base_url: &str, fail_open: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid policy engine URL")?;

        Ok(Self {
            client,
            base_url,
            fail_open,
        })
    }
}

#[async_trait]
impl PolicyClient for PolicyEngineClient {
    async fn migration_policy(
        &self,
        pod: &PodInfo,
        source_node: &str,
        target_node: &str,
    ) -> Option<MigrationDecision> {
        let url = match self.base_url.join(POLICY_PATH) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Invalid policy engine path");
                return None;
            }
        };

        let request = PolicyRequest {
            pod,
            source_node,
            target_node,
        };

        let response = match self.client.post(url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Policy engine unreachable");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Policy engine returned an error");
            return None;
        }

        match response.json::<MigrationDecision>().await {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!(error = %e, "Undecodable policy engine response");
                None
            }
        }
    }

    fn fail_open(&self) -> bool {
        self.fail_open
    }
}
