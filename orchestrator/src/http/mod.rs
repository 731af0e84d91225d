//! HTTP executor: talks to per-server patch agents
//!
//! Patch execution itself lives on an agent process on each managed
//! host; the orchestrator only asks it to run pre-checks, the patch
//! batch, or post-checks and reads back a per-operation report. Retry
//! of the patch batch is the agent's job, not ours.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

use crate::pipeline::{ExecutionReport, PatchExecutor};
use crate::registry::ServerRecord;

pub struct HttpPatchExecutor {
    client: Client,
    agent_port: u16,
}

impl HttpPatchExecutor {
    pub fn new(agent_port: u16) -> Self {
        // Patch batches can run long; checks cannot. One generous
        // client timeout covers both.
        let client = Client::builder()
            .timeout(Duration::from_secs(3600))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client for HttpPatchExecutor");

        Self { client, agent_port }
    }

    async fn call(&self, server: &ServerRecord, endpoint: &str) -> Result<ExecutionReport> {
        let agent_url = format!("http://{}:{}{}", server.name, self.agent_port, endpoint);
        info!("Calling agent on {}: {}", server.name, endpoint);

        let response = self
            .client
            .post(&agent_url)
            .send()
            .await
            .map_err(|e| anyhow!("Agent request failed on {}: {}", server.name, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Agent call {} failed on {} with status {}: {}",
                endpoint,
                server.name,
                status,
                error_text
            ));
        }

        response
            .json::<ExecutionReport>()
            .await
            .map_err(|e| anyhow!("Failed to parse agent report from {}: {}", server.name, e))
    }
}

#[async_trait]
impl PatchExecutor for HttpPatchExecutor {
    async fn pre_checks(&self, server: &ServerRecord) -> Result<ExecutionReport> {
        self.call(server, "/patch/prechecks").await
    }

    async fn execute(&self, server: &ServerRecord) -> Result<ExecutionReport> {
        self.call(server, "/patch/execute").await
    }

    async fn post_checks(&self, server: &ServerRecord) -> Result<ExecutionReport> {
        self.call(server, "/patch/postchecks").await
    }
}
