use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

use mindflow_core::tools::{Tool, ToolError};
use mindflow_settings::RemoteToolSettings;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A tool served over HTTP. Arguments are POSTed as a JSON object and the
/// JSON response body is the result.
pub struct RemoteTool {
    settings: RemoteToolSettings,
    client: Client,
}

impl RemoteTool {
    pub fn new(settings: RemoteToolSettings) -> Result<Self, ToolError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { settings, client })
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn description(&self) -> &str {
        &self.settings.description
    }

    fn parameters_schema(&self) -> Value {
        self.settings.parameters.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        debug!(tool = %self.settings.name, endpoint = %self.settings.endpoint, "calling remote tool");
        let resp = self
            .client
            .post(&self.settings.endpoint)
            .json(&Value::Object(args))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed(format!(
                "{} returned {}: {}",
                self.settings.name,
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("invalid JSON from {}: {e}", self.settings.name)))
    }
}
