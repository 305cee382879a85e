//! Hypervisor control API client

use crate::actuator_trait::NetworkActuator;
use crate::error::ActuatorError;
use crate::target::HostTarget;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Request body for the execute endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub control: String,
    pub command: String,
}

/// Hypervisor control API client
#[derive(Debug, Clone)]
pub struct HypervisorClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HypervisorClient {
    /// Create a new client
    pub fn new(base_url: String, token: String) -> Result<Self, ActuatorError> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn execute_url(&self) -> String {
        format!("{}/api/v1/execute", self.base_url)
    }
}

#[async_trait::async_trait]
impl NetworkActuator for HypervisorClient {
    async fn execute(&self, target: &HostTarget, command: &str) -> Result<(), ActuatorError> {
        if let HostTarget::Group { name, .. } = target {
            if name.is_empty() {
                return Err(ActuatorError::InvalidTarget("host group name is empty".to_string()));
            }
        }

        let body = ExecuteRequest {
            control: target.to_string(),
            command: command.to_string(),
        };
        let url = self.execute_url();
        debug!("POST {} control={}", url, body.control);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ActuatorError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(ActuatorError::Authentication(format!("{} - {}", status, text)));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error_msg = format!("execute on {} failed: {} - {}", body.control, status, text);
            error!("{}", error_msg);
            return Err(ActuatorError::Api(error_msg));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HypervisorClient::new("http://hyper:8080/".to_string(), "t".to_string()).unwrap();
        assert_eq!(client.base_url(), "http://hyper:8080");
        assert_eq!(client.execute_url(), "http://hyper:8080/api/v1/execute");
    }

    #[tokio::test]
    async fn test_empty_group_rejected_before_request() {
        let client = HypervisorClient::new("http://127.0.0.1:1".to_string(), "t".to_string()).unwrap();
        let result = client.execute(&HostTarget::group(""), "true").await;
        assert!(matches!(result, Err(ActuatorError::InvalidTarget(_))));
    }
}
