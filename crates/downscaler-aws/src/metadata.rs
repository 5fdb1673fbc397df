//! EC2 instance identity lookup via the instance metadata service.

use serde::Deserialize;
use tracing::debug;

use downscaler_core::{GatewayError, GatewayResult};

const IDENTITY_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

/// The fields of the instance identity document the daemon needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub region: String,
}

impl InstanceIdentity {
    /// Fetch the identity document of the instance this process runs on.
    pub async fn fetch() -> GatewayResult<Self> {
        let client = aws_config::imds::Client::builder().build();
        let document = client
            .get(IDENTITY_DOCUMENT_PATH)
            .await
            .map_err(|e| GatewayError::Metadata(format!("cannot get identity document: {e}")))?;
        let identity = Self::from_json(document.as_ref())?;
        debug!(instance_id = %identity.instance_id, region = %identity.region, "instance identity");
        Ok(identity)
    }

    pub fn from_json(document: &str) -> GatewayResult<Self> {
        serde_json::from_str(document)
            .map_err(|e| GatewayError::Metadata(format!("malformed identity document: {e}")))
    }
}
