//! ConfigMapSink — snapshot persistence in a Kubernetes ConfigMap.
//!
//! Upserts with server-side apply, so the map is created on first write and
//! only the `ASGSize` key is owned by the downscaler afterwards.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use tracing::debug;

use downscaler_core::{CapacitySnapshot, SnapshotSink};

use crate::error::{StateError, StateResult};

const FIELD_MANAGER: &str = "asg-downscaler";
const ASG_SIZE_KEY: &str = "ASGSize";
const GROUP_ANNOTATION: &str = "downscaler/asg-name";

pub struct ConfigMapSink {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapSink {
    /// Connect with the in-cluster (or kubeconfig) client.
    ///
    /// Without `namespace` the client's default namespace is used.
    pub async fn connect(name: impl Into<String>, namespace: Option<&str>) -> StateResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| StateError::Kube(e.to_string()))?;
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::default_namespaced(client),
        };
        Ok(Self {
            api,
            name: name.into(),
        })
    }

    pub fn configmap_name(&self) -> &str {
        &self.name
    }
}

/// The ConfigMap applied for `snapshot`.
pub fn desired_configmap(name: &str, group: &str, snapshot: CapacitySnapshot) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([(
                GROUP_ANNOTATION.to_string(),
                group.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            ASG_SIZE_KEY.to_string(),
            snapshot.asg_size.to_string(),
        )])),
        ..Default::default()
    }
}

#[async_trait]
impl SnapshotSink for ConfigMapSink {
    fn name(&self) -> &str {
        "configmap-state"
    }

    async fn record(&self, group: &str, snapshot: CapacitySnapshot) -> anyhow::Result<()> {
        let desired = desired_configmap(&self.name, group, snapshot);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.api
            .patch(&self.name, &params, &Patch::Apply(&desired))
            .await
            .map_err(|e| StateError::Kube(e.to_string()))?;
        debug!(configmap = %self.name, %group, asg_size = snapshot.asg_size, "configmap state updated");
        Ok(())
    }
}
