//! Auto Scaling API adapter.

use std::fmt::Display;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_autoscaling::Client;
use aws_sdk_autoscaling::config::Region;
use aws_sdk_autoscaling::error::{DisplayErrorContext, ProvideErrorMetadata};
use tracing::debug;

use downscaler_core::{CapacityGateway, GatewayError, GatewayResult};

/// Provider error codes that resolve on their own and must not stop the
/// daemon.
pub const TRANSIENT_ERROR_CODES: [&str; 2] = ["ScalingActivityInProgress", "ResourceContention"];

/// Map a `SetDesiredCapacity` failure onto the gateway error taxonomy.
pub fn classify_set_error(code: Option<&str>, message: impl Display) -> GatewayError {
    match code {
        Some(code) if TRANSIENT_ERROR_CODES.contains(&code) => GatewayError::Transient {
            code: code.to_string(),
            message: message.to_string(),
        },
        Some(code) => GatewayError::Provider(format!("{code}: {message}")),
        None => GatewayError::Provider(message.to_string()),
    }
}

/// `CapacityGateway` backed by the AWS Auto Scaling service.
#[derive(Clone, Debug)]
pub struct AsgGateway {
    client: Client,
}

impl AsgGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for `region` from the default credential chain.
    pub async fn for_region(region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl CapacityGateway for AsgGateway {
    async fn current_capacity(&self, group: &str) -> GatewayResult<u32> {
        let out = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Provider(format!(
                    "cannot get current size of autoscaling group: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let desired = out
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| GatewayError::GroupNotFound(group.to_string()))?
            .desired_capacity();
        let capacity = desired_capacity(group, desired)?;
        debug!(%group, capacity, "read desired capacity");
        Ok(capacity)
    }

    async fn set_capacity(&self, group: &str, target: u32) -> GatewayResult<()> {
        let desired = i32::try_from(target)
            .map_err(|_| GatewayError::Provider(format!("capacity {target} exceeds i32")))?;

        self.client
            .set_desired_capacity()
            .auto_scaling_group_name(group)
            .desired_capacity(desired)
            .honor_cooldown(true)
            .send()
            .await
            .map_err(|e| classify_set_error(e.code(), DisplayErrorContext(&e)))?;

        debug!(%group, target, "desired capacity set");
        Ok(())
    }

    async fn resolve_group_for_member(&self, member_id: &str) -> GatewayResult<String> {
        let out = self
            .client
            .describe_auto_scaling_instances()
            .instance_ids(member_id)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(DisplayErrorContext(&e).to_string()))?;

        let owners: Vec<Option<&str>> = out
            .auto_scaling_instances()
            .iter()
            .map(|i| i.auto_scaling_group_name())
            .collect();
        single_owner(member_id, &owners)
    }
}

fn desired_capacity(group: &str, desired: Option<i32>) -> GatewayResult<u32> {
    let desired = desired.ok_or_else(|| GatewayError::NoDesiredCapacity(group.to_string()))?;
    u32::try_from(desired).map_err(|_| {
        GatewayError::Provider(format!("negative desired capacity {desired} for {group}"))
    })
}

fn single_owner(member_id: &str, owners: &[Option<&str>]) -> GatewayResult<String> {
    match owners {
        [Some(name)] => Ok((*name).to_string()),
        [None] => Err(GatewayError::Provider(format!(
            "instance {member_id} reported without an autoscaling group name"
        ))),
        _ => Err(GatewayError::AmbiguousGroup {
            member: member_id.to_string(),
            found: owners.len(),
        }),
    }
}
