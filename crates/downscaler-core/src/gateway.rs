//! The seam between the reconciler and the capacity-management API.

use async_trait::async_trait;

use crate::error::GatewayResult;

/// Capacity-management operations the reconciler consumes.
///
/// Implemented by the AWS Auto Scaling adapter in `downscaler-aws` and by
/// in-memory doubles in tests.
#[async_trait]
pub trait CapacityGateway: Send + Sync {
    /// Desired capacity of `group`.
    async fn current_capacity(&self, group: &str) -> GatewayResult<u32>;

    /// Request a new desired capacity for `group`.
    ///
    /// Returns [`GatewayError::Transient`](crate::GatewayError::Transient)
    /// for provider conditions that resolve on their own.
    async fn set_capacity(&self, group: &str, target: u32) -> GatewayResult<()>;

    /// Name of the single group owning `member_id`. Zero or several owners
    /// is an error.
    async fn resolve_group_for_member(&self, member_id: &str) -> GatewayResult<String>;
}
