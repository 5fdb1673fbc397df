//! downscaler-aws — AWS adapters for the downscaler.
//!
//! - [`AsgGateway`] implements `CapacityGateway` over the Auto Scaling API.
//! - [`InstanceIdentity`] reads the EC2 instance identity document, which
//!   supplies the region for the client and the instance id used to
//!   autodetect the owning group.

pub mod asg;
pub mod metadata;

pub use asg::{AsgGateway, TRANSIENT_ERROR_CODES, classify_set_error};
pub use metadata::InstanceIdentity;
