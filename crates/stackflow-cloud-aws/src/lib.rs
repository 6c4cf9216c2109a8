//! AWS CloudFormation gateway for stackflow
//!
//! Manages `stack` resources only; every other kind is reported as
//! unsupported.

pub mod error;
pub mod gateway;
pub mod session;

pub use error::{CloudFormationError, Result};
pub use gateway::{CloudFormationGateway, StackOptions};
pub use session::AwsSession;
