//! OpenStack gateway for stackflow
//!
//! Talks to the OpenStack REST APIs directly over `reqwest`, using a
//! Keystone v3 token obtained from a `clouds.yaml` entry.
//!
//! # Supported kinds
//!
//! - `stack`: Heat (with drift detection)
//! - `keypair`: Nova
//! - `container`: Swift
//! - `volume`: Cinder
//! - `network`: Neutron
//!
//! Subnets, routers and instances belong inside Heat templates.
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud_openstack::{CloudConfig, OpenStackGateway, OpenStackSession};
//!
//! let cloud = CloudConfig::load("ovh")?;
//! let session = OpenStackSession::authenticate(&cloud).await?;
//! let gateway = OpenStackGateway::new(session, "/home/me/.config/stackflow/keys");
//! ```

mod block_storage;
pub mod clouds;
mod compute;
pub mod error;
pub mod gateway;
mod network;
mod object_store;
mod orchestration;
pub mod session;

pub use clouds::{AuthConfig, CloudConfig, find_clouds_file};
pub use error::{OpenStackError, Result};
pub use gateway::OpenStackGateway;
pub use session::{HttpTimeouts, OpenStackSession};
