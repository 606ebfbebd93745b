//! # azprov
//!
//! Provisioning flows over the classic Azure Service Management API:
//!
//! - **vm** – ensure a hosted service and a VM with data disks, trust its
//!   WinRM certificate, then partition and format the raw disks remotely
//! - **site** – ensure a web site and merge app settings into it
//! - **start** – start VMs of a hosted service
//!
//! The cloud, trust store and remote command seams are traits so the flows
//! run against in-memory implementations in tests.

pub mod cli;
pub mod config;
pub mod disks;
pub mod error;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod provisioner;
pub mod remote;
pub mod startup;
pub mod trust_store;
pub mod website;

pub use config::ProvisionConfig;
pub use error::{ProvisionError, Result};
pub use provider::{AsmProvider, CloudProvider, WebsiteProvider};
pub use provisioner::{Provisioner, VmRequest};
pub use remote::{RemoteExecutor, WinRmExecutor};
pub use trust_store::{FileTrustStore, TrustStore};
pub use website::SiteProvisioner;
