//! # azprov – Azure Service Management client
//!
//! Classic (RDFE) Service Management REST API integration used by the
//! provisioning flows.
//!
//! ## Features
//!
//! - **OAuth2 Authentication** – client-credentials flow, token cache
//! - **Hosted Services** – get, create
//! - **Virtual Machines** – production deployment lookup, create deployment, add role,
//!   attach data disks, wait for `ReadyRole`, start, WinRM endpoint discovery
//! - **Certificates** – service certificate lookup by SHA-1 thumbprint
//! - **Web Sites** – web spaces, sites, create, app settings
//! - **Operations** – `x-ms-request-id` polling for accepted requests

pub mod types;
pub mod client;
pub mod auth;
pub mod xml;
pub mod operations;
pub mod hosted_services;
pub mod virtual_machines;
pub mod certificates;
pub mod websites;
pub mod service;

pub use client::AsmClient;
pub use service::{AsmService, AsmServiceState};
pub use types::{AsmConfig, AsmCredentials, AsmError, AsmErrorKind, AsmResult};
