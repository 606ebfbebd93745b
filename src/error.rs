//! Error handling for the provisioning flows.
//!
//! Provider and remote-execution failures keep their library error intact so
//! the kind and HTTP status survive up to the CLI.

use azprov_asm::AsmError;
use azprov_winrm::WinRmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Resource absent and no location given to create it
    #[error("{resource} '{name}' does not exist and no location was supplied to create it")]
    MissingLocation { resource: &'static str, name: String },

    /// Service Management API failure
    #[error("Provider error: {0}")]
    Provider(#[from] AsmError),

    /// Remote command or its transport failed
    #[error("Remote execution failed: {0}")]
    RemoteExecution(#[from] WinRmError),

    /// Certificate data unusable or not matching its thumbprint
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Local trust store I/O
    #[error("Trust store error: {0}")]
    TrustStore(#[from] std::io::Error),

    /// Invalid caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration file or credentials
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    pub fn missing_location(resource: &'static str, name: impl Into<String>) -> Self {
        Self::MissingLocation {
            resource,
            name: name.into(),
        }
    }

    pub fn certificate(msg: impl Into<String>) -> Self {
        Self::Certificate(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
