use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Categorised error kinds for WinRM operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WinRmErrorKind {
    /// Bad endpoint, credentials or certificate material
    Config,
    /// HTTP 401 from the listener
    Auth,
    /// Connection / TLS / body read failure
    Transport,
    /// SOAP fault returned by the listener
    Fault,
    /// Response did not contain what the protocol requires
    Protocol,
    /// Command produced no final state in time
    Timeout,
    /// Remote command finished with a non-zero exit code
    CommandFailed,
}

impl fmt::Display for WinRmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "Configuration error"),
            Self::Auth => write!(f, "Authentication failed"),
            Self::Transport => write!(f, "Transport error"),
            Self::Fault => write!(f, "WS-Management fault"),
            Self::Protocol => write!(f, "Protocol error"),
            Self::Timeout => write!(f, "Timed out"),
            Self::CommandFailed => write!(f, "Remote command failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinRmError {
    pub kind: WinRmErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl WinRmError {
    pub fn new(kind: WinRmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(kind: WinRmErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: Some(status),
        }
    }
}

impl fmt::Display for WinRmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for WinRmError {}

pub type WinRmResult<T> = Result<T, WinRmError>;

// ─── Credentials ─────────────────────────────────────────────────────────────

/// Local account used for Basic authentication against the listener.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRmCredential {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Domain for domain-joined authentication
    #[serde(default)]
    pub domain: Option<String>,
}

impl WinRmCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }
}

impl fmt::Debug for WinRmCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WinRmCredential")
            .field("username", &self.username)
            .field("password", &"***")
            .field("domain", &self.domain)
            .finish()
    }
}

// ─── Connection Configuration ────────────────────────────────────────────────

/// How requests to the listener are authenticated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// SPNEGO answered with NTLM; accepted by a default listener
    #[default]
    Negotiate,
    Ntlm,
    /// Only after `winrm set winrm/config/service/auth @{Basic="true"}`
    Basic,
}

/// Configuration for a WinRM HTTPS connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRmConfig {
    /// Full listener URI, e.g. `https://svc.cloudapp.net:5986/wsman`
    pub endpoint: String,
    /// WS-Management operation timeout in seconds (default: 60)
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_sec: u32,
    /// Connect timeout in seconds (default: 30)
    #[serde(default = "default_open_timeout")]
    pub open_timeout_sec: u32,
    /// Shell idle timeout in seconds (default: 7200, i.e. 2 hours)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_sec: u32,
    /// Upper bound for one command run, output collection included (default: 600)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_sec: u64,
    /// Culture for the remote session (e.g., "en-US")
    #[serde(default = "default_culture")]
    pub culture: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    /// Additional DER-encoded roots trusted for the listener certificate
    #[serde(skip)]
    pub trusted_certificates: Vec<Vec<u8>>,
}

fn default_operation_timeout() -> u32 {
    60
}
fn default_open_timeout() -> u32 {
    30
}
fn default_idle_timeout() -> u32 {
    7200
}
fn default_command_timeout() -> u64 {
    600
}
fn default_culture() -> String {
    "en-US".to_string()
}

impl WinRmConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            operation_timeout_sec: default_operation_timeout(),
            open_timeout_sec: default_open_timeout(),
            idle_timeout_sec: default_idle_timeout(),
            command_timeout_sec: default_command_timeout(),
            culture: default_culture(),
            auth_method: AuthMethod::default(),
            trusted_certificates: Vec::new(),
        }
    }

    /// Operation timeout as an ISO 8601 duration.
    pub fn operation_timeout(&self) -> String {
        format!("PT{}S", self.operation_timeout_sec)
    }
}

// ─── Command Output ──────────────────────────────────────────────────────────

/// Collected output of one remote command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One parsed Receive response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveChunk {
    pub stdout: String,
    pub stderr: String,
    pub done: bool,
    pub exit_code: Option<i32>,
}

// ─── SOAP / WinRM Protocol Types ─────────────────────────────────────────────

/// WinRM SOAP action types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WsManAction {
    Create,
    Delete,
    Command,
    Receive,
    Signal,
}

impl WsManAction {
    pub fn uri(&self) -> &str {
        match self {
            Self::Create => "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create",
            Self::Delete => "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete",
            Self::Command => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command",
            Self::Receive => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive",
            Self::Signal => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal",
        }
    }
}

/// WinRM signal codes.
pub struct WsManSignal;

impl WsManSignal {
    pub const TERMINATE: &'static str =
        "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
}

/// WinRM resource URIs.
pub struct WsManResourceUri;

impl WsManResourceUri {
    pub const SHELL: &'static str =
        "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
}

/// WinRM SOAP namespaces.
pub struct WsManNamespace;

impl WsManNamespace {
    pub const SOAP: &'static str = "http://www.w3.org/2003/05/soap-envelope";
    pub const ADDRESSING: &'static str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
    pub const WSMAN: &'static str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
    pub const WSMAND: &'static str = "http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd";
    pub const SHELL: &'static str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";
    pub const XMLSCHEMA_INST: &'static str = "http://www.w3.org/2001/XMLSchema-instance";
}

/// WS-Management fault code returned when a Receive finds no output within
/// the operation timeout. Not an error: the command is still running.
pub const RECEIVE_TIMED_OUT_CODE: &str = "2150858793";
