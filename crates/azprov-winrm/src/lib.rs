//! # azprov – WinRM client
//!
//! WS-Management (WinRM) remote command execution over HTTPS.
//!
//! ## Features
//!
//! - **Negotiate / NTLM authentication** – the listener default, with Basic
//!   as an opt-in
//! - **Trusted listener certificates** – extra DER roots per connection
//! - **Shell lifecycle** – create, command, receive, signal, delete
//! - **PowerShell** – `-EncodedCommand` scripts with exit-code collection

pub mod types;
pub mod auth;
pub mod ntlm;
pub mod transport;
pub mod shell;

pub use shell::{run_script, run_script_checked};
pub use types::{AuthMethod, CommandOutput, WinRmConfig, WinRmCredential, WinRmError, WinRmErrorKind, WinRmResult};
