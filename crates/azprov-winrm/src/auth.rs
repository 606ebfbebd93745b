//! Listener authentication.
//!
//! A default WinRM service only accepts Negotiate (Kerberos or NTLM); Basic
//! has to be enabled on the VM before it can be used.

use base64::Engine;

use crate::ntlm::NtlmAuth;
use crate::types::*;

/// Produces `Authorization` headers and answers 401 challenges.
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Header for the first request of an exchange.
    fn initial_header(&mut self) -> WinRmResult<String>;

    /// Next header for the `WWW-Authenticate` values of a 401, or `None`
    /// when the server rejected the credentials.
    fn process_challenge(&mut self, challenges: &[String]) -> WinRmResult<Option<String>>;

    /// Refuse to send this header over plain HTTP.
    fn requires_https(&self) -> bool {
        false
    }

    /// The exchange authenticates the connection, not each request.
    fn connection_oriented(&self) -> bool {
        false
    }
}

/// `Basic base64(account:password)`, where account is `DOMAIN\user` when a
/// domain is set.
pub struct BasicAuth {
    account: String,
    password: String,
}

impl BasicAuth {
    pub fn new(credential: &WinRmCredential) -> Self {
        let account = match credential.domain.as_deref().filter(|d| !d.is_empty()) {
            Some(domain) if !credential.username.is_empty() => {
                format!("{}\\{}", domain, credential.username)
            }
            _ => credential.username.clone(),
        };
        Self {
            account,
            password: credential.password.clone(),
        }
    }
}

impl AuthProvider for BasicAuth {
    fn name(&self) -> &str {
        "Basic"
    }

    fn initial_header(&mut self) -> WinRmResult<String> {
        if self.account.is_empty() {
            return Err(WinRmError::new(WinRmErrorKind::Config, "username is required"));
        }
        let pair = format!("{}:{}", self.account, self.password);
        Ok(format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(pair)
        ))
    }

    fn process_challenge(&mut self, _challenges: &[String]) -> WinRmResult<Option<String>> {
        Ok(None)
    }

    fn requires_https(&self) -> bool {
        true
    }
}

/// SPNEGO as offered by the WinRM service, answered with NTLM.
pub struct NegotiateAuth(NtlmAuth);

impl NegotiateAuth {
    pub fn new(credential: &WinRmCredential) -> Self {
        Self(NtlmAuth::with_scheme("Negotiate", credential))
    }
}

impl AuthProvider for NegotiateAuth {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn initial_header(&mut self) -> WinRmResult<String> {
        self.0.initial_header()
    }

    fn process_challenge(&mut self, challenges: &[String]) -> WinRmResult<Option<String>> {
        self.0.process_challenge(challenges)
    }

    fn connection_oriented(&self) -> bool {
        true
    }
}

pub fn provider_for(method: AuthMethod, credential: &WinRmCredential) -> Box<dyn AuthProvider> {
    match method {
        AuthMethod::Negotiate => Box::new(NegotiateAuth::new(credential)),
        AuthMethod::Ntlm => Box::new(NtlmAuth::new(credential)),
        AuthMethod::Basic => Box::new(BasicAuth::new(credential)),
    }
}
