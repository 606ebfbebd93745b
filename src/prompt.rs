//! Admin credential collection for the `vm` flow.

use std::io::{self, BufRead, Write};

use crate::error::{ProvisionError, Result};
use crate::model::AdminCredential;

pub const ENV_ADMIN_USERNAME: &str = "AZPROV_ADMIN_USERNAME";
pub const ENV_ADMIN_PASSWORD: &str = "AZPROV_ADMIN_PASSWORD";

/// Username from the flag, then the environment, then `ask_username`;
/// password from the environment, then `ask_password`.
pub fn resolve_credential<L, U, P>(
    username_flag: Option<&str>,
    lookup: L,
    ask_username: U,
    ask_password: P,
) -> Result<AdminCredential>
where
    L: Fn(&str) -> Option<String>,
    U: FnOnce() -> io::Result<String>,
    P: FnOnce() -> io::Result<String>,
{
    let env = |key: &str| lookup(key).filter(|v| !v.is_empty());

    let username = match username_flag.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => u.to_string(),
        None => match env(ENV_ADMIN_USERNAME) {
            Some(u) => u,
            None => ask_username()
                .map_err(|e| ProvisionError::config(format!("cannot read admin username: {}", e)))?
                .trim()
                .to_string(),
        },
    };
    if username.is_empty() {
        return Err(ProvisionError::validation("admin username must not be empty"));
    }

    let password = match env(ENV_ADMIN_PASSWORD) {
        Some(p) => p,
        None => ask_password()
            .map_err(|e| ProvisionError::config(format!("cannot read admin password: {}", e)))?,
    };
    if password.is_empty() {
        return Err(ProvisionError::validation("admin password must not be empty"));
    }

    Ok(AdminCredential::new(username, password))
}

/// Interactive variant: prompts go to stderr, the password is not echoed.
pub fn admin_credential(username_flag: Option<&str>) -> Result<AdminCredential> {
    resolve_credential(
        username_flag,
        |key| std::env::var(key).ok(),
        || {
            let mut stderr = io::stderr();
            write!(stderr, "Admin username: ")?;
            stderr.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        },
        || rpassword::prompt_password("Admin password: "),
    )
}
