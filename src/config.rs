//! Provisioning configuration.
//!
//! Loaded from a camelCase JSON file (explicit `--config` path or
//! `<config_dir>/azprov/config.json`), then overridden by `AZPROV_*`
//! environment variables.

use std::path::{Path, PathBuf};

use azprov_asm::{AsmConfig, AsmCredentials};
use azprov_winrm::AuthMethod;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ProvisionError, Result};

pub const ENV_SUBSCRIPTION_ID: &str = "AZPROV_SUBSCRIPTION_ID";
pub const ENV_TENANT_ID: &str = "AZPROV_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "AZPROV_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZPROV_CLIENT_SECRET";
pub const ENV_STORAGE_ACCOUNT: &str = "AZPROV_STORAGE_ACCOUNT";
pub const ENV_TRUST_STORE: &str = "AZPROV_TRUST_STORE";

/// Windows Server 2012 R2 Datacenter gallery image.
pub const DEFAULT_IMAGE_NAME: &str =
    "a699494373c04fc0bc8f2bb1389d6106__Windows-Server-2012-R2-201505.01-en.us-127GB.vhd";
pub const DEFAULT_ROLE_SIZE: &str = "Small";

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvisionConfig {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    /// Storage account holding the VHD blobs of new disks
    pub storage_account: Option<String>,
    pub management_base: String,
    pub api_version: String,
    pub role_size: String,
    pub image_name: String,
    pub poll_interval_secs: u64,
    pub boot_timeout_secs: u64,
    pub operation_timeout_secs: u64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub winrm_operation_timeout_secs: u64,
    /// `negotiate` (default), `ntlm` or `basic`
    pub winrm_auth: AuthMethod,
    pub trust_store_dir: Option<PathBuf>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        let asm = AsmConfig::default();
        Self {
            subscription_id: String::new(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            storage_account: None,
            management_base: asm.management_base,
            api_version: asm.api_version,
            role_size: DEFAULT_ROLE_SIZE.into(),
            image_name: DEFAULT_IMAGE_NAME.into(),
            poll_interval_secs: asm.poll_interval_secs,
            boot_timeout_secs: asm.boot_timeout_secs,
            operation_timeout_secs: asm.operation_timeout_secs,
            max_retries: asm.max_retries,
            request_timeout_secs: asm.request_timeout_secs,
            winrm_operation_timeout_secs: 600,
            winrm_auth: AuthMethod::default(),
            trust_store_dir: None,
        }
    }
}

/// `<config_dir>/azprov/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("azprov").join("config.json"))
}

impl ProvisionConfig {
    /// Load the file (an explicit path must exist, the default one may be
    /// absent) and apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading configuration");
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
            .map_err(|e| ProvisionError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Override fields from `AZPROV_*` variables; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_SUBSCRIPTION_ID) {
            self.subscription_id = v;
        }
        if let Some(v) = get(ENV_TENANT_ID) {
            self.tenant_id = v;
        }
        if let Some(v) = get(ENV_CLIENT_ID) {
            self.client_id = v;
        }
        if let Some(v) = get(ENV_CLIENT_SECRET) {
            self.client_secret = Some(SecretString::new(v));
        }
        if let Some(v) = get(ENV_STORAGE_ACCOUNT) {
            self.storage_account = Some(v);
        }
        if let Some(v) = get(ENV_TRUST_STORE) {
            self.trust_store_dir = Some(PathBuf::from(v));
        }
    }

    /// Fail with the list of missing credential fields.
    pub fn validate_credentials(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.subscription_id.is_empty() {
            missing.push("subscriptionId");
        }
        if self.tenant_id.is_empty() {
            missing.push("tenantId");
        }
        if self.client_id.is_empty() {
            missing.push("clientId");
        }
        if self
            .client_secret
            .as_ref()
            .map_or(true, |s| s.expose_secret().is_empty())
        {
            missing.push("clientSecret");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::config(format!(
                "missing credentials: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn asm_config(&self) -> AsmConfig {
        AsmConfig {
            management_base: self.management_base.clone(),
            api_version: self.api_version.clone(),
            max_retries: self.max_retries,
            request_timeout_secs: self.request_timeout_secs,
            poll_interval_secs: self.poll_interval_secs,
            operation_timeout_secs: self.operation_timeout_secs,
            boot_timeout_secs: self.boot_timeout_secs,
        }
    }

    pub fn asm_credentials(&self) -> AsmCredentials {
        AsmCredentials {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self
                .client_secret
                .as_ref()
                .map(|s| s.expose_secret().clone())
                .unwrap_or_default(),
            subscription_id: self.subscription_id.clone(),
        }
    }

    /// Configured trust store, else `<data_dir>/azprov/trusted-certs`.
    pub fn trust_store_dir(&self) -> PathBuf {
        self.trust_store_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("azprov")
                .join("trusted-certs")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let c = ProvisionConfig::default();
        assert_eq!(c.api_version, "2015-04-01");
        assert_eq!(c.role_size, "Small");
        assert_eq!(c.image_name, DEFAULT_IMAGE_NAME);
        assert_eq!(c.poll_interval_secs, 10);
        assert_eq!(c.boot_timeout_secs, 1800);
        assert_eq!(c.operation_timeout_secs, 900);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.request_timeout_secs, 60);
        assert_eq!(c.winrm_operation_timeout_secs, 600);
        assert_eq!(c.winrm_auth, AuthMethod::Negotiate);
        assert!(c.trust_store_dir().ends_with("azprov/trusted-certs"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = ProvisionConfig::from_json(
            r#"{"subscriptionId":"sub","storageAccount":"acct","roleSize":"Medium","maxRetries":3}"#,
        )
        .unwrap();
        assert_eq!(c.subscription_id, "sub");
        assert_eq!(c.storage_account.as_deref(), Some("acct"));
        assert_eq!(c.role_size, "Medium");
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.boot_timeout_secs, 1800);
        assert_eq!(c.asm_config().max_retries, 3);
        assert_eq!(c.winrm_auth, AuthMethod::Negotiate);

        let c = ProvisionConfig::from_json(r#"{"winrmAuth":"basic"}"#).unwrap();
        assert_eq!(c.winrm_auth, AuthMethod::Basic);
    }

    #[test]
    fn env_overrides_file() {
        let mut c = ProvisionConfig::from_json(r#"{"subscriptionId":"file-sub","tenantId":"t"}"#)
            .unwrap();
        c.apply_env(env(&[
            (ENV_SUBSCRIPTION_ID, "env-sub"),
            (ENV_TENANT_ID, "  "),
            (ENV_CLIENT_SECRET, "shh"),
            (ENV_TRUST_STORE, "/tmp/certs"),
        ]));
        assert_eq!(c.subscription_id, "env-sub");
        assert_eq!(c.tenant_id, "t");
        assert_eq!(c.asm_credentials().client_secret, "shh");
        assert_eq!(c.trust_store_dir(), PathBuf::from("/tmp/certs"));
    }

    #[test]
    fn secret_not_in_debug_output() {
        let mut c = ProvisionConfig::default();
        c.apply_env(env(&[(ENV_CLIENT_SECRET, "super-secret-value")]));
        assert!(!format!("{:?}", c).contains("super-secret-value"));
    }

    #[test]
    fn credential_validation_lists_missing() {
        let mut c = ProvisionConfig::default();
        c.subscription_id = "sub".into();
        let e = c.validate_credentials().unwrap_err();
        assert_eq!(
            e.to_string(),
            "Configuration error: missing credentials: tenantId, clientId, clientSecret"
        );
        c.apply_env(env(&[
            (ENV_TENANT_ID, "t"),
            (ENV_CLIENT_ID, "c"),
            (ENV_CLIENT_SECRET, "s"),
        ]));
        assert!(c.validate_credentials().is_ok());
    }

    #[test]
    fn explicit_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let e = ProvisionConfig::from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(e, ProvisionError::Config(_)));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{"clientId":"cid","pollIntervalSecs":1}}"#).unwrap();
        let c = ProvisionConfig::from_file(&path).unwrap();
        assert_eq!(c.client_id, "cid");
        assert_eq!(c.poll_interval_secs, 1);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ProvisionConfig::from_file(&path),
            Err(ProvisionError::Config(_))
        ));
    }
}
