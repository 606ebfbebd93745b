//! Remote command seam and its WinRM implementation.

use async_trait::async_trait;
use azprov_winrm::{run_script_checked, AuthMethod, WinRmConfig, WinRmCredential};
use tracing::debug;

use crate::error::Result;
use crate::model::AdminCredential;

/// Initialize every RAW disk as MBR, one full-size partition with a drive
/// letter, formatted NTFS. Disks already partitioned are left alone.
pub const DISK_INIT_SCRIPT: &str = r#"$ErrorActionPreference = 'Stop'
try {
    Get-Disk | Where-Object PartitionStyle -eq 'RAW' | ForEach-Object {
        Initialize-Disk -Number $_.Number -PartitionStyle MBR -PassThru |
            New-Partition -AssignDriveLetter -UseMaximumSize |
            Format-Volume -FileSystem NTFS -Confirm:$false |
            Select-Object DriveLetter, Size |
            Format-Table -AutoSize | Out-String
    }
} catch {
    Write-Error $_
    exit 1
}
exit 0
"#;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a PowerShell script and return its stdout. A non-zero exit code
    /// is an error.
    async fn run(
        &self,
        endpoint: &str,
        credential: &AdminCredential,
        trusted_certificates: Vec<Vec<u8>>,
        script: &str,
    ) -> Result<String>;
}

pub struct WinRmExecutor {
    operation_timeout_secs: u64,
    auth_method: AuthMethod,
}

impl WinRmExecutor {
    pub fn new(operation_timeout_secs: u64) -> Self {
        Self {
            operation_timeout_secs,
            auth_method: AuthMethod::default(),
        }
    }

    pub fn with_auth_method(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    pub fn winrm_config(&self, endpoint: &str, trusted_certificates: Vec<Vec<u8>>) -> WinRmConfig {
        let mut config = WinRmConfig::new(endpoint);
        config.command_timeout_sec = self.operation_timeout_secs;
        config.auth_method = self.auth_method;
        config.trusted_certificates = trusted_certificates;
        config
    }
}

impl Default for WinRmExecutor {
    fn default() -> Self {
        Self::new(600)
    }
}

#[async_trait]
impl RemoteExecutor for WinRmExecutor {
    async fn run(
        &self,
        endpoint: &str,
        credential: &AdminCredential,
        trusted_certificates: Vec<Vec<u8>>,
        script: &str,
    ) -> Result<String> {
        debug!(
            %endpoint,
            auth = ?self.auth_method,
            trusted = trusted_certificates.len(),
            "opening WinRM session"
        );
        let config = self.winrm_config(endpoint, trusted_certificates);
        let winrm_credential = WinRmCredential::new(&credential.username, credential.password());
        let output = run_script_checked(&config, &winrm_credential, script).await?;
        Ok(output.stdout)
    }
}
