//! Domain model shared by the provisioning flows.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Local administrator of a new VM, also used for WinRM.
#[derive(Debug, Clone)]
pub struct AdminCredential {
    pub username: String,
    pub password: SecretString,
}

impl AdminCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// A hosted (cloud) service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostingService {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub label: String,
    pub lun: u32,
    pub size_gb: u32,
}

impl DataDisk {
    /// New empty disk named after its slot: `disk_<lun>`.
    pub fn at_lun(lun: u32, size_gb: u32) -> Self {
        Self {
            label: format!("disk_{}", lun),
            lun,
            size_gb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    pub service_name: String,
    pub name: String,
    pub deployment_name: String,
    pub role_size: Option<String>,
    pub disks: Vec<DataDisk>,
    /// Thumbprint of the default WinRM listener certificate
    pub winrm_certificate_thumbprint: Option<String>,
}

impl VirtualMachine {
    pub fn luns(&self) -> Vec<u32> {
        self.disks.iter().map(|d| d.lun).collect()
    }
}

/// The VM's WinRM listener certificate as held by the hosted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementCertificate {
    pub thumbprint: String,
    pub thumbprint_algorithm: String,
    /// DER bytes
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSite {
    pub name: String,
    pub web_space: String,
    pub region: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSetting {
    pub name: String,
    pub value: String,
}

impl AppSetting {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ─── Reports ────────────────────────────────────────────────────────

/// Outcome of the VM provisioning flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReport {
    pub service: HostingService,
    pub service_created: bool,
    pub vm: VirtualMachine,
    pub vm_created: bool,
    pub new_disks: Vec<DataDisk>,
    pub certificate_installed: bool,
    pub remote_output: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteReport {
    pub site: WebSite,
    pub created: bool,
    pub app_settings: Vec<AppSetting>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReport {
    pub service_name: String,
    pub started: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_label_follows_lun() {
        let d = DataDisk::at_lun(7, 16);
        assert_eq!(d.label, "disk_7");
        assert_eq!(d.lun, 7);
        assert_eq!(d.size_gb, 16);
    }

    #[test]
    fn credential_debug_redacts_password() {
        let c = AdminCredential::new("azureuser", "P@ssw0rd!");
        assert_eq!(c.password(), "P@ssw0rd!");
        assert!(!format!("{:?}", c).contains("P@ssw0rd!"));
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = StartReport {
            service_name: "svc".into(),
            started: vec!["vm1".into()],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"serviceName":"svc","started":["vm1"]}"#);
    }
}
