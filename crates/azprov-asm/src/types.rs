//! Core types for Azure Service Management (classic) API integration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Error types ─────────────────────────────────────────────────────

/// Categorised error kinds for Service Management operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AsmErrorKind {
    Auth,
    NotFound,
    Conflict,
    Forbidden,
    RateLimit,
    BadRequest,
    ServerError,
    Timeout,
    Network,
    Parse,
    Validation,
    NotAuthenticated,
    SubscriptionNotSet,
    OperationFailed,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "Authentication error"),
            Self::NotFound => write!(f, "Resource not found"),
            Self::Conflict => write!(f, "Resource conflict"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::RateLimit => write!(f, "Rate limit exceeded"),
            Self::BadRequest => write!(f, "Bad request"),
            Self::ServerError => write!(f, "Server error"),
            Self::Timeout => write!(f, "Timed out"),
            Self::Network => write!(f, "Network error"),
            Self::Parse => write!(f, "Parse error"),
            Self::Validation => write!(f, "Validation error"),
            Self::NotAuthenticated => write!(f, "Not authenticated"),
            Self::SubscriptionNotSet => write!(f, "Subscription ID not set"),
            Self::OperationFailed => write!(f, "Operation failed"),
        }
    }
}

/// Main error type for Service Management operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(kind: AsmErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: Some(status),
        }
    }

    /// Map an HTTP status plus the `<Error>` body the API returns.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            400 => AsmErrorKind::BadRequest,
            401 => AsmErrorKind::Auth,
            403 => AsmErrorKind::Forbidden,
            404 => AsmErrorKind::NotFound,
            409 => AsmErrorKind::Conflict,
            429 => AsmErrorKind::RateLimit,
            500..=599 => AsmErrorKind::ServerError,
            _ => AsmErrorKind::Network,
        };
        let message = match quick_xml::de::from_str::<ErrorBody>(body) {
            Ok(e) if !e.code.is_empty() => format!("{}: {}", e.code, e.message),
            _ => body.to_string(),
        };
        Self::with_status(kind, message, status)
    }

    pub fn not_authenticated() -> Self {
        Self::new(
            AsmErrorKind::NotAuthenticated,
            "Not authenticated: set credentials and authenticate first",
        )
    }

    pub fn subscription_not_set() -> Self {
        Self::new(AsmErrorKind::SubscriptionNotSet, "Subscription ID not configured")
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == AsmErrorKind::NotFound
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for AsmError {}

pub type AsmResult<T> = Result<T, AsmError>;

/// `<Error>` body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ─── OAuth / Auth ────────────────────────────────────────────────────

/// Service-principal credentials plus the target subscription.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AsmCredentials {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub subscription_id: String,
}

/// Cached bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AsmToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AsmToken {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() >= exp,
            None => false,
        }
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// ─── Client configuration ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsmConfig {
    pub management_base: String,
    /// Value of the `x-ms-version` header.
    pub api_version: String,
    /// Retries for 429/5xx responses. Zero disables retrying.
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub operation_timeout_secs: u64,
    pub boot_timeout_secs: u64,
}

impl AsmConfig {
    pub fn new() -> Self {
        Self {
            management_base: MANAGEMENT_BASE.into(),
            api_version: API_VERSION.into(),
            max_retries: 0,
            request_timeout_secs: 60,
            poll_interval_secs: 10,
            operation_timeout_secs: 900,
            boot_timeout_secs: 1800,
        }
    }
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Hosted services ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct HostedService {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub hosted_service_properties: HostedServiceProperties,
}

impl HostedService {
    pub fn location(&self) -> &str {
        self.hosted_service_properties
            .location
            .as_deref()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct HostedServiceProperties {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub affinity_group: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

// ─── Deployments / VM roles ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deployment_slot: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub role_instance_list: RoleInstanceList,
    #[serde(default)]
    pub role_list: RoleList,
}

impl Deployment {
    pub fn role(&self, role_name: &str) -> Option<&Role> {
        self.role_list
            .roles
            .iter()
            .find(|r| r.role_name.eq_ignore_ascii_case(role_name))
    }

    pub fn role_instance(&self, role_name: &str) -> Option<&RoleInstance> {
        self.role_instance_list
            .instances
            .iter()
            .find(|i| i.role_name.eq_ignore_ascii_case(role_name))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleInstanceList {
    #[serde(rename = "RoleInstance", default)]
    pub instances: Vec<RoleInstance>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RoleInstance {
    #[serde(default)]
    pub role_name: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default)]
    pub instance_status: String,
    #[serde(default)]
    pub power_state: Option<String>,
    #[serde(default)]
    pub instance_endpoints: InstanceEndpoints,
}

impl RoleInstance {
    pub fn is_ready(&self) -> bool {
        self.instance_status == READY_ROLE
    }

    /// Statuses the provider never recovers from without intervention.
    pub fn is_failed(&self) -> bool {
        matches!(
            self.instance_status.as_str(),
            "FailedStartingRole"
                | "FailedStartingVM"
                | "ProvisioningFailed"
                | "CyclingRole"
                | "UnresponsiveRole"
        )
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InstanceEndpoints {
    #[serde(rename = "InstanceEndpoint", default)]
    pub endpoints: Vec<InstanceEndpoint>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceEndpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vip: Option<String>,
    #[serde(default)]
    pub public_port: u16,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleList {
    #[serde(rename = "Role", default)]
    pub roles: Vec<Role>,
}

/// A `PersistentVMRole` as returned by Get Deployment / Get Role.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    #[serde(default)]
    pub role_name: String,
    #[serde(default)]
    pub role_type: Option<String>,
    #[serde(default)]
    pub configuration_sets: ConfigurationSets,
    #[serde(default)]
    pub data_virtual_hard_disks: DataVirtualHardDisks,
    #[serde(rename = "OSVirtualHardDisk", default)]
    pub os_virtual_hard_disk: OsVirtualHardDisk,
    #[serde(default)]
    pub role_size: Option<String>,
    #[serde(rename = "DefaultWinRmCertificateThumbprint", default)]
    pub default_winrm_certificate_thumbprint: Option<String>,
}

impl Role {
    pub fn data_disks(&self) -> &[DataVirtualHardDisk] {
        &self.data_virtual_hard_disks.disks
    }

    pub fn input_endpoints(&self) -> Vec<&InputEndpoint> {
        self.configuration_sets
            .sets
            .iter()
            .flat_map(|s| s.input_endpoints.endpoints.iter())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigurationSets {
    #[serde(rename = "ConfigurationSet", default)]
    pub sets: Vec<ConfigurationSet>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationSet {
    #[serde(default)]
    pub configuration_set_type: String,
    #[serde(default)]
    pub input_endpoints: InputEndpoints,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InputEndpoints {
    #[serde(rename = "InputEndpoint", default)]
    pub endpoints: Vec<InputEndpoint>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InputEndpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataVirtualHardDisks {
    #[serde(rename = "DataVirtualHardDisk", default)]
    pub disks: Vec<DataVirtualHardDisk>,
}

/// An attached data disk. The API omits `<Lun>` for LUN 0.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct DataVirtualHardDisk {
    #[serde(default)]
    pub host_caching: Option<String>,
    #[serde(default)]
    pub disk_label: Option<String>,
    #[serde(default)]
    pub disk_name: Option<String>,
    #[serde(default)]
    pub lun: u32,
    #[serde(rename = "LogicalDiskSizeInGB", default)]
    pub logical_disk_size_in_gb: Option<u32>,
    #[serde(default)]
    pub media_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct OsVirtualHardDisk {
    #[serde(default)]
    pub host_caching: Option<String>,
    #[serde(default)]
    pub disk_name: Option<String>,
    #[serde(default)]
    pub media_link: Option<String>,
    #[serde(default)]
    pub source_image_name: Option<String>,
    #[serde(rename = "OS", default)]
    pub os: Option<String>,
}

// ─── Requests ───────────────────────────────────────────────────────

/// An empty data disk to create and attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataDisk {
    pub label: String,
    pub lun: u32,
    pub size_gb: u32,
    pub media_link: String,
}

/// Everything needed to submit a new Windows `PersistentVMRole`.
#[derive(Debug, Clone)]
pub struct VmRoleRequest {
    pub role_name: String,
    pub computer_name: String,
    pub admin_username: String,
    pub admin_password: String,
    pub image_name: String,
    pub role_size: String,
    pub os_media_link: String,
    pub data_disks: Vec<NewDataDisk>,
}

// ─── Certificates ───────────────────────────────────────────────────

/// A service certificate (Get Service Certificate). `data` is base64 DER.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceCertificate {
    #[serde(default)]
    pub certificate_url: Option<String>,
    #[serde(default)]
    pub thumbprint: String,
    #[serde(default)]
    pub thumbprint_algorithm: String,
    #[serde(default)]
    pub data: String,
}

// ─── Asynchronous operations ────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct OperationStatus {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub http_status_code: Option<u16>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

impl OperationStatus {
    pub fn is_in_progress(&self) -> bool {
        self.status == "InProgress"
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == "Succeeded"
    }
}

/// Result of a mutating request: either done, or accepted with a request id
/// to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Completed,
    Accepted(String),
}

// ─── Web sites ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebSpaces {
    #[serde(rename = "WebSpace", default)]
    pub spaces: Vec<WebSpace>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WebSpace {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub geo_region: String,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Sites {
    #[serde(rename = "Site", default)]
    pub sites: Vec<Site>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Site {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub web_space: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SiteConfig {
    #[serde(default)]
    pub app_settings: AppSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSettings {
    #[serde(rename = "NameValuePair", default)]
    pub pairs: Vec<NameValuePair>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct NameValuePair {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

// ─── Constants ──────────────────────────────────────────────────────

/// Service Management base URL.
pub const MANAGEMENT_BASE: &str = "https://management.core.windows.net";

/// OAuth scope for Service Management tokens.
pub const MANAGEMENT_SCOPE: &str = "https://management.core.windows.net/.default";

pub const API_VERSION: &str = "2015-04-01";

pub const XMLNS: &str = "http://schemas.microsoft.com/windowsazure";
pub const XMLNS_INSTANCE: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const PRODUCTION_SLOT: &str = "Production";

/// Name of the HTTPS WinRM input endpoint created with every Windows VM.
pub const WINRM_HTTPS_ENDPOINT: &str = "WinRmHTTPs";
pub const WINRM_HTTPS_PORT: u16 = 5986;

pub const READY_ROLE: &str = "ReadyRole";

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = AsmError::new(AsmErrorKind::Auth, "bad credentials");
        assert_eq!(e.to_string(), "[Authentication error] bad credentials");
    }

    #[test]
    fn error_from_status_codes() {
        assert_eq!(AsmError::from_status(400, "x").kind, AsmErrorKind::BadRequest);
        assert_eq!(AsmError::from_status(401, "x").kind, AsmErrorKind::Auth);
        assert_eq!(AsmError::from_status(403, "x").kind, AsmErrorKind::Forbidden);
        assert_eq!(AsmError::from_status(404, "x").kind, AsmErrorKind::NotFound);
        assert_eq!(AsmError::from_status(409, "x").kind, AsmErrorKind::Conflict);
        assert_eq!(AsmError::from_status(429, "x").kind, AsmErrorKind::RateLimit);
        assert_eq!(AsmError::from_status(503, "x").kind, AsmErrorKind::ServerError);
    }

    #[test]
    fn error_from_status_reads_error_body() {
        let body = r#"<Error xmlns="http://schemas.microsoft.com/windowsazure"><Code>ResourceNotFound</Code><Message>The hosted service does not exist.</Message></Error>"#;
        let e = AsmError::from_status(404, body);
        assert!(e.is_not_found());
        assert_eq!(e.status_code, Some(404));
        assert_eq!(e.message, "ResourceNotFound: The hosted service does not exist.");
    }

    #[test]
    fn error_from_status_keeps_unparseable_body() {
        let e = AsmError::from_status(502, "gateway down");
        assert_eq!(e.message, "gateway down");
    }

    #[test]
    fn token_expiry() {
        assert!(!AsmToken::default().is_expired());
        let t = AsmToken {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
        };
        assert!(t.is_expired());
    }

    #[test]
    fn config_defaults() {
        let c = AsmConfig::new();
        assert_eq!(c.management_base, MANAGEMENT_BASE);
        assert_eq!(c.api_version, "2015-04-01");
        assert_eq!(c.max_retries, 0);
    }

    #[test]
    fn hosted_service_deserialization() {
        let xml = r#"<HostedService xmlns="http://schemas.microsoft.com/windowsazure">
  <Url>https://management.core.windows.net/sub/services/hostedservices/contoso-svc</Url>
  <ServiceName>contoso-svc</ServiceName>
  <HostedServiceProperties>
    <Description/>
    <Location>East US</Location>
    <Label>Y29udG9zby1zdmM=</Label>
    <Status>Created</Status>
  </HostedServiceProperties>
</HostedService>"#;
        let svc: HostedService = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(svc.service_name, "contoso-svc");
        assert_eq!(svc.location(), "East US");
        assert_eq!(svc.hosted_service_properties.status.as_deref(), Some("Created"));
    }

    #[test]
    fn deployment_deserialization() {
        let xml = r#"<Deployment xmlns="http://schemas.microsoft.com/windowsazure" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
  <Name>contoso-svc</Name>
  <DeploymentSlot>Production</DeploymentSlot>
  <Status>Running</Status>
  <Url>http://contoso-svc.cloudapp.net/</Url>
  <RoleInstanceList>
    <RoleInstance>
      <RoleName>vm1</RoleName>
      <InstanceName>vm1</InstanceName>
      <InstanceStatus>ReadyRole</InstanceStatus>
      <PowerState>Started</PowerState>
      <InstanceEndpoints>
        <InstanceEndpoint>
          <Name>WinRmHTTPs</Name>
          <Vip>137.116.1.2</Vip>
          <PublicPort>61234</PublicPort>
          <LocalPort>5986</LocalPort>
          <Protocol>tcp</Protocol>
        </InstanceEndpoint>
      </InstanceEndpoints>
    </RoleInstance>
  </RoleInstanceList>
  <RoleList>
    <Role i:type="PersistentVMRole">
      <RoleName>vm1</RoleName>
      <RoleType>PersistentVMRole</RoleType>
      <ConfigurationSets>
        <ConfigurationSet i:type="NetworkConfigurationSet">
          <ConfigurationSetType>NetworkConfiguration</ConfigurationSetType>
          <InputEndpoints>
            <InputEndpoint>
              <LocalPort>5986</LocalPort>
              <Name>WinRmHTTPs</Name>
              <Port>61234</Port>
              <Protocol>tcp</Protocol>
            </InputEndpoint>
          </InputEndpoints>
        </ConfigurationSet>
      </ConfigurationSets>
      <DataVirtualHardDisks>
        <DataVirtualHardDisk>
          <HostCaching>None</HostCaching>
          <DiskLabel>disk_0</DiskLabel>
          <DiskName>contoso-svc-vm1-0-201</DiskName>
          <LogicalDiskSizeInGB>16</LogicalDiskSizeInGB>
        </DataVirtualHardDisk>
        <DataVirtualHardDisk>
          <HostCaching>None</HostCaching>
          <DiskLabel>disk_2</DiskLabel>
          <DiskName>contoso-svc-vm1-2-201</DiskName>
          <Lun>2</Lun>
          <LogicalDiskSizeInGB>16</LogicalDiskSizeInGB>
        </DataVirtualHardDisk>
      </DataVirtualHardDisks>
      <OSVirtualHardDisk>
        <HostCaching>ReadWrite</HostCaching>
        <DiskName>contoso-svc-vm1-os-201</DiskName>
        <OS>Windows</OS>
      </OSVirtualHardDisk>
      <RoleSize>Small</RoleSize>
      <DefaultWinRmCertificateThumbprint>A1B2C3</DefaultWinRmCertificateThumbprint>
    </Role>
  </RoleList>
</Deployment>"#;
        let d: Deployment = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(d.name, "contoso-svc");
        let role = d.role("VM1").unwrap();
        assert_eq!(role.data_disks().len(), 2);
        assert_eq!(role.data_disks()[0].lun, 0);
        assert_eq!(role.data_disks()[1].lun, 2);
        assert_eq!(role.data_disks()[1].logical_disk_size_in_gb, Some(16));
        assert_eq!(role.default_winrm_certificate_thumbprint.as_deref(), Some("A1B2C3"));
        assert_eq!(role.os_virtual_hard_disk.disk_name.as_deref(), Some("contoso-svc-vm1-os-201"));
        assert_eq!(role.input_endpoints().len(), 1);

        let inst = d.role_instance("vm1").unwrap();
        assert!(inst.is_ready());
        assert!(!inst.is_failed());
        assert_eq!(inst.instance_endpoints.endpoints[0].public_port, 61234);
    }

    #[test]
    fn operation_status_deserialization() {
        let xml = r#"<Operation xmlns="http://schemas.microsoft.com/windowsazure">
  <ID>req-1</ID>
  <Status>Failed</Status>
  <HttpStatusCode>400</HttpStatusCode>
  <Error><Code>BadRequest</Code><Message>The image does not exist.</Message></Error>
</Operation>"#;
        let op: OperationStatus = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(op.id, "req-1");
        assert!(!op.is_in_progress());
        assert!(!op.is_succeeded());
        assert_eq!(op.error.unwrap().code, "BadRequest");
    }

    #[test]
    fn service_certificate_deserialization() {
        let xml = r#"<Certificate xmlns="http://schemas.microsoft.com/windowsazure">
  <CertificateUrl>https://management.core.windows.net/sub/services/hostedservices/svc/certificates/sha1-AB</CertificateUrl>
  <Thumbprint>AB</Thumbprint>
  <ThumbprintAlgorithm>sha1</ThumbprintAlgorithm>
  <Data>MIIB</Data>
</Certificate>"#;
        let c: ServiceCertificate = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(c.thumbprint, "AB");
        assert_eq!(c.thumbprint_algorithm, "sha1");
        assert_eq!(c.data, "MIIB");
    }

    #[test]
    fn site_config_deserialization() {
        let xml = r#"<SiteConfig xmlns="http://schemas.microsoft.com/windowsazure">
  <AppSettings>
    <NameValuePair><Name>A</Name><Value>1</Value></NameValuePair>
    <NameValuePair><Name>B</Name><Value>2</Value></NameValuePair>
  </AppSettings>
  <NetFrameworkVersion>v4.0</NetFrameworkVersion>
</SiteConfig>"#;
        let cfg: SiteConfig = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(cfg.app_settings.pairs.len(), 2);
        assert_eq!(cfg.app_settings.pairs[1].name, "B");
    }
}
