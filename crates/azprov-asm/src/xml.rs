//! Request body builders for the Service Management API.
//!
//! The API is a DataContract serializer on the server side, so element
//! order inside each body matters and follows the published schema.

use base64::Engine;

use crate::types::{
    InputEndpoint, NameValuePair, NewDataDisk, Role, VmRoleRequest, PRODUCTION_SLOT,
    WINRM_HTTPS_ENDPOINT, WINRM_HTTPS_PORT, XMLNS, XMLNS_INSTANCE,
};

const ARRAYS_NS: &str = "http://schemas.microsoft.com/2003/10/Serialization/Arrays";

/// XML-escape a string for inclusion in request bodies.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn elem(name: &str, value: &str) -> String {
    format!("<{name}>{}</{name}>", xml_escape(value))
}

fn opt_elem(name: &str, value: Option<&str>) -> String {
    value.map(|v| elem(name, v)).unwrap_or_default()
}

fn label(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

// ─── Hosted services ────────────────────────────────────────────────

pub fn create_hosted_service_body(service_name: &str, location: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<CreateHostedService xmlns="{ns}">
  {name}
  {label}
  {location}
</CreateHostedService>"#,
        ns = XMLNS,
        name = elem("ServiceName", service_name),
        label = elem("Label", &label(service_name)),
        location = elem("Location", location),
    )
}

// ─── VM roles ───────────────────────────────────────────────────────

fn new_data_disk_xml(disk: &NewDataDisk) -> String {
    format!(
        "<DataVirtualHardDisk>{}{}{}{}{}</DataVirtualHardDisk>",
        elem("HostCaching", "None"),
        elem("DiskLabel", &disk.label),
        elem("Lun", &disk.lun.to_string()),
        elem("LogicalDiskSizeInGB", &disk.size_gb.to_string()),
        elem("MediaLink", &disk.media_link),
    )
}

fn input_endpoint_xml(ep: &InputEndpoint) -> String {
    format!(
        "<InputEndpoint>{}{}{}{}</InputEndpoint>",
        elem("LocalPort", &ep.local_port.to_string()),
        elem("Name", &ep.name),
        elem("Port", &ep.port.to_string()),
        elem("Protocol", &ep.protocol),
    )
}

fn network_configuration_xml(endpoints: &[InputEndpoint]) -> String {
    let eps: String = endpoints.iter().map(input_endpoint_xml).collect();
    format!(
        r#"<ConfigurationSet i:type="NetworkConfigurationSet"><ConfigurationSetType>NetworkConfiguration</ConfigurationSetType><InputEndpoints>{eps}</InputEndpoints></ConfigurationSet>"#
    )
}

fn winrm_endpoint() -> InputEndpoint {
    InputEndpoint {
        name: WINRM_HTTPS_ENDPOINT.into(),
        port: WINRM_HTTPS_PORT,
        local_port: WINRM_HTTPS_PORT,
        protocol: "tcp".into(),
    }
}

/// Inner content of a new `PersistentVMRole` (without the enclosing tag).
fn new_role_content(req: &VmRoleRequest) -> String {
    let provisioning = format!(
        r#"<ConfigurationSet i:type="WindowsProvisioningConfigurationSet"><ConfigurationSetType>WindowsProvisioningConfiguration</ConfigurationSetType>{computer}{password}<EnableAutomaticUpdates>true</EnableAutomaticUpdates><WinRM><Listeners><Listener><Protocol>Https</Protocol></Listener></Listeners></WinRM>{user}</ConfigurationSet>"#,
        computer = elem("ComputerName", &req.computer_name),
        password = elem("AdminPassword", &req.admin_password),
        user = elem("AdminUsername", &req.admin_username),
    );
    let network = network_configuration_xml(&[winrm_endpoint()]);
    let disks: String = req.data_disks.iter().map(new_data_disk_xml).collect();

    format!(
        "{name}<RoleType>PersistentVMRole</RoleType><ConfigurationSets>{provisioning}{network}</ConfigurationSets><DataVirtualHardDisks>{disks}</DataVirtualHardDisks><OSVirtualHardDisk><HostCaching>ReadWrite</HostCaching>{media}{image}</OSVirtualHardDisk>{size}<ProvisionGuestAgent>true</ProvisionGuestAgent>",
        name = elem("RoleName", &req.role_name),
        media = elem("MediaLink", &req.os_media_link),
        image = elem("SourceImageName", &req.image_name),
        size = elem("RoleSize", &req.role_size),
    )
}

/// Create Virtual Machine Deployment: the first VM of a hosted service.
pub fn vm_deployment_body(deployment_name: &str, req: &VmRoleRequest) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Deployment xmlns="{ns}" xmlns:i="{ins}">
  {name}
  {slot}
  {label}
  <RoleList><Role i:type="PersistentVMRole">{role}</Role></RoleList>
</Deployment>"#,
        ns = XMLNS,
        ins = XMLNS_INSTANCE,
        name = elem("Name", deployment_name),
        slot = elem("DeploymentSlot", PRODUCTION_SLOT),
        label = elem("Label", &label(deployment_name)),
        role = new_role_content(req),
    )
}

/// Add Role: a further VM in an existing deployment.
pub fn add_role_body(req: &VmRoleRequest) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<PersistentVMRole xmlns="{ns}" xmlns:i="{ins}">{role}</PersistentVMRole>"#,
        ns = XMLNS,
        ins = XMLNS_INSTANCE,
        role = new_role_content(req),
    )
}

/// Update Role: re-submit the existing role with `new_disks` appended.
///
/// Existing disks are referenced by name so the provider keeps them
/// attached; input endpoints are carried over unchanged.
pub fn update_role_body(role: &Role, new_disks: &[NewDataDisk]) -> String {
    let endpoints: Vec<InputEndpoint> = role.input_endpoints().into_iter().cloned().collect();
    let existing: String = role
        .data_disks()
        .iter()
        .map(|d| {
            format!(
                "<DataVirtualHardDisk>{}{}{}{}{}{}</DataVirtualHardDisk>",
                opt_elem("HostCaching", d.host_caching.as_deref()),
                opt_elem("DiskLabel", d.disk_label.as_deref()),
                opt_elem("DiskName", d.disk_name.as_deref()),
                elem("Lun", &d.lun.to_string()),
                opt_elem(
                    "LogicalDiskSizeInGB",
                    d.logical_disk_size_in_gb.map(|s| s.to_string()).as_deref()
                ),
                opt_elem("MediaLink", d.media_link.as_deref()),
            )
        })
        .collect();
    let added: String = new_disks.iter().map(new_data_disk_xml).collect();
    let os = &role.os_virtual_hard_disk;

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<PersistentVMRole xmlns="{ns}" xmlns:i="{ins}">{name}<RoleType>PersistentVMRole</RoleType><ConfigurationSets>{network}</ConfigurationSets><DataVirtualHardDisks>{existing}{added}</DataVirtualHardDisks><OSVirtualHardDisk>{caching}{disk}{media}</OSVirtualHardDisk>{size}</PersistentVMRole>"#,
        ns = XMLNS,
        ins = XMLNS_INSTANCE,
        name = elem("RoleName", &role.role_name),
        network = network_configuration_xml(&endpoints),
        caching = opt_elem("HostCaching", os.host_caching.as_deref()),
        disk = opt_elem("DiskName", os.disk_name.as_deref()),
        media = opt_elem("MediaLink", os.media_link.as_deref()),
        size = opt_elem("RoleSize", role.role_size.as_deref()),
    )
}

pub fn start_role_body() -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<StartRoleOperation xmlns="{ns}" xmlns:i="{ins}"><OperationType>StartRoleOperation</OperationType></StartRoleOperation>"#,
        ns = XMLNS,
        ins = XMLNS_INSTANCE,
    )
}

// ─── Web sites ──────────────────────────────────────────────────────

pub fn create_site_body(site_name: &str, web_space: &str, geo_region: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Site xmlns="{ns}"><HostNames xmlns:a="{arrays}"><a:string>{host}</a:string></HostNames>{name}<WebSpaceToCreate>{region}{space}<Plan>VirtualDedicatedPlan</Plan></WebSpaceToCreate></Site>"#,
        ns = XMLNS,
        arrays = ARRAYS_NS,
        host = xml_escape(&format!("{site_name}.azurewebsites.net")),
        name = elem("Name", site_name),
        region = elem("GeoRegion", geo_region),
        space = elem("Name", web_space),
    )
}

pub fn site_config_body(settings: &[NameValuePair]) -> String {
    let pairs: String = settings
        .iter()
        .map(|p| {
            format!(
                "<NameValuePair>{}{}</NameValuePair>",
                elem("Name", &p.name),
                elem("Value", &p.value)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<SiteConfig xmlns="{ns}"><AppSettings>{pairs}</AppSettings></SiteConfig>"#,
        ns = XMLNS,
    )
}

// ─── Tests ──────────────────────────────────────────────────────────
