//! Virtual machine roles – deployment lookup, create, add role, attach data
//! disks, boot wait, WinRM endpoint discovery and start.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;
use url::Url;

use crate::client::AsmClient;
use crate::operations;
use crate::types::{
    AsmError, AsmErrorKind, AsmResult, Deployment, NewDataDisk, Role, VmRoleRequest,
    PRODUCTION_SLOT, WINRM_HTTPS_ENDPOINT,
};
use crate::xml;

fn deployments_path(service_name: &str) -> String {
    format!("/services/hostedservices/{}/deployments", service_name)
}

/// Get the production deployment of a hosted service, `None` if there is none.
pub async fn get_deployment(
    client: &AsmClient,
    service_name: &str,
) -> AsmResult<Option<Deployment>> {
    let url = client.subscription_url(&format!(
        "/services/hostedservices/{}/deploymentslots/{}",
        service_name, PRODUCTION_SLOT
    ))?;
    debug!("get_deployment({}) → {}", service_name, url);
    client.get_xml_optional(&url).await
}

/// Create the first VM of a hosted service. The deployment is named after
/// the service.
pub async fn create_vm_deployment(
    client: &AsmClient,
    service_name: &str,
    req: &VmRoleRequest,
) -> AsmResult<()> {
    let url = client.subscription_url(&deployments_path(service_name))?;
    debug!("create_vm_deployment({}, {}) → {}", service_name, req.role_name, url);
    let body = xml::vm_deployment_body(service_name, req);
    let submitted = client.post_xml(&url, &body).await?;
    operations::complete(client, submitted).await
}

/// Add a VM role to an existing deployment.
pub async fn add_role(
    client: &AsmClient,
    service_name: &str,
    deployment_name: &str,
    req: &VmRoleRequest,
) -> AsmResult<()> {
    let url = client.subscription_url(&format!(
        "{}/{}/roles",
        deployments_path(service_name),
        deployment_name
    ))?;
    debug!("add_role({}, {}) → {}", service_name, req.role_name, url);
    let body = xml::add_role_body(req);
    let submitted = client.post_xml(&url, &body).await?;
    operations::complete(client, submitted).await
}

/// Attach `new_disks` to `role` with a single Update Role request.
pub async fn update_role_data_disks(
    client: &AsmClient,
    service_name: &str,
    deployment_name: &str,
    role: &Role,
    new_disks: &[NewDataDisk],
) -> AsmResult<()> {
    if new_disks.is_empty() {
        return Ok(());
    }
    let url = client.subscription_url(&format!(
        "{}/{}/roles/{}",
        deployments_path(service_name),
        deployment_name,
        role.role_name
    ))?;
    debug!(
        "update_role_data_disks({}, {}, +{}) → {}",
        service_name,
        role.role_name,
        new_disks.len(),
        url
    );
    let body = xml::update_role_body(role, new_disks);
    let submitted = client.put_xml(&url, &body).await?;
    operations::complete(client, submitted).await
}

/// Start a stopped VM role.
pub async fn start_role(
    client: &AsmClient,
    service_name: &str,
    deployment_name: &str,
    role_name: &str,
) -> AsmResult<()> {
    let url = client.subscription_url(&format!(
        "{}/{}/roleinstances/{}/Operations",
        deployments_path(service_name),
        deployment_name,
        role_name
    ))?;
    debug!("start_role({}, {}) → {}", service_name, role_name, url);
    let submitted = client.post_xml(&url, &xml::start_role_body()).await?;
    operations::complete(client, submitted).await
}

/// Poll the deployment until the role instance reports `ReadyRole`.
///
/// Terminal failure statuses abort immediately; otherwise the wait is bounded
/// by the configured boot timeout.
pub async fn wait_for_role_ready(
    client: &AsmClient,
    service_name: &str,
    role_name: &str,
) -> AsmResult<Deployment> {
    let cfg = client.config();
    let interval = Duration::from_secs(cfg.poll_interval_secs);
    let deadline = Instant::now() + Duration::from_secs(cfg.boot_timeout_secs);

    loop {
        if let Some(deployment) = get_deployment(client, service_name).await? {
            match deployment.role_instance(role_name) {
                Some(inst) if inst.is_ready() => {
                    info!("{}/{} is ready", service_name, role_name);
                    return Ok(deployment);
                }
                Some(inst) if inst.is_failed() => {
                    return Err(AsmError::new(
                        AsmErrorKind::OperationFailed,
                        format!(
                            "{}/{} entered {}",
                            service_name, role_name, inst.instance_status
                        ),
                    ));
                }
                Some(inst) => debug!("{}/{} is {}", service_name, role_name, inst.instance_status),
                None => debug!("{}/{} has no instance yet", service_name, role_name),
            }
        } else {
            warn!("{} has no production deployment yet", service_name);
        }

        if Instant::now() >= deadline {
            return Err(AsmError::new(
                AsmErrorKind::Timeout,
                format!(
                    "{}/{} not ready after {}s",
                    service_name, role_name, cfg.boot_timeout_secs
                ),
            ));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Public HTTPS WinRM endpoint of a role: the deployment host with the
/// public port of the `WinRmHTTPs` instance endpoint.
pub fn winrm_endpoint(deployment: &Deployment, role_name: &str) -> AsmResult<Url> {
    let inst = deployment.role_instance(role_name).ok_or_else(|| {
        AsmError::new(
            AsmErrorKind::NotFound,
            format!("No role instance {} in deployment {}", role_name, deployment.name),
        )
    })?;
    let ep = inst
        .instance_endpoints
        .endpoints
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(WINRM_HTTPS_ENDPOINT))
        .ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::NotFound,
                format!("{} has no {} endpoint", role_name, WINRM_HTTPS_ENDPOINT),
            )
        })?;

    let deployment_url = deployment.url.as_deref().unwrap_or_default();
    let host = Url::parse(deployment_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::Parse,
                format!("Deployment URL '{}' has no host", deployment_url),
            )
        })?;

    Url::parse(&format!("https://{}:{}/wsman", host, ep.public_port))
        .map_err(|e| AsmError::new(AsmErrorKind::Parse, format!("WinRM URL: {e}")))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstanceEndpoint, InstanceEndpoints, RoleInstance, RoleInstanceList};

    fn deployment(url: Option<&str>, endpoints: Vec<InstanceEndpoint>) -> Deployment {
        Deployment {
            name: "svc".into(),
            url: url.map(str::to_string),
            role_instance_list: RoleInstanceList {
                instances: vec![RoleInstance {
                    role_name: "vm1".into(),
                    instance_name: "vm1".into(),
                    instance_status: "ReadyRole".into(),
                    instance_endpoints: InstanceEndpoints { endpoints },
                    ..Default::default()
                }],
            },
            ..Default::default()
        }
    }

    fn winrm(port: u16) -> InstanceEndpoint {
        InstanceEndpoint {
            name: "WinRmHTTPs".into(),
            public_port: port,
            local_port: 5986,
            ..Default::default()
        }
    }

    #[test]
    fn endpoint_from_deployment_host() {
        let d = deployment(Some("http://svc.cloudapp.net/"), vec![winrm(61234)]);
        let url = winrm_endpoint(&d, "vm1").unwrap();
        assert_eq!(url.as_str(), "https://svc.cloudapp.net:61234/wsman");
    }

    #[test]
    fn endpoint_missing_role() {
        let d = deployment(Some("http://svc.cloudapp.net/"), vec![winrm(5986)]);
        assert_eq!(winrm_endpoint(&d, "vm2").unwrap_err().kind, AsmErrorKind::NotFound);
    }

    #[test]
    fn endpoint_missing_winrm() {
        let d = deployment(Some("http://svc.cloudapp.net/"), vec![]);
        assert_eq!(winrm_endpoint(&d, "vm1").unwrap_err().kind, AsmErrorKind::NotFound);
    }

    #[test]
    fn endpoint_without_deployment_url() {
        let d = deployment(None, vec![winrm(5986)]);
        assert_eq!(winrm_endpoint(&d, "vm1").unwrap_err().kind, AsmErrorKind::Parse);
    }

    #[test]
    fn deployments_path_construction() {
        assert_eq!(deployments_path("svc"), "/services/hostedservices/svc/deployments");
    }

    #[tokio::test]
    async fn update_with_no_disks_is_noop() {
        let client = AsmClient::new();
        assert!(update_role_data_disks(&client, "svc", "svc", &Role::default(), &[])
            .await
            .is_ok());
    }
}
