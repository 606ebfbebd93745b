//! Cloud provider seam and its Service Management implementation.

use async_trait::async_trait;
use azprov_asm::types::{
    DataVirtualHardDisk, Deployment, NameValuePair, NewDataDisk, Role, VmRoleRequest,
};
use azprov_asm::{certificates, virtual_machines, websites, AsmClient, AsmService, AsmServiceState};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ProvisionConfig;

use crate::disks::VmCreateRequest;
use crate::error::{ProvisionError, Result};
use crate::model::{
    AppSetting, DataDisk, HostingService, ManagementCertificate, VirtualMachine, WebSite,
};

/// Hosted services, VM roles and their certificates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn get_service(&self, name: &str) -> Result<Option<HostingService>>;

    async fn create_service(&self, name: &str, location: &str) -> Result<()>;

    async fn get_vm(&self, service_name: &str, vm_name: &str) -> Result<Option<VirtualMachine>>;

    /// Submit a new VM; returns once the provider accepted it.
    async fn create_vm(&self, request: &VmCreateRequest) -> Result<()>;

    /// Block until the VM reports booted.
    async fn wait_for_vm_ready(&self, service_name: &str, vm_name: &str) -> Result<()>;

    /// Attach new empty disks with one role update.
    async fn attach_disks(&self, vm: &VirtualMachine, disks: &[DataDisk]) -> Result<()>;

    async fn get_certificate(
        &self,
        service_name: &str,
        thumbprint: &str,
    ) -> Result<ManagementCertificate>;

    /// `https://host:port/wsman` of the VM's WinRM listener.
    async fn winrm_endpoint(&self, service_name: &str, vm_name: &str) -> Result<String>;

    async fn start_vm(&self, service_name: &str, vm_name: &str) -> Result<()>;
}

/// Classic web sites and their app settings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebsiteProvider: Send + Sync {
    async fn find_site(&self, name: &str) -> Result<Option<WebSite>>;

    async fn create_site(&self, name: &str, region: &str) -> Result<WebSite>;

    async fn get_app_settings(&self, site: &WebSite) -> Result<Vec<AppSetting>>;

    /// Replace the whole collection.
    async fn set_app_settings(&self, site: &WebSite, settings: &[AppSetting]) -> Result<()>;
}

// ─── Service Management implementation ──────────────────────────────

pub struct AsmProvider {
    service: AsmServiceState,
    storage_account: Option<String>,
}

impl AsmProvider {
    pub fn new(service: AsmServiceState, storage_account: Option<String>) -> Self {
        Self {
            service,
            storage_account,
        }
    }

    /// Provider for the configured subscription. The token is fetched on
    /// the first call.
    pub fn from_config(config: &ProvisionConfig) -> Result<Self> {
        config.validate_credentials()?;
        let mut service = AsmService::with_client(AsmClient::with_config(config.asm_config()));
        service.set_credentials(config.asm_credentials());
        Ok(Self::new(
            Arc::new(Mutex::new(service)),
            config.storage_account.clone(),
        ))
    }

    fn storage_account(&self) -> Result<&str> {
        self.storage_account
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProvisionError::config("a storage account is required to create disks"))
    }

    async fn deployment(svc: &mut AsmService, service_name: &str) -> Result<Deployment> {
        svc.get_deployment(service_name).await?.ok_or_else(|| {
            ProvisionError::Provider(azprov_asm::AsmError::new(
                azprov_asm::AsmErrorKind::NotFound,
                format!("Hosted service {} has no production deployment", service_name),
            ))
        })
    }
}

fn role_not_found(service_name: &str, vm_name: &str) -> ProvisionError {
    ProvisionError::Provider(azprov_asm::AsmError::new(
        azprov_asm::AsmErrorKind::NotFound,
        format!("VM {} not found in {}", vm_name, service_name),
    ))
}

/// Blob URL for a new VHD.
pub fn media_link(storage_account: &str, service: &str, vm: &str, label: &str, stamp: &str) -> String {
    format!(
        "https://{}.blob.core.windows.net/vhds/{}-{}-{}-{}.vhd",
        storage_account, service, vm, label, stamp
    )
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

fn new_data_disks(
    storage_account: &str,
    service: &str,
    vm: &str,
    disks: &[DataDisk],
    stamp: &str,
) -> Vec<NewDataDisk> {
    disks
        .iter()
        .map(|d| NewDataDisk {
            label: d.label.clone(),
            lun: d.lun,
            size_gb: d.size_gb,
            media_link: media_link(storage_account, service, vm, &d.label, stamp),
        })
        .collect()
}

/// Map a VM create request onto the role submitted to the API.
pub fn role_request(req: &VmCreateRequest, storage_account: &str, stamp: &str) -> VmRoleRequest {
    VmRoleRequest {
        role_name: req.vm_name.clone(),
        computer_name: req.vm_name.clone(),
        admin_username: req.credential.username.clone(),
        admin_password: req.credential.password().to_string(),
        image_name: req.image_name.clone(),
        role_size: req.role_size.clone(),
        os_media_link: media_link(storage_account, &req.service_name, &req.vm_name, "os", stamp),
        data_disks: new_data_disks(
            storage_account,
            &req.service_name,
            &req.vm_name,
            &req.disks,
            stamp,
        ),
    }
}

fn data_disk(d: &DataVirtualHardDisk) -> DataDisk {
    DataDisk {
        label: d
            .disk_label
            .clone()
            .unwrap_or_else(|| format!("disk_{}", d.lun)),
        lun: d.lun,
        size_gb: d.logical_disk_size_in_gb.unwrap_or_default(),
    }
}

pub fn vm_from_role(service_name: &str, deployment: &Deployment, role: &Role) -> VirtualMachine {
    let mut disks: Vec<DataDisk> = role.data_disks().iter().map(data_disk).collect();
    disks.sort_by_key(|d| d.lun);
    VirtualMachine {
        service_name: service_name.to_string(),
        name: role.role_name.clone(),
        deployment_name: deployment.name.clone(),
        role_size: role.role_size.clone(),
        disks,
        winrm_certificate_thumbprint: role
            .default_winrm_certificate_thumbprint
            .clone()
            .filter(|t| !t.is_empty()),
    }
}

#[async_trait]
impl CloudProvider for AsmProvider {
    async fn get_service(&self, name: &str) -> Result<Option<HostingService>> {
        let mut svc = self.service.lock().await;
        Ok(svc.get_hosted_service(name).await?.map(|hs| HostingService {
            location: hs.location().to_string(),
            name: if hs.service_name.is_empty() {
                name.to_string()
            } else {
                hs.service_name
            },
        }))
    }

    async fn create_service(&self, name: &str, location: &str) -> Result<()> {
        let mut svc = self.service.lock().await;
        svc.create_hosted_service(name, location).await?;
        Ok(())
    }

    async fn get_vm(&self, service_name: &str, vm_name: &str) -> Result<Option<VirtualMachine>> {
        let mut svc = self.service.lock().await;
        let Some(deployment) = svc.get_deployment(service_name).await? else {
            return Ok(None);
        };
        Ok(deployment
            .role(vm_name)
            .map(|role| vm_from_role(service_name, &deployment, role)))
    }

    async fn create_vm(&self, request: &VmCreateRequest) -> Result<()> {
        let role = role_request(request, self.storage_account()?, &timestamp());
        let mut svc = self.service.lock().await;
        match svc.get_deployment(&request.service_name).await? {
            None => {
                debug!(service = %request.service_name, "creating first deployment");
                svc.create_vm_deployment(&request.service_name, &role).await?
            }
            Some(d) => {
                debug!(service = %request.service_name, deployment = %d.name, "adding role");
                svc.add_role(&request.service_name, &d.name, &role).await?
            }
        }
        Ok(())
    }

    async fn wait_for_vm_ready(&self, service_name: &str, vm_name: &str) -> Result<()> {
        let mut svc = self.service.lock().await;
        svc.wait_for_role_ready(service_name, vm_name).await?;
        Ok(())
    }

    async fn attach_disks(&self, vm: &VirtualMachine, disks: &[DataDisk]) -> Result<()> {
        let storage = self.storage_account()?;
        let mut svc = self.service.lock().await;
        let deployment = Self::deployment(&mut svc, &vm.service_name).await?;
        let role = deployment
            .role(&vm.name)
            .ok_or_else(|| role_not_found(&vm.service_name, &vm.name))?;
        let new = new_data_disks(storage, &vm.service_name, &vm.name, disks, &timestamp());
        svc.update_role_data_disks(&vm.service_name, &deployment.name, role, &new)
            .await?;
        Ok(())
    }

    async fn get_certificate(
        &self,
        service_name: &str,
        thumbprint: &str,
    ) -> Result<ManagementCertificate> {
        let mut svc = self.service.lock().await;
        let cert = svc.get_service_certificate(service_name, thumbprint).await?;
        let data = certificates::certificate_der(&cert)
            .map_err(|e| ProvisionError::certificate(e.message))?;
        Ok(ManagementCertificate {
            thumbprint: if cert.thumbprint.is_empty() {
                thumbprint.to_string()
            } else {
                cert.thumbprint
            },
            thumbprint_algorithm: cert.thumbprint_algorithm,
            data,
        })
    }

    async fn winrm_endpoint(&self, service_name: &str, vm_name: &str) -> Result<String> {
        let mut svc = self.service.lock().await;
        let deployment = Self::deployment(&mut svc, service_name).await?;
        Ok(virtual_machines::winrm_endpoint(&deployment, vm_name)?.to_string())
    }

    async fn start_vm(&self, service_name: &str, vm_name: &str) -> Result<()> {
        let mut svc = self.service.lock().await;
        let deployment = Self::deployment(&mut svc, service_name).await?;
        if deployment.role(vm_name).is_none() {
            return Err(role_not_found(service_name, vm_name));
        }
        svc.start_role(service_name, &deployment.name, vm_name).await?;
        Ok(())
    }
}

#[async_trait]
impl WebsiteProvider for AsmProvider {
    async fn find_site(&self, name: &str) -> Result<Option<WebSite>> {
        let mut svc = self.service.lock().await;
        Ok(svc.find_site(name).await?.map(|(space, site)| WebSite {
            name: site.name,
            web_space: space.name,
            region: space.geo_region,
            state: site.state,
        }))
    }

    async fn create_site(&self, name: &str, region: &str) -> Result<WebSite> {
        let mut svc = self.service.lock().await;
        let site = svc.create_site(name, region).await?;
        Ok(WebSite {
            name: if site.name.is_empty() {
                name.to_string()
            } else {
                site.name
            },
            web_space: site
                .web_space
                .unwrap_or_else(|| websites::webspace_for_region(region)),
            region: region.to_string(),
            state: site.state,
        })
    }

    async fn get_app_settings(&self, site: &WebSite) -> Result<Vec<AppSetting>> {
        let mut svc = self.service.lock().await;
        let config = svc.get_site_config(&site.web_space, &site.name).await?;
        Ok(config
            .app_settings
            .pairs
            .into_iter()
            .map(|p| AppSetting::new(p.name, p.value))
            .collect())
    }

    async fn set_app_settings(&self, site: &WebSite, settings: &[AppSetting]) -> Result<()> {
        let pairs: Vec<NameValuePair> = settings
            .iter()
            .map(|s| NameValuePair {
                name: s.name.clone(),
                value: s.value.clone(),
            })
            .collect();
        let mut svc = self.service.lock().await;
        svc.update_app_settings(&site.web_space, &site.name, &pairs)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disks::VmConfigBuilder;
    use crate::model::AdminCredential;
    use azprov_asm::types::{DataVirtualHardDisks, RoleList};

    #[test]
    fn media_link_format() {
        assert_eq!(
            media_link("acct", "svc", "vm1", "disk_0", "20150601120000"),
            "https://acct.blob.core.windows.net/vhds/svc-vm1-disk_0-20150601120000.vhd"
        );
    }

    #[test]
    fn role_request_carries_disks_and_credential() {
        let req = VmConfigBuilder::new("contoso-svc", "vm1")
            .credential(AdminCredential::new("azureuser", "pw"))
            .add_disks(crate::disks::plan_new_disks(0, 2, 16).unwrap())
            .build()
            .unwrap();
        let role = role_request(&req, "acct", "ts");
        assert_eq!(role.role_name, "vm1");
        assert_eq!(role.admin_password, "pw");
        assert_eq!(role.role_size, "Small");
        assert!(role.os_media_link.ends_with("contoso-svc-vm1-os-ts.vhd"));
        assert_eq!(role.data_disks.len(), 2);
        assert_eq!(role.data_disks[1].lun, 1);
        assert_eq!(role.data_disks[1].label, "disk_1");
        assert_eq!(role.data_disks[1].size_gb, 16);
    }

    #[test]
    fn vm_from_role_sorts_disks_and_drops_empty_thumbprint() {
        let role = Role {
            role_name: "vm1".into(),
            data_virtual_hard_disks: DataVirtualHardDisks {
                disks: vec![
                    DataVirtualHardDisk {
                        lun: 5,
                        logical_disk_size_in_gb: Some(16),
                        ..Default::default()
                    },
                    DataVirtualHardDisk {
                        disk_label: Some("data".into()),
                        lun: 0,
                        ..Default::default()
                    },
                ],
            },
            default_winrm_certificate_thumbprint: Some(String::new()),
            ..Default::default()
        };
        let deployment = Deployment {
            name: "svc".into(),
            role_list: RoleList {
                roles: vec![role.clone()],
            },
            ..Default::default()
        };
        let vm = vm_from_role("svc", &deployment, &role);
        assert_eq!(vm.luns(), vec![0, 5]);
        assert_eq!(vm.disks[0].label, "data");
        assert_eq!(vm.disks[1].label, "disk_5");
        assert_eq!(vm.disks[1].size_gb, 16);
        assert_eq!(vm.deployment_name, "svc");
        assert!(vm.winrm_certificate_thumbprint.is_none());
    }

    #[test]
    fn from_config_requires_credentials() {
        assert!(matches!(
            AsmProvider::from_config(&ProvisionConfig::default()),
            Err(ProvisionError::Config(_))
        ));
    }

    #[tokio::test]
    async fn disk_creation_requires_storage_account() {
        let provider = AsmProvider::new(AsmService::new(Default::default()), None);
        let req = VmConfigBuilder::new("svc", "vm1")
            .credential(AdminCredential::new("u", "p"))
            .build()
            .unwrap();
        assert!(matches!(
            provider.create_vm(&req).await,
            Err(ProvisionError::Config(_))
        ));
    }
}
