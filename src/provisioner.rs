//! Idempotent VM provisioning: service, VM and disks, certificate trust,
//! then remote formatting of the raw disks.
//!
//! Steps run strictly in order and the first error aborts the rest. Nothing
//! created before a failure is rolled back.

use azprov_asm::{AsmError, AsmErrorKind};
use tracing::{info, warn};

use crate::config::{DEFAULT_IMAGE_NAME, DEFAULT_ROLE_SIZE};
use crate::disks::{next_lun, plan_new_disks, validate_disk_request, VmConfigBuilder};
use crate::error::{ProvisionError, Result};
use crate::model::{AdminCredential, DataDisk, HostingService, ProvisionReport, VirtualMachine};
use crate::provider::CloudProvider;
use crate::remote::{RemoteExecutor, DISK_INIT_SCRIPT};
use crate::trust_store::TrustStore;

/// Input of one `vm` run.
#[derive(Debug, Clone)]
pub struct VmRequest {
    pub service_name: String,
    pub vm_name: String,
    pub location: Option<String>,
    pub disk_size_gb: u32,
    pub disk_count: u32,
    pub credential: AdminCredential,
}

/// Result of [`Provisioner::ensure_virtual_machine`].
#[derive(Debug, Clone)]
pub struct EnsuredVm {
    pub vm: VirtualMachine,
    pub created: bool,
    pub new_disks: Vec<DataDisk>,
}

pub struct Provisioner<P, T, R> {
    provider: P,
    trust_store: T,
    remote: R,
    role_size: String,
    image_name: String,
}

fn require_name(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProvisionError::validation(format!("{} is required", what)));
    }
    Ok(())
}

fn provider_error(kind: AsmErrorKind, message: String) -> ProvisionError {
    ProvisionError::Provider(AsmError::new(kind, message))
}

impl<P, T, R> Provisioner<P, T, R>
where
    P: CloudProvider,
    T: TrustStore,
    R: RemoteExecutor,
{
    pub fn new(provider: P, trust_store: T, remote: R) -> Self {
        Self {
            provider,
            trust_store,
            remote,
            role_size: DEFAULT_ROLE_SIZE.into(),
            image_name: DEFAULT_IMAGE_NAME.into(),
        }
    }

    /// Size class and base image used for new VMs.
    pub fn with_vm_defaults(mut self, role_size: impl Into<String>, image_name: impl Into<String>) -> Self {
        self.role_size = role_size.into();
        self.image_name = image_name.into();
        self
    }

    pub fn trust_store(&self) -> &T {
        &self.trust_store
    }

    /// Look the service up, creating it at `location` when absent.
    /// Returns the service and whether it was created.
    pub async fn ensure_service(
        &self,
        service_name: &str,
        location: Option<&str>,
    ) -> Result<(HostingService, bool)> {
        require_name("service name", service_name)?;
        let location = location.map(str::trim).filter(|l| !l.is_empty());

        if let Some(existing) = self.provider.get_service(service_name).await? {
            if let Some(requested) = location {
                if !requested.eq_ignore_ascii_case(&existing.location) {
                    warn!(
                        service = %service_name,
                        existing = %existing.location,
                        requested = %requested,
                        "service already exists; location parameter ignored"
                    );
                }
            }
            info!(service = %service_name, location = %existing.location, "using existing service");
            return Ok((existing, false));
        }

        let location =
            location.ok_or_else(|| ProvisionError::missing_location("Hosted service", service_name))?;
        info!(service = %service_name, %location, "creating hosted service");
        self.provider.create_service(service_name, location).await?;
        Ok((
            HostingService {
                name: service_name.to_string(),
                location: location.to_string(),
            },
            true,
        ))
    }

    /// Create the VM with `disk_count` disks, or append `disk_count` disks
    /// after the highest LUN of an existing one.
    pub async fn ensure_virtual_machine(
        &self,
        service_name: &str,
        vm_name: &str,
        disk_size_gb: u32,
        disk_count: u32,
        credential: &AdminCredential,
    ) -> Result<EnsuredVm> {
        require_name("service name", service_name)?;
        require_name("VM name", vm_name)?;
        validate_disk_request(disk_size_gb, disk_count)?;

        let (created, new_disks) = match self.provider.get_vm(service_name, vm_name).await? {
            Some(vm) => {
                let start = next_lun(&vm.luns());
                let disks = plan_new_disks(start, disk_count, disk_size_gb)?;
                info!(
                    vm = %vm_name,
                    first_lun = start,
                    count = disk_count,
                    "attaching data disks to existing VM"
                );
                self.provider.attach_disks(&vm, &disks).await?;
                (false, disks)
            }
            None => {
                let disks = plan_new_disks(0, disk_count, disk_size_gb)?;
                let request = VmConfigBuilder::new(service_name, vm_name)
                    .role_size(self.role_size.clone())
                    .image(self.image_name.clone())
                    .credential(credential.clone())
                    .add_disks(disks.clone())
                    .build()?;
                info!(vm = %vm_name, disks = disk_count, size = %request.role_size, "creating VM");
                self.provider.create_vm(&request).await?;
                info!(vm = %vm_name, "waiting for VM to boot");
                self.provider.wait_for_vm_ready(service_name, vm_name).await?;
                (true, disks)
            }
        };

        let vm = self
            .provider
            .get_vm(service_name, vm_name)
            .await?
            .ok_or_else(|| {
                provider_error(
                    AsmErrorKind::NotFound,
                    format!("VM {} disappeared from {}", vm_name, service_name),
                )
            })?;
        Ok(EnsuredVm {
            vm,
            created,
            new_disks,
        })
    }

    /// Trust the VM's WinRM certificate locally. Returns `true` when it was
    /// installed by this call, `false` when already trusted.
    pub async fn trust_management_certificate(&self, service_name: &str, vm_name: &str) -> Result<bool> {
        let vm = self
            .provider
            .get_vm(service_name, vm_name)
            .await?
            .ok_or_else(|| {
                provider_error(
                    AsmErrorKind::NotFound,
                    format!("VM {} not found in {}", vm_name, service_name),
                )
            })?;
        let thumbprint = vm.winrm_certificate_thumbprint.ok_or_else(|| {
            provider_error(
                AsmErrorKind::NotFound,
                format!("VM {} has no default WinRM certificate", vm_name),
            )
        })?;

        if self.trust_store.contains(&thumbprint).await? {
            info!(%thumbprint, "WinRM certificate already trusted");
            return Ok(false);
        }

        let cert = self.provider.get_certificate(service_name, &thumbprint).await?;
        self.trust_store.install(&cert).await?;
        info!(%thumbprint, "WinRM certificate trusted");
        Ok(true)
    }

    /// Partition and format every raw disk of the VM over WinRM.
    pub async fn initialize_raw_disks(
        &self,
        service_name: &str,
        vm_name: &str,
        credential: &AdminCredential,
    ) -> Result<String> {
        let endpoint = self.provider.winrm_endpoint(service_name, vm_name).await?;
        let trusted = self.trust_store.trusted_certificates().await?;
        info!(%endpoint, "initializing raw disks");
        self.remote
            .run(&endpoint, credential, trusted, DISK_INIT_SCRIPT)
            .await
    }

    /// The whole flow, in order.
    pub async fn run(&self, request: &VmRequest) -> Result<ProvisionReport> {
        require_name("service name", &request.service_name)?;
        require_name("VM name", &request.vm_name)?;
        validate_disk_request(request.disk_size_gb, request.disk_count)?;

        let (service, service_created) = self
            .ensure_service(&request.service_name, request.location.as_deref())
            .await?;
        let ensured = self
            .ensure_virtual_machine(
                &service.name,
                &request.vm_name,
                request.disk_size_gb,
                request.disk_count,
                &request.credential,
            )
            .await?;
        let certificate_installed = self
            .trust_management_certificate(&service.name, &request.vm_name)
            .await?;
        let remote_output = self
            .initialize_raw_disks(&service.name, &request.vm_name, &request.credential)
            .await?;

        info!(service = %service.name, vm = %ensured.vm.name, "provisioning complete");
        Ok(ProvisionReport {
            service,
            service_created,
            vm: ensured.vm,
            vm_created: ensured.created,
            new_disks: ensured.new_disks,
            certificate_installed,
            remote_output,
        })
    }
}
