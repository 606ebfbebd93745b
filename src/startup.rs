//! Starting VMs of a hosting service, one after another.

use tracing::info;

use crate::error::{ProvisionError, Result};
use crate::model::StartReport;
use crate::provider::CloudProvider;

/// Start every named VM, waiting for each start operation to finish before
/// the next one. The first failure stops the run.
pub async fn start_virtual_machines<P: CloudProvider + ?Sized>(
    provider: &P,
    service_name: &str,
    vm_names: &[String],
) -> Result<StartReport> {
    if service_name.trim().is_empty() {
        return Err(ProvisionError::validation("service name is required"));
    }
    if vm_names.is_empty() {
        return Err(ProvisionError::validation("at least one VM name is required"));
    }

    let mut started = Vec::with_capacity(vm_names.len());
    for vm in vm_names {
        info!(service = %service_name, %vm, "starting VM");
        provider.start_vm(service_name, vm).await?;
        started.push(vm.clone());
    }
    Ok(StartReport {
        service_name: service_name.to_string(),
        started,
    })
}
