//! Data-disk slot planning and the VM configuration builder.

use crate::error::{ProvisionError, Result};
use crate::model::{AdminCredential, DataDisk};

/// First free LUN: one past the highest attached LUN, 0 for a bare VM.
pub fn next_lun(existing: &[u32]) -> u32 {
    existing.iter().max().map_or(0, |max| max + 1)
}

/// Highest LUN a role accepts for a data disk.
pub const MAX_LUN: u32 = 63;

/// `count` contiguous disks of `size_gb` starting at `start_lun`. The last
/// one must still fit at or below [`MAX_LUN`].
pub fn plan_new_disks(start_lun: u32, count: u32, size_gb: u32) -> Result<Vec<DataDisk>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let last = start_lun
        .checked_add(count - 1)
        .filter(|last| *last <= MAX_LUN)
        .ok_or_else(|| {
            ProvisionError::validation(format!(
                "{} disks starting at LUN {} exceed the highest LUN {}",
                count, start_lun, MAX_LUN
            ))
        })?;
    Ok((start_lun..=last)
        .map(|lun| DataDisk::at_lun(lun, size_gb))
        .collect())
}

pub fn validate_disk_request(size_gb: u32, count: u32) -> Result<()> {
    if size_gb == 0 {
        return Err(ProvisionError::validation("disk size must be a positive number of GB"));
    }
    if count == 0 {
        return Err(ProvisionError::validation("number of disks must be positive"));
    }
    if count > MAX_LUN + 1 {
        return Err(ProvisionError::validation(format!(
            "at most {} data disks fit on one VM",
            MAX_LUN + 1
        )));
    }
    Ok(())
}

/// Immutable description of a VM to create.
#[derive(Debug, Clone)]
pub struct VmCreateRequest {
    pub service_name: String,
    pub vm_name: String,
    pub role_size: String,
    pub image_name: String,
    pub credential: AdminCredential,
    pub disks: Vec<DataDisk>,
}

/// Accumulates the pieces of a new VM; `build` checks and freezes them.
#[derive(Debug, Default)]
pub struct VmConfigBuilder {
    service_name: String,
    vm_name: String,
    role_size: Option<String>,
    image_name: Option<String>,
    credential: Option<AdminCredential>,
    disks: Vec<DataDisk>,
}

impl VmConfigBuilder {
    pub fn new(service_name: impl Into<String>, vm_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            vm_name: vm_name.into(),
            ..Default::default()
        }
    }

    pub fn role_size(mut self, size: impl Into<String>) -> Self {
        self.role_size = Some(size.into());
        self
    }

    pub fn image(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = Some(image_name.into());
        self
    }

    pub fn credential(mut self, credential: AdminCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn add_disks(mut self, disks: impl IntoIterator<Item = DataDisk>) -> Self {
        self.disks.extend(disks);
        self
    }

    pub fn build(self) -> Result<VmCreateRequest> {
        if self.service_name.is_empty() || self.vm_name.is_empty() {
            return Err(ProvisionError::validation("service and VM names are required"));
        }
        let credential = self
            .credential
            .filter(|c| !c.username.is_empty())
            .ok_or_else(|| ProvisionError::validation("an admin credential is required"))?;
        let mut seen = Vec::with_capacity(self.disks.len());
        for disk in &self.disks {
            if seen.contains(&disk.lun) {
                return Err(ProvisionError::validation(format!(
                    "LUN {} assigned twice",
                    disk.lun
                )));
            }
            seen.push(disk.lun);
        }
        Ok(VmCreateRequest {
            service_name: self.service_name,
            vm_name: self.vm_name,
            role_size: self
                .role_size
                .unwrap_or_else(|| crate::config::DEFAULT_ROLE_SIZE.into()),
            image_name: self
                .image_name
                .unwrap_or_else(|| crate::config::DEFAULT_IMAGE_NAME.into()),
            credential,
            disks: self.disks,
        })
    }
}
