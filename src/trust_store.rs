//! Local store of trusted WinRM listener certificates.
//!
//! One PEM file per certificate, named `<THUMBPRINT>.pem`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::model::ManagementCertificate;

const PEM_TAG: &str = "CERTIFICATE";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrustStore: Send + Sync {
    async fn contains(&self, thumbprint: &str) -> Result<bool>;

    /// Verify and persist a certificate.
    async fn install(&self, cert: &ManagementCertificate) -> Result<()>;

    /// DER bytes of every trusted certificate.
    async fn trusted_certificates(&self) -> Result<Vec<Vec<u8>>>;
}

/// Upper-case hex thumbprint; anything but hex digits is rejected.
pub fn normalize_thumbprint(thumbprint: &str) -> Result<String> {
    let t: String = thumbprint
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProvisionError::certificate(format!(
            "invalid thumbprint '{}'",
            thumbprint
        )));
    }
    Ok(t)
}

pub fn sha1_thumbprint(der: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(der))
}

/// Hash the certificate bytes and compare with the claimed thumbprint.
pub fn verify_thumbprint(cert: &ManagementCertificate) -> Result<()> {
    let algorithm = cert.thumbprint_algorithm.trim();
    if !algorithm.is_empty() && !algorithm.eq_ignore_ascii_case("sha1") {
        return Err(ProvisionError::certificate(format!(
            "unsupported thumbprint algorithm '{}'",
            algorithm
        )));
    }
    let expected = normalize_thumbprint(&cert.thumbprint)?;
    let actual = sha1_thumbprint(&cert.data);
    if actual != expected {
        return Err(ProvisionError::certificate(format!(
            "thumbprint mismatch: expected {}, certificate hashes to {}",
            expected, actual
        )));
    }
    Ok(())
}

pub struct FileTrustStore {
    dir: PathBuf,
}

impl FileTrustStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thumbprint: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.pem", normalize_thumbprint(thumbprint)?)))
    }
}

#[async_trait]
impl TrustStore for FileTrustStore {
    async fn contains(&self, thumbprint: &str) -> Result<bool> {
        let path = self.path_for(thumbprint)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn install(&self, cert: &ManagementCertificate) -> Result<()> {
        verify_thumbprint(cert)?;
        let path = self.path_for(&cert.thumbprint)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let encoded = pem::encode(&pem::Pem::new(PEM_TAG, cert.data.clone()));
        tokio::fs::write(&path, encoded).await?;
        info!(path = %path.display(), "trusted certificate installed");
        Ok(())
    }

    async fn trusted_certificates(&self) -> Result<Vec<Vec<u8>>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut certs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let text = tokio::fs::read(&path).await?;
            let parsed = pem::parse(&text).map_err(|e| {
                ProvisionError::certificate(format!("{}: {}", path.display(), e))
            })?;
            if parsed.tag() == PEM_TAG {
                certs.push(parsed.contents().to_vec());
            } else {
                debug!(path = %path.display(), tag = parsed.tag(), "skipping non-certificate PEM");
            }
        }
        Ok(certs)
    }
}
