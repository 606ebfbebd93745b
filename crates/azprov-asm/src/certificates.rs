//! Service certificates attached to a hosted service.

use base64::Engine;
use log::debug;

use crate::client::AsmClient;
use crate::types::{AsmError, AsmErrorKind, AsmResult, ServiceCertificate};

/// Get a service certificate by SHA-1 thumbprint.
pub async fn get_service_certificate(
    client: &AsmClient,
    service_name: &str,
    thumbprint: &str,
) -> AsmResult<ServiceCertificate> {
    let url = client.subscription_url(&format!(
        "/services/hostedservices/{}/certificates/sha1-{}",
        service_name, thumbprint
    ))?;
    debug!("get_service_certificate({}, {}) → {}", service_name, thumbprint, url);
    client.get_xml(&url).await
}

/// Decode the base64 `Data` element into DER bytes.
pub fn certificate_der(cert: &ServiceCertificate) -> AsmResult<Vec<u8>> {
    let compact: String = cert.data.split_whitespace().collect();
    if compact.is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::Parse,
            format!("Certificate {} has no data", cert.thumbprint),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| AsmError::new(AsmErrorKind::Parse, format!("Certificate data: {e}")))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_decoding_ignores_line_breaks() {
        let cert = ServiceCertificate {
            thumbprint: "AB".into(),
            data: "AQID\nBAU=".into(),
            ..Default::default()
        };
        assert_eq!(certificate_der(&cert).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_data_is_parse_error() {
        let cert = ServiceCertificate::default();
        assert_eq!(certificate_der(&cert).unwrap_err().kind, AsmErrorKind::Parse);
    }

    #[test]
    fn invalid_base64_is_parse_error() {
        let cert = ServiceCertificate {
            data: "***".into(),
            ..Default::default()
        };
        assert_eq!(certificate_der(&cert).unwrap_err().kind, AsmErrorKind::Parse);
    }
}
