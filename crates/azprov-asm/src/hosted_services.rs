//! Hosted services (cloud services) – get and create.

use log::debug;

use crate::client::AsmClient;
use crate::operations;
use crate::types::{AsmError, AsmErrorKind, AsmResult, HostedService};
use crate::xml;

fn service_path(service_name: &str) -> String {
    format!("/services/hostedservices/{}", service_name)
}

/// Get a hosted service, `None` when it does not exist.
pub async fn get_hosted_service(
    client: &AsmClient,
    service_name: &str,
) -> AsmResult<Option<HostedService>> {
    let url = client.subscription_url(&service_path(service_name))?;
    debug!("get_hosted_service({}) → {}", service_name, url);
    client.get_xml_optional(&url).await
}

/// Create a hosted service in `location`.
pub async fn create_hosted_service(
    client: &AsmClient,
    service_name: &str,
    location: &str,
) -> AsmResult<()> {
    if service_name.is_empty() || location.is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::Validation,
            "service name and location are required",
        ));
    }
    let url = client.subscription_url("/services/hostedservices")?;
    debug!("create_hosted_service({}, {}) → {}", service_name, location, url);
    let body = xml::create_hosted_service_body(service_name, location);
    let submitted = client.post_xml(&url, &body).await?;
    operations::complete(client, submitted).await
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_construction() {
        assert_eq!(service_path("svc"), "/services/hostedservices/svc");
    }

    #[tokio::test]
    async fn create_requires_location() {
        let client = AsmClient::new();
        let e = create_hosted_service(&client, "svc", "").await.unwrap_err();
        assert_eq!(e.kind, AsmErrorKind::Validation);
    }
}
