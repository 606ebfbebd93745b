//! Web spaces, web sites and site configuration (app settings).

use log::debug;

use crate::client::AsmClient;
use crate::operations;
use crate::types::{
    AsmError, AsmErrorKind, AsmResult, NameValuePair, Site, SiteConfig, Sites, WebSpace,
    WebSpaces,
};
use crate::xml;

/// Web space that hosts sites of a region: `"West US"` → `"westuswebspace"`.
pub fn webspace_for_region(region: &str) -> String {
    let compact: String = region
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    format!("{}webspace", compact)
}

fn site_path(web_space: &str, site_name: &str) -> String {
    format!("/services/webspaces/{}/sites/{}", web_space, site_name)
}

pub async fn list_web_spaces(client: &AsmClient) -> AsmResult<Vec<WebSpace>> {
    let url = client.subscription_url("/services/webspaces")?;
    debug!("list_web_spaces → {}", url);
    let spaces: WebSpaces = client.get_xml(&url).await?;
    Ok(spaces.spaces)
}

pub async fn list_sites(client: &AsmClient, web_space: &str) -> AsmResult<Vec<Site>> {
    let url = client.subscription_url(&format!("/services/webspaces/{}/sites", web_space))?;
    debug!("list_sites({}) → {}", web_space, url);
    let sites: Sites = client.get_xml(&url).await?;
    Ok(sites.sites)
}

pub async fn get_site(client: &AsmClient, web_space: &str, site_name: &str) -> AsmResult<Site> {
    let url = client.subscription_url(&site_path(web_space, site_name))?;
    debug!("get_site({}/{}) → {}", web_space, site_name, url);
    client.get_xml(&url).await
}

/// Search every web space of the subscription for a site by name.
pub async fn find_site(
    client: &AsmClient,
    site_name: &str,
) -> AsmResult<Option<(WebSpace, Site)>> {
    for space in list_web_spaces(client).await? {
        let found = list_sites(client, &space.name)
            .await?
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(site_name));
        if let Some(site) = found {
            return Ok(Some((space, site)));
        }
    }
    Ok(None)
}

/// Create a site in the web space of `geo_region` and return it.
pub async fn create_site(client: &AsmClient, site_name: &str, geo_region: &str) -> AsmResult<Site> {
    if site_name.is_empty() || geo_region.is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::Validation,
            "site name and region are required",
        ));
    }
    let web_space = webspace_for_region(geo_region);
    let url = client.subscription_url(&format!("/services/webspaces/{}/sites/", web_space))?;
    debug!("create_site({}, {}) → {}", site_name, geo_region, url);
    let body = xml::create_site_body(site_name, &web_space, geo_region);
    let submitted = client.post_xml(&url, &body).await?;
    operations::complete(client, submitted).await?;
    get_site(client, &web_space, site_name).await
}

pub async fn get_site_config(
    client: &AsmClient,
    web_space: &str,
    site_name: &str,
) -> AsmResult<SiteConfig> {
    let url = client.subscription_url(&format!("{}/config", site_path(web_space, site_name)))?;
    debug!("get_site_config({}/{}) → {}", web_space, site_name, url);
    client.get_xml(&url).await
}

/// Replace the whole app-settings collection of a site.
pub async fn update_app_settings(
    client: &AsmClient,
    web_space: &str,
    site_name: &str,
    settings: &[NameValuePair],
) -> AsmResult<()> {
    let url = client.subscription_url(&format!("{}/config", site_path(web_space, site_name)))?;
    debug!(
        "update_app_settings({}/{}, {} settings) → {}",
        web_space,
        site_name,
        settings.len(),
        url
    );
    let submitted = client.put_xml(&url, &xml::site_config_body(settings)).await?;
    operations::complete(client, submitted).await
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webspace_naming() {
        assert_eq!(webspace_for_region("West US"), "westuswebspace");
        assert_eq!(webspace_for_region("North Europe"), "northeuropewebspace");
        assert_eq!(webspace_for_region("eastasia"), "eastasiawebspace");
    }

    #[test]
    fn site_path_construction() {
        assert_eq!(
            site_path("westuswebspace", "contoso"),
            "/services/webspaces/westuswebspace/sites/contoso"
        );
    }

    #[test]
    fn webspaces_deserialization() {
        let xml = r#"<WebSpaces xmlns="http://schemas.microsoft.com/windowsazure">
  <WebSpace><GeoRegion>West US</GeoRegion><Name>westuswebspace</Name><Plan>VirtualDedicatedPlan</Plan></WebSpace>
  <WebSpace><GeoRegion>East US</GeoRegion><Name>eastuswebspace</Name></WebSpace>
</WebSpaces>"#;
        let spaces: WebSpaces = crate::client::parse_xml(xml).unwrap();
        assert_eq!(spaces.spaces.len(), 2);
        assert_eq!(spaces.spaces[0].geo_region, "West US");
        assert_eq!(spaces.spaces[1].name, "eastuswebspace");
    }

    #[tokio::test]
    async fn create_requires_region() {
        let client = AsmClient::new();
        let e = create_site(&client, "contoso", "").await.unwrap_err();
        assert_eq!(e.kind, AsmErrorKind::Validation);
    }
}
