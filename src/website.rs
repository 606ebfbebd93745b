//! Web-site provisioning and app-settings merge.

use tracing::{info, warn};

use crate::error::{ProvisionError, Result};
use crate::model::{AppSetting, SiteReport, WebSite};
use crate::provider::WebsiteProvider;

/// Parse a `KEY=VALUE` pair. The value may be empty or contain `=`.
pub fn parse_setting(pair: &str) -> Result<AppSetting> {
    let (name, value) = pair.split_once('=').ok_or_else(|| {
        ProvisionError::validation(format!("app setting '{}' is not KEY=VALUE", pair))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ProvisionError::validation(format!(
            "app setting '{}' has an empty name",
            pair
        )));
    }
    Ok(AppSetting::new(name, value))
}

/// Existing order is kept, matching names take the new value, unknown
/// names are appended in the order given.
pub fn merge_app_settings(existing: Vec<AppSetting>, updates: &[AppSetting]) -> Vec<AppSetting> {
    let mut merged = existing;
    for update in updates {
        match merged.iter_mut().find(|s| s.name == update.name) {
            Some(slot) => slot.value = update.value.clone(),
            None => merged.push(update.clone()),
        }
    }
    merged
}

pub struct SiteProvisioner<W> {
    provider: W,
}

impl<W: WebsiteProvider> SiteProvisioner<W> {
    pub fn new(provider: W) -> Self {
        Self { provider }
    }

    /// Find the site in any web space, or create it in the web space of
    /// `location`. Returns the site and whether it was created.
    pub async fn ensure_web_site(&self, name: &str, location: Option<&str>) -> Result<(WebSite, bool)> {
        if name.trim().is_empty() {
            return Err(ProvisionError::validation("site name is required"));
        }
        let location = location.map(str::trim).filter(|l| !l.is_empty());

        if let Some(site) = self.provider.find_site(name).await? {
            if let Some(requested) = location {
                if !requested.eq_ignore_ascii_case(&site.region) {
                    warn!(
                        site = %name,
                        existing = %site.region,
                        requested = %requested,
                        "site already exists; location parameter ignored"
                    );
                }
            }
            info!(site = %name, web_space = %site.web_space, "using existing site");
            return Ok((site, false));
        }

        let location = location.ok_or_else(|| ProvisionError::missing_location("Web site", name))?;
        info!(site = %name, %location, "creating web site");
        let site = self.provider.create_site(name, location).await?;
        Ok((site, true))
    }

    /// Merge `settings` into the site's app settings with one update.
    pub async fn set_app_settings(&self, site: &WebSite, settings: &[AppSetting]) -> Result<Vec<AppSetting>> {
        let current = self.provider.get_app_settings(site).await?;
        let merged = merge_app_settings(current, settings);
        info!(site = %site.name, count = settings.len(), "updating app settings");
        self.provider.set_app_settings(site, &merged).await?;
        Ok(merged)
    }

    pub async fn run(
        &self,
        name: &str,
        location: Option<&str>,
        settings: &[AppSetting],
    ) -> Result<SiteReport> {
        let (site, created) = self.ensure_web_site(name, location).await?;
        let app_settings = if settings.is_empty() {
            self.provider.get_app_settings(&site).await?
        } else {
            self.set_app_settings(&site, settings).await?
        };
        Ok(SiteReport {
            site,
            created,
            app_settings,
        })
    }
}
