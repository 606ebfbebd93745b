//! Central service façade for Service Management operations.
//!
//! Aggregates the HTTP client, auth state and all domain modules behind a
//! single `AsmService` struct. Every call re-authenticates lazily when the
//! cached token is missing or expired.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth;
use crate::certificates;
use crate::client::AsmClient;
use crate::hosted_services;
use crate::types::*;
use crate::virtual_machines;
use crate::websites;

/// Shared, lockable service handle.
pub type AsmServiceState = Arc<Mutex<AsmService>>;

pub struct AsmService {
    client: AsmClient,
    credentials: Option<AsmCredentials>,
}

impl AsmService {
    /// Create a new service wrapped in `Arc<Mutex<_>>`.
    pub fn new(config: AsmConfig) -> AsmServiceState {
        Arc::new(Mutex::new(Self::with_client(AsmClient::with_config(config))))
    }

    pub fn with_client(client: AsmClient) -> Self {
        Self {
            client,
            credentials: None,
        }
    }

    // ── Configuration ────────────────────────────────────────────────

    pub fn set_credentials(&mut self, creds: AsmCredentials) {
        self.client.set_credentials(creds.clone());
        self.credentials = Some(creds);
    }

    pub fn config(&self) -> &AsmConfig {
        self.client.config()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    // ── Auth ─────────────────────────────────────────────────────────

    pub async fn authenticate(&mut self) -> AsmResult<()> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(AsmError::not_authenticated)?;
        let token = auth::acquire_token(&self.client, creds).await?;
        self.client.set_token(token);
        Ok(())
    }

    pub fn set_token(&mut self, token: AsmToken) {
        self.client.set_token(token);
    }

    pub fn disconnect(&mut self) {
        self.client.clear_token();
    }

    async fn ensure_auth(&mut self) -> AsmResult<()> {
        if !self.client.is_authenticated() {
            self.authenticate().await?;
        }
        Ok(())
    }

    // ── Hosted services ──────────────────────────────────────────────

    pub async fn get_hosted_service(&mut self, name: &str) -> AsmResult<Option<HostedService>> {
        self.ensure_auth().await?;
        hosted_services::get_hosted_service(&self.client, name).await
    }

    pub async fn create_hosted_service(&mut self, name: &str, location: &str) -> AsmResult<()> {
        self.ensure_auth().await?;
        hosted_services::create_hosted_service(&self.client, name, location).await
    }

    // ── Virtual machines ─────────────────────────────────────────────

    pub async fn get_deployment(&mut self, service: &str) -> AsmResult<Option<Deployment>> {
        self.ensure_auth().await?;
        virtual_machines::get_deployment(&self.client, service).await
    }

    pub async fn create_vm_deployment(
        &mut self,
        service: &str,
        req: &VmRoleRequest,
    ) -> AsmResult<()> {
        self.ensure_auth().await?;
        virtual_machines::create_vm_deployment(&self.client, service, req).await
    }

    pub async fn add_role(
        &mut self,
        service: &str,
        deployment: &str,
        req: &VmRoleRequest,
    ) -> AsmResult<()> {
        self.ensure_auth().await?;
        virtual_machines::add_role(&self.client, service, deployment, req).await
    }

    pub async fn update_role_data_disks(
        &mut self,
        service: &str,
        deployment: &str,
        role: &Role,
        new_disks: &[NewDataDisk],
    ) -> AsmResult<()> {
        self.ensure_auth().await?;
        virtual_machines::update_role_data_disks(&self.client, service, deployment, role, new_disks)
            .await
    }

    pub async fn wait_for_role_ready(
        &mut self,
        service: &str,
        role_name: &str,
    ) -> AsmResult<Deployment> {
        self.ensure_auth().await?;
        virtual_machines::wait_for_role_ready(&self.client, service, role_name).await
    }

    pub async fn start_role(
        &mut self,
        service: &str,
        deployment: &str,
        role_name: &str,
    ) -> AsmResult<()> {
        self.ensure_auth().await?;
        virtual_machines::start_role(&self.client, service, deployment, role_name).await
    }

    // ── Certificates ─────────────────────────────────────────────────

    pub async fn get_service_certificate(
        &mut self,
        service: &str,
        thumbprint: &str,
    ) -> AsmResult<ServiceCertificate> {
        self.ensure_auth().await?;
        certificates::get_service_certificate(&self.client, service, thumbprint).await
    }

    // ── Web sites ────────────────────────────────────────────────────

    pub async fn find_site(&mut self, name: &str) -> AsmResult<Option<(WebSpace, Site)>> {
        self.ensure_auth().await?;
        websites::find_site(&self.client, name).await
    }

    pub async fn create_site(&mut self, name: &str, geo_region: &str) -> AsmResult<Site> {
        self.ensure_auth().await?;
        websites::create_site(&self.client, name, geo_region).await
    }

    pub async fn get_site_config(&mut self, web_space: &str, name: &str) -> AsmResult<SiteConfig> {
        self.ensure_auth().await?;
        websites::get_site_config(&self.client, web_space, name).await
    }

    pub async fn update_app_settings(
        &mut self,
        web_space: &str,
        name: &str,
        settings: &[NameValuePair],
    ) -> AsmResult<()> {
        self.ensure_auth().await?;
        websites::update_app_settings(&self.client, web_space, name, settings).await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
