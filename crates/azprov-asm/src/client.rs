//! HTTP client wrapper for the Azure Service Management API.
//!
//! Handles bearer-token injection, the mandatory `x-ms-version` header,
//! optional retries for throttling / transient server errors, XML response
//! decoding and extraction of the `x-ms-request-id` of accepted operations.

use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::types::{
    AsmConfig, AsmCredentials, AsmError, AsmErrorKind, AsmResult, AsmToken, Submitted,
};

/// Base delay between retries (doubled each attempt).
const BASE_DELAY_MS: u64 = 500;

const MS_VERSION: &str = "x-ms-version";
const MS_REQUEST_ID: &str = "x-ms-request-id";

/// HTTP client with Service Management auth and retry logic.
#[derive(Clone)]
pub struct AsmClient {
    http: Client,
    token: Option<AsmToken>,
    credentials: Option<AsmCredentials>,
    config: AsmConfig,
}

impl AsmClient {
    pub fn new() -> Self {
        Self::with_config(AsmConfig::new())
    }

    pub fn with_config(config: AsmConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            token: None,
            credentials: None,
            config,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &AsmConfig {
        &self.config
    }

    pub fn set_credentials(&mut self, creds: AsmCredentials) {
        self.credentials = Some(creds);
    }

    pub fn credentials(&self) -> Option<&AsmCredentials> {
        self.credentials.as_ref()
    }

    pub fn set_token(&mut self, token: AsmToken) {
        self.token = Some(token);
    }

    pub fn token(&self) -> Option<&AsmToken> {
        self.token.as_ref()
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .as_ref()
            .map(|t| !t.access_token.is_empty() && !t.is_expired())
            .unwrap_or(false)
    }

    pub fn subscription_id(&self) -> AsmResult<&str> {
        self.credentials
            .as_ref()
            .map(|c| c.subscription_id.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(AsmError::subscription_not_set)
    }

    /// Inner reqwest client (for auth module direct use).
    pub fn http(&self) -> &Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Subscription-scoped URL: `{base}/{subscription}{suffix}`.
    pub fn subscription_url(&self, suffix: &str) -> AsmResult<String> {
        let sub = self.subscription_id()?;
        Ok(format!(
            "{}/{}{}",
            self.config.management_base.trim_end_matches('/'),
            sub,
            suffix
        ))
    }

    // ── Header builder ───────────────────────────────────────────────

    fn headers(&self) -> AsmResult<HeaderMap> {
        let token = self
            .token
            .as_ref()
            .filter(|t| !t.access_token.is_empty())
            .ok_or_else(AsmError::not_authenticated)?;

        let mut headers = HeaderMap::new();
        let val = format!("Bearer {}", token.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&val).map_err(|e| {
                AsmError::new(AsmErrorKind::Auth, format!("Header value error: {e}"))
            })?,
        );
        headers.insert(
            MS_VERSION,
            HeaderValue::from_str(&self.config.api_version).map_err(|e| {
                AsmError::new(AsmErrorKind::Validation, format!("Invalid API version: {e}"))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        Ok(headers)
    }

    // ── Core request loop ────────────────────────────────────────────

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> AsmResult<reqwest::Response> {
        let headers = self.headers()?;
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let mut req = self
                .http
                .request(method.clone(), url)
                .headers(headers.clone());
            if let Some(b) = body {
                req = req.body(b.to_string());
            }

            let resp = req
                .send()
                .await
                .map_err(|e| AsmError::new(AsmErrorKind::Network, format!("{e}")))?;

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            if should_retry(status.as_u16()) && attempt < max_retries {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt);
                warn!("ASM {} {} → {} – retrying in {}ms", method, url, status, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }

            let text = resp.text().await.unwrap_or_default();
            return Err(AsmError::from_status(status.as_u16(), &text));
        }

        Err(AsmError::new(AsmErrorKind::Network, "Max retries exceeded"))
    }

    // ── Verbs ────────────────────────────────────────────────────────

    pub async fn get_xml<T: DeserializeOwned>(&self, url: &str) -> AsmResult<T> {
        debug!("ASM GET {}", url);
        let resp = self.execute(Method::GET, url, None).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| AsmError::new(AsmErrorKind::Network, format!("{e}")))?;
        parse_xml(&text)
    }

    /// GET that maps 404 to `None`.
    pub async fn get_xml_optional<T: DeserializeOwned>(&self, url: &str) -> AsmResult<Option<T>> {
        match self.get_xml(url).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn post_xml(&self, url: &str, body: &str) -> AsmResult<Submitted> {
        debug!("ASM POST {} ({} bytes)", url, body.len());
        let resp = self.execute(Method::POST, url, Some(body)).await?;
        Ok(submitted_from(resp.status(), resp.headers()))
    }

    pub async fn put_xml(&self, url: &str, body: &str) -> AsmResult<Submitted> {
        debug!("ASM PUT {} ({} bytes)", url, body.len());
        let resp = self.execute(Method::PUT, url, Some(body)).await?;
        Ok(submitted_from(resp.status(), resp.headers()))
    }

    /// POST unauthenticated form data (used by auth module for token exchange).
    pub async fn post_form_unauthenticated<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(impl AsRef<str>, impl AsRef<str>)],
    ) -> AsmResult<T> {
        let form_pairs: Vec<(&str, &str)> = form
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();

        let resp = self
            .http
            .post(url)
            .form(&form_pairs)
            .send()
            .await
            .map_err(|e| AsmError::new(AsmErrorKind::Network, format!("{e}")))?;

        if resp.status().is_success() {
            resp.json::<T>().await.map_err(|e| {
                AsmError::new(AsmErrorKind::Parse, format!("JSON parse: {e}"))
            })
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(AsmError::from_status(status, &body))
        }
    }
}

impl Default for AsmClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Decode an XML response body.
pub fn parse_xml<T: DeserializeOwned>(text: &str) -> AsmResult<T> {
    quick_xml::de::from_str(text)
        .map_err(|e| AsmError::new(AsmErrorKind::Parse, format!("XML parse: {e}")))
}

fn submitted_from(status: StatusCode, headers: &HeaderMap) -> Submitted {
    let request_id = headers
        .get(MS_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    match (status, request_id) {
        (StatusCode::ACCEPTED, Some(id)) => Submitted::Accepted(id),
        _ => Submitted::Completed,
    }
}

fn should_retry(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// ─── Tests ──────────────────────────────────────────────────────────
