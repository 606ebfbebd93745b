//! Bearer tokens for the Service Management API.
//!
//! Client-credentials grant against the Azure AD v2.0 endpoint, scoped to
//! `https://management.core.windows.net/.default`.

use chrono::{Duration, Utc};
use log::debug;

use crate::client::AsmClient;
use crate::types::{
    AsmCredentials, AsmError, AsmErrorKind, AsmResult, AsmToken, TokenResponse, MANAGEMENT_SCOPE,
};

const AUTHORITY: &str = "https://login.microsoftonline.com";

fn token_url(tenant_id: &str) -> String {
    format!("{}/{}/oauth2/v2.0/token", AUTHORITY, tenant_id)
}

/// Names of the credential fields the grant cannot do without.
fn missing_fields(creds: &AsmCredentials) -> Vec<&'static str> {
    [
        ("tenant_id", creds.tenant_id.is_empty()),
        ("client_id", creds.client_id.is_empty()),
        ("client_secret", creds.client_secret.is_empty()),
    ]
    .into_iter()
    .filter_map(|(name, empty)| empty.then_some(name))
    .collect()
}

pub async fn acquire_token(client: &AsmClient, creds: &AsmCredentials) -> AsmResult<AsmToken> {
    let missing = missing_fields(creds);
    if !missing.is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::Validation,
            format!("cannot request a token, missing {}", missing.join(", ")),
        ));
    }

    let url = token_url(&creds.tenant_id);
    debug!("Token request for client {} → {}", creds.client_id, url);

    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
        ("scope", MANAGEMENT_SCOPE),
    ];
    let resp: TokenResponse = client.post_form_unauthenticated(&url, &form).await?;
    Ok(into_token(resp))
}

/// Absolute expiry from the relative `expires_in`.
fn into_token(resp: TokenResponse) -> AsmToken {
    AsmToken {
        expires_at: resp
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
        access_token: resp.access_token,
        token_type: resp.token_type,
    }
}
