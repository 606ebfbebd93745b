//! Asynchronous operation tracking – Get Operation Status polling.

use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::client::AsmClient;
use crate::types::{AsmError, AsmErrorKind, AsmResult, OperationStatus, Submitted};

/// Fetch the current status of an accepted request.
pub async fn get_operation_status(
    client: &AsmClient,
    request_id: &str,
) -> AsmResult<OperationStatus> {
    let url = client.subscription_url(&format!("/operations/{}", request_id))?;
    debug!("get_operation_status({}) → {}", request_id, url);
    client.get_xml(&url).await
}

/// Poll an accepted request until it leaves `InProgress`.
pub async fn wait_for_operation(client: &AsmClient, request_id: &str) -> AsmResult<()> {
    let cfg = client.config();
    let interval = Duration::from_secs(cfg.poll_interval_secs);
    let deadline = Instant::now() + Duration::from_secs(cfg.operation_timeout_secs);

    loop {
        let op = get_operation_status(client, request_id).await?;
        if !op.is_in_progress() {
            return operation_outcome(request_id, &op);
        }
        if Instant::now() >= deadline {
            return Err(AsmError::new(
                AsmErrorKind::Timeout,
                format!(
                    "Operation {} still in progress after {}s",
                    request_id, cfg.operation_timeout_secs
                ),
            ));
        }
        debug!("operation {} in progress", request_id);
        tokio::time::sleep(interval).await;
    }
}

/// Block until a submitted request has fully completed.
pub async fn complete(client: &AsmClient, submitted: Submitted) -> AsmResult<()> {
    match submitted {
        Submitted::Completed => Ok(()),
        Submitted::Accepted(id) => wait_for_operation(client, &id).await,
    }
}

fn operation_outcome(request_id: &str, op: &OperationStatus) -> AsmResult<()> {
    if op.is_succeeded() {
        info!("operation {} succeeded", request_id);
        return Ok(());
    }
    let detail = op
        .error
        .as_ref()
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|| op.status.clone());
    let mut err = AsmError::new(
        AsmErrorKind::OperationFailed,
        format!("Operation {} failed – {}", request_id, detail),
    );
    err.status_code = op.http_status_code;
    Err(err)
}

// ─── Tests ──────────────────────────────────────────────────────────
