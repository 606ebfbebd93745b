//! One-shot remote script execution: open a shell, run, collect, close.

use log::{debug, info, warn};

use crate::auth::provider_for;
use crate::transport::WinRmTransport;
use crate::types::*;

/// Run a PowerShell script on the host behind `config.endpoint`,
/// authenticating with `config.auth_method`.
///
/// The shell is always deleted, also when execution fails. A non-zero exit
/// code is returned in the output, not as an error.
pub async fn run_script(
    config: &WinRmConfig,
    credential: &WinRmCredential,
    script: &str,
) -> WinRmResult<CommandOutput> {
    let mut transport = WinRmTransport::new(config)?;
    transport.authenticate(provider_for(config.auth_method, credential))?;

    info!("Running remote script on {}", transport.endpoint());
    let shell_id = transport.create_shell().await?;

    let result = run_in_shell(&mut transport, &shell_id, script).await;

    for err in transport.cleanup().await {
        warn!("WinRM shell cleanup: {}", err);
    }

    let output = result?;
    debug!(
        "Remote script exited with {} ({} bytes stdout, {} bytes stderr)",
        output.exit_code,
        output.stdout.len(),
        output.stderr.len()
    );
    Ok(output)
}

async fn run_in_shell(
    transport: &mut WinRmTransport,
    shell_id: &str,
    script: &str,
) -> WinRmResult<CommandOutput> {
    let command_id = transport.execute_ps_command(shell_id, script).await?;
    let output = transport.receive_all_output(shell_id, &command_id).await?;
    if let Err(e) = transport
        .signal_command(shell_id, &command_id, WsManSignal::TERMINATE)
        .await
    {
        debug!("Terminate signal for {} ignored: {}", command_id, e);
    }
    Ok(output)
}

/// Like [`run_script`], but a non-zero exit code becomes
/// [`WinRmErrorKind::CommandFailed`].
pub async fn run_script_checked(
    config: &WinRmConfig,
    credential: &WinRmCredential,
    script: &str,
) -> WinRmResult<CommandOutput> {
    check_exit(run_script(config, credential, script).await?)
}

pub fn check_exit(output: CommandOutput) -> WinRmResult<CommandOutput> {
    if output.success() {
        return Ok(output);
    }
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    Err(WinRmError::new(
        WinRmErrorKind::CommandFailed,
        format!("exit code {}: {}", output.exit_code, detail),
    ))
}
