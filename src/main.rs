use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use azprov::cli::{Cli, Commands, SiteArgs, StartArgs, VmArgs};
use azprov::{
    prompt, startup, AsmProvider, FileTrustStore, ProvisionConfig, Provisioner, SiteProvisioner,
    VmRequest, WinRmExecutor,
};

/// `RUST_LOG` wins; otherwise `-v` raises the default level.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 0)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn emit<T: Serialize>(json: bool, report: &T, summary: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed to serialize report")?
        );
    } else {
        println!("{}", summary(report));
    }
    Ok(())
}

async fn run_vm(config: &ProvisionConfig, args: VmArgs, json: bool) -> Result<()> {
    let credential = prompt::admin_credential(args.admin_username.as_deref())
        .context("failed to obtain admin credential")?;
    let provider = AsmProvider::from_config(config)?;
    let trust_store = FileTrustStore::new(config.trust_store_dir());
    let remote = WinRmExecutor::new(config.winrm_operation_timeout_secs)
        .with_auth_method(config.winrm_auth);
    let provisioner = Provisioner::new(provider, trust_store, remote)
        .with_vm_defaults(config.role_size.clone(), config.image_name.clone());

    let request = VmRequest {
        service_name: args.service_name,
        vm_name: args.vm_name,
        location: args.location,
        disk_size_gb: args.disk_size_gb,
        disk_count: args.disk_count,
        credential,
    };
    let report = provisioner
        .run(&request)
        .await
        .with_context(|| format!("provisioning {}/{} failed", request.service_name, request.vm_name))?;

    emit(json, &report, |r| {
        let disks: Vec<String> = r
            .vm
            .disks
            .iter()
            .map(|d| format!("{}(LUN {}, {} GB)", d.label, d.lun, d.size_gb))
            .collect();
        format!(
            "{} ({}) {}; VM {} {}; disks: {}",
            r.service.name,
            r.service.location,
            if r.service_created { "created" } else { "existing" },
            r.vm.name,
            if r.vm_created { "created" } else { "updated" },
            disks.join(", ")
        )
    })
}

async fn run_site(config: &ProvisionConfig, args: SiteArgs, json: bool) -> Result<()> {
    let provider = AsmProvider::from_config(config)?;
    let report = SiteProvisioner::new(provider)
        .run(&args.name, args.location.as_deref(), &args.settings)
        .await
        .with_context(|| format!("provisioning site {} failed", args.name))?;

    emit(json, &report, |r| {
        format!(
            "site {} in {} {} with {} app settings",
            r.site.name,
            r.site.web_space,
            if r.created { "created" } else { "existing" },
            r.app_settings.len()
        )
    })
}

async fn run_start(config: &ProvisionConfig, args: StartArgs, json: bool) -> Result<()> {
    let provider = AsmProvider::from_config(config)?;
    let report = startup::start_virtual_machines(&provider, &args.service_name, &args.vm_name)
        .await
        .with_context(|| format!("starting VMs of {} failed", args.service_name))?;

    emit(json, &report, |r| {
        format!("started in {}: {}", r.service_name, r.started.join(", "))
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = ProvisionConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    match cli.command {
        Commands::Vm(args) => run_vm(&config, args, cli.json).await,
        Commands::Site(args) => run_site(&config, args, cli.json).await,
        Commands::Start(args) => run_start(&config, args, cli.json).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
