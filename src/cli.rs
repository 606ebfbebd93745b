use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::model::AppSetting;
use crate::website::parse_setting;

/// azprov - classic Azure provisioning
#[derive(Parser, Debug)]
#[command(name = "azprov")]
#[command(about = "Provision classic Azure VMs, web sites and VM start-up")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: <config dir>/azprov/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print the final report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ensure a hosted service and VM with data disks, then format raw disks
    Vm(VmArgs),
    /// Ensure a web site and merge app settings into it
    Site(SiteArgs),
    /// Start VMs of a hosted service
    Start(StartArgs),
}

#[derive(Args, Debug)]
pub struct VmArgs {
    /// Hosted service name
    #[arg(long)]
    pub service_name: String,

    #[arg(long)]
    pub vm_name: String,

    /// Region used only when the service has to be created
    #[arg(long)]
    pub location: Option<String>,

    #[arg(long = "disk-size-in-gb")]
    pub disk_size_gb: u32,

    #[arg(long = "number-of-disks")]
    pub disk_count: u32,

    /// Local admin of a new VM, also used for WinRM (prompted when absent)
    #[arg(long)]
    pub admin_username: Option<String>,
}

#[derive(Args, Debug)]
pub struct SiteArgs {
    /// Site name (host name <name>.azurewebsites.net)
    #[arg(long)]
    pub name: String,

    /// Region used only when the site has to be created
    #[arg(long)]
    pub location: Option<String>,

    /// App setting, repeatable
    #[arg(long = "setting", value_name = "KEY=VALUE", value_parser = parse_setting_arg)]
    pub settings: Vec<AppSetting>,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    #[arg(long)]
    pub service_name: String,

    /// VMs to start, in order
    #[arg(long, required = true, num_args = 1..)]
    pub vm_name: Vec<String>,
}

fn parse_setting_arg(s: &str) -> Result<AppSetting, String> {
    parse_setting(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_command_parses() {
        let cli = Cli::try_parse_from([
            "azprov",
            "-v",
            "vm",
            "--service-name",
            "contoso-svc",
            "--vm-name",
            "vm1",
            "--location",
            "West US",
            "--disk-size-in-gb",
            "16",
            "--number-of-disks",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Vm(args) => {
                assert_eq!(args.service_name, "contoso-svc");
                assert_eq!(args.location.as_deref(), Some("West US"));
                assert_eq!(args.disk_size_gb, 16);
                assert_eq!(args.disk_count, 2);
                assert!(args.admin_username.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn site_settings_repeat() {
        let cli = Cli::try_parse_from([
            "azprov", "site", "--name", "web", "--setting", "A=1", "--setting", "B=x=y", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Site(args) => {
                assert_eq!(
                    args.settings,
                    vec![AppSetting::new("A", "1"), AppSetting::new("B", "x=y")]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn malformed_setting_rejected() {
        assert!(Cli::try_parse_from(["azprov", "site", "--name", "web", "--setting", "oops"]).is_err());
    }

    #[test]
    fn start_requires_vm_names() {
        assert!(Cli::try_parse_from(["azprov", "start", "--service-name", "svc"]).is_err());
        let cli = Cli::try_parse_from([
            "azprov", "start", "--service-name", "svc", "--vm-name", "vm1", "vm2",
        ])
        .unwrap();
        match cli.command {
            Commands::Start(args) => assert_eq!(args.vm_name, vec!["vm1", "vm2"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
