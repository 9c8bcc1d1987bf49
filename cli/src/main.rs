/*!

This is the command line interface for installing hosted OpenShift control planes on an AWS
management cluster and uninstalling them again.

!*/

mod install;
mod uninstall;

use anyhow::{Context, Result};
use clap::Parser;
use hypershift_aws::management::{kube_client, KubeManagementCluster};
use hypershift_utils::init_logger;
use log::LevelFilter;
use std::path::PathBuf;

/// Install and uninstall hosted clusters on an AWS management cluster.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    /// Path to the management cluster's kubeconfig. Also can be passed with the KUBECONFIG
    /// environment variable.
    #[clap(long = "kubeconfig")]
    kubeconfig: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Install a hosted cluster.
    Install(install::Install),
    /// Remove a hosted cluster and every cloud resource created for it.
    Uninstall(uninstall::Uninstall),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(env!("CARGO_CRATE_NAME"), Some(args.log_level));
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let client = kube_client(args.kubeconfig.as_deref())
        .await
        .context("Unable to create a client for the management cluster")?;
    let management = KubeManagementCluster::new(client.clone());
    match args.command {
        Command::Install(install) => install.run(client, &management).await,
        Command::Uninstall(uninstall) => uninstall.run(&management).await,
    }
}
