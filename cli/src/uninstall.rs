use anyhow::{Context, Result};
use clap::Parser;
use hypershift_aws::cloud::aws::AwsConnector;
use hypershift_aws::management::KubeManagementCluster;
use hypershift_aws::uninstall_cluster;

/// The uninstall subcommand removes a hosted cluster's cloud resources and namespace.
#[derive(Debug, Parser)]
pub(crate) struct Uninstall {
    /// Name of the hosted cluster to remove.
    name: String,
}

impl Uninstall {
    pub(crate) async fn run(self, management: &KubeManagementCluster) -> Result<()> {
        uninstall_cluster(management, &AwsConnector, &self.name)
            .await
            .context(format!(
                "Unable to uninstall cluster '{}'. (Some resources may be left behind, run \
                 uninstall again to remove them)",
                self.name
            ))?;

        println!("Cluster '{}' was successfully uninstalled.", self.name);

        Ok(())
    }
}
