use anyhow::{Context, Result};
use clap::Parser;
use hypershift_aws::apply::KubeApplier;
use hypershift_aws::cloud::aws::AwsConnector;
use hypershift_aws::management::KubeManagementCluster;
use hypershift_aws::readiness::KubeProbeConnector;
use hypershift_aws::toolkit::ToolkitCommand;
use hypershift_aws::{install_cluster, Collaborators, InstallOptions};
use kube::Client;
use std::path::PathBuf;

/// The install subcommand creates the namespace, cloud resources and control plane of a hosted
/// cluster.
#[derive(Debug, Parser)]
pub(crate) struct Install {
    /// Name of the hosted cluster. Also the name of its namespace on the management cluster.
    name: String,

    /// Release image of the hosted cluster. Defaults to the management cluster's release image.
    #[clap(long = "release-image")]
    release_image: Option<String>,

    /// Pre-generated Diffie-Hellman parameters for the VPN server.
    #[clap(long = "dh-params", parse(from_os_str))]
    dh_params: Option<PathBuf>,

    /// Wait for the hosted cluster's nodes and operators to become ready.
    #[clap(
        long = "wait-for-cluster-ready",
        parse(try_from_str),
        default_value = "true"
    )]
    wait_for_cluster_ready: bool,

    /// Image overriding the control plane operator of the release.
    #[clap(long = "control-plane-operator-image", env = "CONTROL_PLANE_OPERATOR_IMAGE")]
    control_plane_operator_image: Option<String>,

    /// The `hypershift` toolkit binary that generates PKI and ignition and renders manifests.
    #[clap(
        long = "toolkit-bin",
        env = "HYPERSHIFT_TOOLKIT_BIN",
        default_value = "hypershift",
        parse(from_os_str)
    )]
    toolkit_bin: PathBuf,

    /// Directory for the generated PKI, ignition and manifests. A temporary directory is created
    /// when not given.
    #[clap(long = "work-dir", parse(from_os_str))]
    work_dir: Option<PathBuf>,
}

impl Install {
    pub(crate) async fn run(self, client: Client, management: &KubeManagementCluster) -> Result<()> {
        let toolkit = ToolkitCommand::new(self.toolkit_bin);
        let applier = KubeApplier::new(client.clone());
        let probe = KubeProbeConnector::new(client);
        let collaborators = Collaborators {
            management,
            cloud: &AwsConnector,
            pki: &toolkit,
            ignition: &toolkit,
            renderer: &toolkit,
            applier: &applier,
            probe: &probe,
        };
        let options = InstallOptions {
            name: self.name,
            release_image: self.release_image,
            dh_params: self.dh_params,
            wait_for_cluster_ready: self.wait_for_cluster_ready,
            control_plane_operator_image: self.control_plane_operator_image,
            work_dir: self.work_dir,
        };
        let installed = install_cluster(&collaborators, &options)
            .await
            .context(format!(
                "Unable to install cluster '{}'. (Created resources are kept, run install again \
                 after fixing the cause or uninstall)",
                options.name
            ))?;

        println!("{}", installed);

        Ok(())
    }
}
