/*!

`hypershift-aws` installs and uninstalls hosted OpenShift control planes on an AWS management
cluster. The control plane runs in a namespace of the management cluster; this crate creates the
AWS load balancers, DNS records and ignition bucket that make it reachable, renders its manifests
through the `hypershift` toolkit and applies them.

The orchestrators in [`install`] and [`uninstall`] only talk to the outside world through
traits ([`cloud::CloudProvider`], [`management::ManagementCluster`], the [`toolkit`] traits,
[`apply::ManifestApplier`] and [`readiness::ClusterProbe`]) so that they can be run against
in-memory implementations.

!*/

pub mod apply;
pub mod cloud;
pub mod constants;
pub mod error;
pub mod install;
pub mod management;
pub mod manifests;
pub mod naming;
pub mod params;
pub mod readiness;
pub mod reconcile;
pub mod toolkit;
pub mod uninstall;
pub mod wait;

pub use error::{Error, Result};
pub use install::{install_cluster, Collaborators, InstallOptions, InstalledCluster};
pub use naming::{get_name, ClusterIdentity};
pub use uninstall::uninstall_cluster;
