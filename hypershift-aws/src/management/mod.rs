/*!

The management cluster hosts every hosted control plane in a namespace of its own. This module
reads the facts an install or uninstall needs from it (infrastructure name, region, networks,
DNS zone, credentials, worker machines) and creates or deletes the objects the orchestrators
own in it.

Facts are parsed from the JSON form of the OpenShift config objects by pure functions so that
they can be tested without a cluster.

!*/

use crate::error::{self, Result};
use crate::naming::{ClusterIdentity, DnsNames};
use async_trait::async_trait;
use hypershift_utils::aws::AwsCredentials;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use snafu::OptionExt;

mod http_status_code;
pub mod k8s;

pub use http_status_code::{AllowNotFound, HttpStatusCode, StatusCode};
pub use k8s::{kube_client, KubeManagementCluster};

/// `infrastructures/cluster`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Infrastructure {
    pub infra_name: String,
    pub region: String,
}

/// `networks/cluster`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkCidrs {
    pub service_cidr: String,
    pub pod_cidr: String,
}

/// `dnses/cluster`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DnsZone {
    pub zone_id: String,
    /// The management cluster's base domain without its first label. Hosted clusters get a
    /// subdomain of this.
    pub parent_domain: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInfo {
    pub instance_id: String,
    pub internal_ip: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ServiceType {
    NodePort,
    ClusterIp,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::NodePort => "NodePort",
            ServiceType::ClusterIp => "ClusterIP",
        }
    }
}

/// A single-port service created before the control plane exists, so that its node port or
/// cluster IP can be baked into the rendered manifests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlaceholderService {
    pub name: &'static str,
    pub service_type: ServiceType,
    pub protocol: crate::cloud::Protocol,
    pub port_name: Option<&'static str>,
    pub port: i32,
    pub target_port: i32,
}

/// What the API server allocated for a [`PlaceholderService`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceEndpoint {
    pub node_port: Option<i32>,
    pub cluster_ip: Option<String>,
}

/// Everything the orchestrators read from or change in the management cluster.
#[async_trait]
pub trait ManagementCluster: Send + Sync {
    async fn infrastructure(&self) -> Result<Infrastructure>;

    async fn network(&self) -> Result<NetworkCidrs>;

    async fn dns_zone(&self) -> Result<DnsZone>;

    /// The release image the management cluster itself runs.
    async fn release_image(&self) -> Result<String>;

    /// The `.dockerconfigjson` content of the global pull secret.
    async fn pull_secret(&self) -> Result<String>;

    async fn ssh_public_key(&self) -> Result<String>;

    async fn aws_credentials(&self) -> Result<AwsCredentials>;

    /// Names of all machines in the machine API namespace.
    async fn machine_names(&self) -> Result<Vec<String>>;

    async fn machine(&self, name: &str) -> Result<MachineInfo>;

    /// The full JSON of a machine set in the machine API namespace.
    async fn machine_set(&self, name: &str) -> Result<Value>;

    /// Deletes a machine set, succeeding if it does not exist.
    async fn delete_machine_set(&self, name: &str) -> Result<()>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    async fn create_namespace(&self, namespace: &str) -> Result<()>;

    /// Deletes a namespace, succeeding if it does not exist.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// Allow the `default` service account of `namespace` to run privileged pods.
    async fn ensure_privileged(&self, namespace: &str) -> Result<()>;

    /// Create the image pull secret and attach it to the `default` service account.
    async fn create_pull_secret(&self, namespace: &str, dockerconfigjson: &str) -> Result<()>;

    async fn create_service(
        &self,
        namespace: &str,
        service: &PlaceholderService,
    ) -> Result<ServiceEndpoint>;

    /// Deletes a secret, succeeding if it does not exist.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

/// What both install and uninstall derive from the management cluster before changing
/// anything.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterContext {
    pub identity: ClusterIdentity,
    pub dns_zone: DnsZone,
    pub dns_names: DnsNames,
}

pub async fn cluster_context(
    management: &dyn ManagementCluster,
    name: &str,
) -> Result<ClusterContext> {
    let infrastructure = management.infrastructure().await?;
    debug!(
        "Management cluster infrastructure '{}' in region '{}'",
        infrastructure.infra_name, infrastructure.region
    );
    let dns_zone = management.dns_zone().await?;
    debug!(
        "Public zone '{}' for domain '{}'",
        dns_zone.zone_id, dns_zone.parent_domain
    );
    Ok(ClusterContext {
        identity: ClusterIdentity::new(name, infrastructure.infra_name, infrastructure.region),
        dns_names: DnsNames::new(name, &dns_zone.parent_domain),
        dns_zone,
    })
}

/// Read the string at `pointer` in `value`, which was read from `from`.
pub(crate) fn string_field(value: &Value, pointer: &str, from: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .context(error::MissingFieldSnafu { what: pointer, from })
}

pub fn parse_infrastructure(data: &Value) -> Result<Infrastructure> {
    let from = "infrastructure 'cluster'";
    Ok(Infrastructure {
        infra_name: string_field(data, "/status/infrastructureName", from)?,
        region: string_field(data, "/status/platformStatus/aws/region", from)?,
    })
}

pub fn parse_network(data: &Value) -> Result<NetworkCidrs> {
    let from = "network 'cluster'";
    Ok(NetworkCidrs {
        service_cidr: string_field(data, "/status/serviceNetwork/0", from)?,
        pod_cidr: string_field(data, "/status/clusterNetwork/0/cidr", from)?,
    })
}

pub fn parse_dns_zone(data: &Value) -> Result<DnsZone> {
    let from = "dns 'cluster'";
    let base_domain = string_field(data, "/spec/baseDomain", from)?;
    let parent_domain = base_domain
        .split_once('.')
        .map(|(_, parent)| parent.to_string())
        .context(error::MissingFieldSnafu {
            what: "parent domain of /spec/baseDomain",
            from,
        })?;
    Ok(DnsZone {
        zone_id: string_field(data, "/spec/publicZone/id", from)?,
        parent_domain,
    })
}

pub fn parse_release_image(data: &Value) -> Result<String> {
    string_field(data, "/status/desired/image", "clusterversion 'version'")
}

pub fn parse_ssh_public_key(data: &Value) -> Result<String> {
    string_field(
        data,
        "/spec/config/passwd/users/0/sshAuthorizedKeys/0",
        "machineconfig '99-master-ssh'",
    )
}

pub fn parse_machine(name: &str, data: &Value) -> Result<MachineInfo> {
    let from = format!("machine '{}'", name);
    let internal_ip = data
        .pointer("/status/addresses")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|address| address.get("type").and_then(Value::as_str) == Some("InternalIP"))
        .and_then(|address| address.get("address"))
        .and_then(Value::as_str)
        .context(error::MissingFieldSnafu {
            what: "InternalIP address",
            from: &from,
        })?;
    Ok(MachineInfo {
        instance_id: string_field(data, "/status/providerStatus/instanceId", &from)?,
        internal_ip: internal_ip.to_string(),
    })
}
