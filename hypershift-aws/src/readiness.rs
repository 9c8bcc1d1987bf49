/*!

Waits that confirm a freshly installed hosted cluster actually comes up: the API answers its
health check, the manifest bootstrapper pod completes, the worker nodes become ready and every
cluster operator reports itself available.

Each wait is bounded by its own timeout. Timing out is the normal failure mode; only an explicit
`Ready=False` from a node or `Available=False` from an operator ends a wait early. A bootstrap
pod that does not exist yet is simply waited for.

!*/

use crate::constants::{
    API_HEALTH_INTERVAL, API_HEALTH_REQUEST_TIMEOUT, API_HEALTH_TIMEOUT, API_PORT,
    BOOTSTRAP_POD_NAME, BOOTSTRAP_POD_TIMEOUT, CLUSTER_OPERATORS_TIMEOUT, NODES_READY_TIMEOUT,
    READINESS_POLL_INTERVAL,
};
use crate::error::{self, Result};
use crate::management::kube_client;
use crate::wait::wait_until;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DynamicObject, ListParams, ResourceExt};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use log::{debug, info, trace};
use serde_json::Value;
use snafu::{ensure, ResultExt};
use std::path::Path;

const POD_SUCCEEDED: &str = "Succeeded";
const CONDITION_TRUE: &str = "True";
const CONDITION_FALSE: &str = "False";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PodStatus {
    pub name: String,
    pub phase: Option<String>,
}

/// The status of one condition type (`Ready` for nodes, `Available` for operators) of a named
/// object. `None` when the object does not report the condition yet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConditionStatus {
    pub name: String,
    pub status: Option<String>,
}

impl ConditionStatus {
    fn is(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }
}

/// Observes a hosted cluster. Transient failures to observe are reported as "not ready yet"
/// rather than errors, so that only the wait's timeout ends it.
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    async fn api_healthy(&self) -> Result<bool>;

    /// Pods named like the manifest bootstrapper in the hosted cluster's namespace.
    async fn bootstrap_pods(&self) -> Result<Vec<PodStatus>>;

    /// The `Ready` condition of every node of the hosted cluster.
    async fn node_conditions(&self) -> Result<Vec<ConditionStatus>>;

    /// The `Available` condition of every cluster operator of the hosted cluster.
    async fn operator_conditions(&self) -> Result<Vec<ConditionStatus>>;
}

/// Creates a [`ClusterProbe`] once the hosted cluster's PKI exists. `namespace` is the hosted
/// cluster's namespace on the management cluster.
#[async_trait]
pub trait ProbeConnector: Send + Sync {
    async fn connect(
        &self,
        namespace: &str,
        api_dns_name: &str,
        pki_dir: &Path,
    ) -> Result<Box<dyn ClusterProbe>>;
}

pub fn bootstrap_complete(expected: &str, pods: &[PodStatus]) -> Result<bool> {
    for pod in pods {
        ensure!(
            pod.name == expected,
            error::UnexpectedPodSnafu {
                expected,
                name: &pod.name,
            }
        );
        if pod.phase.as_deref() == Some(POD_SUCCEEDED) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn nodes_ready(expected_count: usize, nodes: &[ConditionStatus]) -> Result<bool> {
    if let Some(node) = nodes.iter().find(|node| node.is(CONDITION_FALSE)) {
        return error::NodeNotReadySnafu { node: &node.name }.fail();
    }
    Ok(nodes.len() >= expected_count && nodes.iter().all(|node| node.is(CONDITION_TRUE)))
}

/// An empty operator list is not considered available.
pub fn operators_available(operators: &[ConditionStatus]) -> Result<bool> {
    if let Some(operator) = operators
        .iter()
        .find(|operator| operator.is(CONDITION_FALSE))
    {
        return error::OperatorUnavailableSnafu {
            operator: &operator.name,
        }
        .fail();
    }
    Ok(!operators.is_empty() && operators.iter().all(|operator| operator.is(CONDITION_TRUE)))
}

pub async fn wait_for_api(probe: &dyn ClusterProbe) -> Result<()> {
    wait_until(
        API_HEALTH_INTERVAL,
        API_HEALTH_TIMEOUT,
        "the hosted API to become healthy",
        move || probe.api_healthy(),
    )
    .await
}

pub async fn wait_for_bootstrap(probe: &dyn ClusterProbe) -> Result<()> {
    wait_until(
        READINESS_POLL_INTERVAL,
        BOOTSTRAP_POD_TIMEOUT,
        "the manifest bootstrapper to complete",
        move || async move {
            bootstrap_complete(BOOTSTRAP_POD_NAME, &probe.bootstrap_pods().await?)
        },
    )
    .await
}

pub async fn wait_for_nodes(probe: &dyn ClusterProbe, expected_count: usize) -> Result<()> {
    wait_until(
        READINESS_POLL_INTERVAL,
        NODES_READY_TIMEOUT,
        &format!("{} nodes to become ready", expected_count),
        move || async move { nodes_ready(expected_count, &probe.node_conditions().await?) },
    )
    .await
}

pub async fn wait_for_cluster_operators(probe: &dyn ClusterProbe) -> Result<()> {
    wait_until(
        READINESS_POLL_INTERVAL,
        CLUSTER_OPERATORS_TIMEOUT,
        "cluster operators to become available",
        move || async move { operators_available(&probe.operator_conditions().await?) },
    )
    .await
}

/// Run the four waits in order.
pub async fn wait_for_cluster_ready(probe: &dyn ClusterProbe, expected_nodes: usize) -> Result<()> {
    info!("Waiting for the hosted API to become healthy");
    wait_for_api(probe).await?;
    info!("Waiting for the manifest bootstrapper to complete");
    wait_for_bootstrap(probe).await?;
    info!("Waiting for {} worker nodes to become ready", expected_nodes);
    wait_for_nodes(probe, expected_nodes).await?;
    info!("Waiting for cluster operators to become available");
    wait_for_cluster_operators(probe).await?;
    info!("The hosted cluster is ready");
    Ok(())
}

/// The status of the `condition_type` condition in a `status.conditions` list.
fn condition_status(conditions: Option<&Value>, condition_type: &str) -> Option<String> {
    conditions?
        .as_array()?
        .iter()
        .find(|condition| condition.get("type").and_then(Value::as_str) == Some(condition_type))?
        .get("status")?
        .as_str()
        .map(str::to_string)
}

/// Probes the hosted API over HTTPS, the bootstrapper pod on the management cluster, and nodes
/// and operators through the hosted cluster's admin kubeconfig.
pub struct KubeClusterProbe {
    http: reqwest::Client,
    healthz_url: String,
    bootstrap_pods: Api<Pod>,
    hosted: Client,
}

impl KubeClusterProbe {
    pub async fn new(
        management: Client,
        namespace: &str,
        api_dns_name: &str,
        pki_dir: &Path,
    ) -> Result<Self> {
        let healthz_url = format!("https://{}:{}/healthz", api_dns_name, API_PORT);
        let ca_path = pki_dir.join("root-ca.crt");
        let ca = tokio::fs::read(&ca_path).await.context(error::FileSnafu {
            action: "read",
            path: &ca_path,
        })?;
        let certificate = reqwest::Certificate::from_pem(&ca).context(error::HttpClientSnafu {
            url: &healthz_url,
        })?;
        let http = reqwest::Client::builder()
            .add_root_certificate(certificate)
            .timeout(API_HEALTH_REQUEST_TIMEOUT)
            .build()
            .context(error::HttpClientSnafu { url: &healthz_url })?;
        let kubeconfig = pki_dir.join("admin.kubeconfig");
        let hosted = kube_client(Some(kubeconfig.as_path())).await?;
        Ok(Self {
            http,
            healthz_url,
            bootstrap_pods: Api::namespaced(management, namespace),
            hosted,
        })
    }
}

#[async_trait]
impl ClusterProbe for KubeClusterProbe {
    async fn api_healthy(&self) -> Result<bool> {
        match self.http.get(&self.healthz_url).send().await {
            Ok(response) => {
                trace!("'{}' returned {}", self.healthz_url, response.status());
                Ok(response.status() == reqwest::StatusCode::OK)
            }
            Err(e) => {
                trace!("'{}' is not reachable yet: {}", self.healthz_url, e);
                Ok(false)
            }
        }
    }

    async fn bootstrap_pods(&self) -> Result<Vec<PodStatus>> {
        let params =
            ListParams::default().fields(&format!("metadata.name={}", BOOTSTRAP_POD_NAME));
        match self.bootstrap_pods.list(&params).await {
            Ok(list) => Ok(list
                .items
                .into_iter()
                .map(|pod| PodStatus {
                    name: pod.name_any(),
                    phase: pod.status.and_then(|status| status.phase),
                })
                .collect()),
            Err(e) => {
                debug!("Unable to list bootstrap pods: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn node_conditions(&self) -> Result<Vec<ConditionStatus>> {
        let nodes = Api::<Node>::all(self.hosted.clone());
        match nodes.list(&ListParams::default()).await {
            Ok(list) => Ok(list
                .items
                .into_iter()
                .map(|node| ConditionStatus {
                    name: node.name_any(),
                    status: node
                        .status
                        .and_then(|status| status.conditions)
                        .and_then(|conditions| {
                            conditions
                                .into_iter()
                                .find(|condition| condition.type_ == "Ready")
                        })
                        .map(|condition| condition.status),
                })
                .collect()),
            Err(e) => {
                debug!("Unable to list hosted cluster nodes: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn operator_conditions(&self) -> Result<Vec<ConditionStatus>> {
        let resource = ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk("config.openshift.io", "v1", "ClusterOperator"),
            "clusteroperators",
        );
        let operators = Api::<DynamicObject>::all_with(self.hosted.clone(), &resource);
        match operators.list(&ListParams::default()).await {
            Ok(list) => Ok(list
                .items
                .iter()
                .map(|operator| ConditionStatus {
                    name: operator.name_any(),
                    status: condition_status(
                        operator.data.pointer("/status/conditions"),
                        "Available",
                    ),
                })
                .collect()),
            Err(e) => {
                debug!("Unable to list cluster operators: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

/// Connects [`KubeClusterProbe`]s using the management cluster client.
pub struct KubeProbeConnector {
    management: Client,
}

impl KubeProbeConnector {
    pub fn new(management: Client) -> Self {
        Self { management }
    }
}

#[async_trait]
impl ProbeConnector for KubeProbeConnector {
    async fn connect(
        &self,
        namespace: &str,
        api_dns_name: &str,
        pki_dir: &Path,
    ) -> Result<Box<dyn ClusterProbe>> {
        Ok(Box::new(
            KubeClusterProbe::new(self.management.clone(), namespace, api_dns_name, pki_dir)
                .await?,
        ))
    }
}
