//! Ports, timeouts and names shared by the orchestrators and reconcilers.

use std::time::Duration;

/// Port of the hosted Kubernetes API, both on the load balancer and inside the control plane.
pub const API_PORT: i32 = 6443;
pub const OAUTH_PORT: i32 = 443;
pub const VPN_PORT: i32 = 1194;
pub const ROUTER_HTTP_PORT: i32 = 80;
pub const ROUTER_HTTPS_PORT: i32 = 443;
pub const ROUTER_NODE_PORT_HTTP: i32 = 31080;
pub const ROUTER_NODE_PORT_HTTPS: i32 = 31443;
pub const OPENSHIFT_API_SERVICE_PORT: i32 = 443;
pub const OPENSHIFT_API_TARGET_PORT: i32 = 8443;

pub const NODE_PORT_RANGE_START: i32 = 30000;
pub const NODE_PORT_RANGE_END: i32 = 32767;
/// Source of the TCP node-port rule (the management cluster VPC).
pub const NODE_PORT_TCP_SOURCE: &str = "10.0.0.0/16";
pub const NODE_PORT_UDP_SOURCE: &str = "0.0.0.0/0";

pub const DNS_RECORD_TTL: i64 = 30;

pub const HEALTH_CHECK_INTERVAL_SECONDS: i32 = 10;
pub const HEALTH_CHECK_TIMEOUT_SECONDS: i32 = 10;
pub const HEALTH_CHECK_THRESHOLD: i32 = 2;

pub const LOAD_BALANCER_NAME_MAX: usize = 32;
pub const TARGET_GROUP_NAME_MAX: usize = 32;
pub const BUCKET_NAME_MAX: usize = 63;
pub const MACHINE_SET_NAME_MAX: usize = 63;

pub const IGNITION_OBJECT_KEY: &str = "worker.ign";
pub const IGNITION_FILE_NAME: &str = "bootstrap.ign";

pub const ADDRESS_RELEASE_INTERVAL: Duration = Duration::from_secs(15);
pub const ADDRESS_RELEASE_TIMEOUT: Duration = Duration::from_secs(4 * 60);

pub const API_HEALTH_INTERVAL: Duration = Duration::from_secs(10);
pub const API_HEALTH_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const API_HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
pub const BOOTSTRAP_POD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const NODES_READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const CLUSTER_OPERATORS_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// Poll interval of the in-cluster readiness waits.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long a new namespace may take to get its `default` service account.
pub const SERVICE_ACCOUNT_TIMEOUT: Duration = Duration::from_secs(60);

pub const APPLY_ATTEMPTS: u32 = 3;
pub const APPLY_BACKOFF: Duration = Duration::from_secs(10);
/// Manifests larger than this are created through the API instead of applied.
pub const MAX_APPLY_MANIFEST_BYTES: u64 = 256 * 1024;

pub const WORKER_REPLICAS: i32 = 3;

pub const MACHINE_API_NAMESPACE: &str = "openshift-machine-api";
pub const BOOTSTRAP_POD_NAME: &str = "manifests-bootstrapper";
pub const PULL_SECRET_NAME: &str = "pull-secret";
pub const FIELD_MANAGER: &str = "hypershift-aws";

/// Rendered manifests that are replaced by the placeholder services created at install time.
pub const EXCLUDED_MANIFESTS: &[&str] = &[
    "kube-apiserver-service.yaml",
    "openshift-apiserver-service.yaml",
    "openvpn-server-service.yaml",
    "oauth-openshift-service.yaml",
];
