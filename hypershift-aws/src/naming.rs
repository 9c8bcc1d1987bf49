//! Deterministic names for every resource a cluster owns.
//!
//! Uninstall has no state other than the cluster name and the management cluster's facts, so
//! every name here must be reproducible from a [`ClusterIdentity`] alone.

use crate::cloud::Tag;
use crate::constants::{
    BUCKET_NAME_MAX, LOAD_BALANCER_NAME_MAX, MACHINE_SET_NAME_MAX, TARGET_GROUP_NAME_MAX,
};
use sha2::{Digest, Sha256};

/// Hex characters of the base digest inserted into shortened names.
const HASH_LEN: usize = 8;

/// The identifiers every derived name is built from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterIdentity {
    /// The hosted cluster name, also the namespace on the management cluster.
    pub name: String,
    /// The management cluster's infrastructure name.
    pub infra_name: String,
    pub region: String,
}

impl ClusterIdentity {
    pub fn new<S1, S2, S3>(name: S1, infra_name: S2, region: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            name: name.into(),
            infra_name: infra_name.into(),
            region: region.into(),
        }
    }

    fn base(&self) -> String {
        format!("{}-{}", self.infra_name, self.name)
    }

    /// Name of the API load balancer and of the elastic IP bound to it.
    pub fn api_load_balancer(&self) -> String {
        get_name(&self.base(), "api", LOAD_BALANCER_NAME_MAX)
    }

    pub fn api_address(&self) -> String {
        self.api_load_balancer()
    }

    pub fn api_target_group(&self) -> String {
        get_name(&self.base(), "api", TARGET_GROUP_NAME_MAX)
    }

    pub fn oauth_target_group(&self) -> String {
        get_name(&self.base(), "oauth", TARGET_GROUP_NAME_MAX)
    }

    pub fn router_load_balancer(&self) -> String {
        get_name(&self.base(), "apps", LOAD_BALANCER_NAME_MAX)
    }

    pub fn router_http_target_group(&self) -> String {
        get_name(&self.base(), "http", TARGET_GROUP_NAME_MAX)
    }

    pub fn router_https_target_group(&self) -> String {
        get_name(&self.base(), "https", TARGET_GROUP_NAME_MAX)
    }

    pub fn vpn_load_balancer(&self) -> String {
        get_name(&self.base(), "vpn", LOAD_BALANCER_NAME_MAX)
    }

    pub fn vpn_target_group(&self) -> String {
        get_name(&self.base(), "vpn", TARGET_GROUP_NAME_MAX)
    }

    pub fn ignition_bucket(&self) -> String {
        get_name(&self.base(), "ign", BUCKET_NAME_MAX)
    }

    pub fn worker_machine_set(&self) -> String {
        get_name(&self.base(), "worker", MACHINE_SET_NAME_MAX)
    }

    pub fn user_data_secret(&self) -> String {
        format!("{}-user-data", self.name)
    }

    /// `kubernetes.io/cluster/<infra>=owned`, attached to everything this tool creates.
    pub fn owner_tag(&self) -> Tag {
        Tag::new(format!("kubernetes.io/cluster/{}", self.infra_name), "owned")
    }

    /// The management cluster's external API load balancer, used to discover the VPC.
    pub fn management_load_balancer(&self) -> String {
        format!("{}-ext", self.infra_name)
    }

    pub fn worker_security_group(&self) -> String {
        format!("{}-worker-sg", self.infra_name)
    }

    /// Prefix shared by management cluster worker machines (and their machine set) in `zone`.
    pub fn worker_machine_prefix(&self, zone: &str) -> String {
        format!("{}-worker-{}", self.infra_name, zone)
    }
}

/// Public DNS names of a hosted cluster, all below `<name>.<parent domain>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DnsNames {
    pub base_domain: String,
    pub api: String,
    pub vpn: String,
    pub ingress_subdomain: String,
    /// The wildcard record covering every route of the cluster.
    pub router: String,
}

impl DnsNames {
    pub fn new(name: &str, parent_domain: &str) -> Self {
        let base_domain = format!("{}.{}", name, parent_domain);
        let ingress_subdomain = format!("apps.{}", base_domain);
        Self {
            api: format!("api.{}", base_domain),
            vpn: format!("vpn.{}", base_domain),
            router: format!("*.{}", ingress_subdomain),
            ingress_subdomain,
            base_domain,
        }
    }
}

/// Join `base` and `suffix` with a dash, shortening the result so it never exceeds `max_len`.
///
/// When the plain concatenation fits it is returned as is. Otherwise `base` is truncated and
/// followed by a short digest of the full `base`, so that two long bases sharing a prefix still
/// produce distinct names.
pub fn get_name(base: &str, suffix: &str, max_len: usize) -> String {
    let name = format!("{}-{}", base, suffix);
    if name.len() <= max_len {
        return name;
    }
    let digest = hex::encode(Sha256::digest(base.as_bytes()));
    let reserved = HASH_LEN + suffix.len() + 2;
    if reserved >= max_len {
        // Not even the suffix fits, fall back to a digest of the whole name.
        return hex::encode(Sha256::digest(name.as_bytes()))
            .chars()
            .take(max_len)
            .collect();
    }
    let budget = max_len - reserved;
    let prefix: String = base
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= budget)
        .map(|(_, c)| c)
        .collect();
    format!(
        "{}-{}-{}",
        prefix.trim_end_matches('-'),
        &digest[..HASH_LEN],
        suffix
    )
}
