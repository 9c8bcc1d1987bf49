//! The parameters every toolkit step renders the hosted control plane from.

use crate::error::{self, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::fmt::{Debug, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const NETWORK_TYPE: &str = "OpenShiftSDN";
pub const CLOUD_PROVIDER: &str = "AWS";
pub const ROUTER_SERVICE_TYPE: &str = "NodePort";
pub const ETCD_CLIENT_NAME: &str = "etcd-client";

const IMAGE_REGISTRY_SECRET_BYTES: usize = 64;
const PASSWORD_GROUPS: usize = 4;
const PASSWORD_GROUP_LEN: usize = 5;

/// Written as `cluster.yaml` for the toolkit. The field names are the toolkit's.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterParams {
    pub namespace: String,
    #[serde(rename = "externalAPIDNSName")]
    pub external_api_dns_name: String,
    #[serde(rename = "externalAPIPort")]
    pub external_api_port: i32,
    #[serde(rename = "externalAPIAddress")]
    pub external_api_address: String,
    #[serde(rename = "externalVPNDNSName")]
    pub external_vpn_dns_name: String,
    #[serde(rename = "externalVPNPort")]
    pub external_vpn_port: i32,
    #[serde(rename = "externalOauthDNSName")]
    pub external_oauth_dns_name: String,
    pub external_oauth_port: i32,
    #[serde(rename = "apiNodePort")]
    pub api_node_port: i32,
    pub oauth_node_port: i32,
    #[serde(rename = "openVPNNodePort")]
    pub vpn_node_port: String,
    #[serde(rename = "serviceCIDR")]
    pub service_cidr: String,
    #[serde(rename = "podCIDR")]
    pub pod_cidr: String,
    pub release_image: String,
    pub ingress_subdomain: String,
    #[serde(rename = "openshiftAPIClusterIP")]
    pub openshift_api_cluster_ip: String,
    #[serde(rename = "imageRegistryHTTPSecret")]
    pub image_registry_http_secret: String,
    #[serde(rename = "routerNodePortHTTP")]
    pub router_node_port_http: String,
    #[serde(rename = "routerNodePortHTTPS")]
    pub router_node_port_https: String,
    pub base_domain: String,
    pub network_type: String,
    pub replicas: String,
    pub etcd_client_name: String,
    /// Filled in after PKI generation.
    #[serde(rename = "openshiftAPIServerCABundle")]
    pub openshift_api_server_ca_bundle: String,
    pub cloud_provider: String,
    #[serde(rename = "internalAPIPort")]
    pub internal_api_port: i32,
    pub router_service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_operator_image: Option<String>,
}

/// The subnet that directly follows `cidr` and has the same prefix length.
///
/// `10.128.0.0/14` becomes `10.132.0.0/14`. Host bits in `cidr` are ignored.
pub fn next_subnet(cidr: &str) -> Result<String> {
    let (address, prefix) = cidr.split_once('/').context(error::InvalidCidrSnafu {
        cidr,
        reason: "missing prefix length",
    })?;
    let address: IpAddr = address.parse().ok().context(error::InvalidCidrSnafu {
        cidr,
        reason: "invalid address",
    })?;
    let prefix: u32 = prefix.parse().ok().context(error::InvalidCidrSnafu {
        cidr,
        reason: "invalid prefix length",
    })?;
    let (value, bits) = match address {
        IpAddr::V4(v4) => (u128::from(u32::from(v4)), 32),
        IpAddr::V6(v6) => (u128::from(v6), 128),
    };
    ensure!(
        prefix <= bits,
        error::InvalidCidrSnafu {
            cidr,
            reason: format!("prefix length exceeds {}", bits),
        }
    );
    let size = 1u128
        .checked_shl(bits - prefix)
        .context(error::CidrExhaustedSnafu { cidr })?;
    let network = value & !(size - 1);
    let next = network
        .checked_add(size)
        .filter(|next| bits == 128 || *next < 1u128 << bits)
        .context(error::CidrExhaustedSnafu { cidr })?;
    let next = match address {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(next as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(next)),
    };
    Ok(format!("{}/{}", next, prefix))
}

/// A random hex secret for the image registry's HTTP signing key.
pub fn image_registry_http_secret() -> String {
    let mut bytes = [0u8; IMAGE_REGISTRY_SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// The generated `kubeadmin` password and the bcrypt hash the hosted cluster verifies it with.
#[derive(Clone)]
pub struct KubeadminPassword {
    pub password: String,
    pub hash: String,
}

impl KubeadminPassword {
    /// Generates a password of the form `xxxxx-xxxxx-xxxxx-xxxxx`.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let password = (0..PASSWORD_GROUPS)
            .map(|_| {
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(PASSWORD_GROUP_LEN)
                    .map(char::from)
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("-");
        let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST).context(error::BcryptSnafu)?;
        Ok(Self { password, hash })
    }
}

impl Debug for KubeadminPassword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeadminPassword")
            .field("password", &"<redacted>")
            .field("hash", &self.hash)
            .finish()
    }
}
