/*!

Capability traits for each kind of cloud resource the reconcilers manage. Each trait exposes the
describe, create, delete and tag primitives of one resource kind; the reconcilers compose these
into idempotent ensure and remove operations. `aws` implements every trait with the AWS SDK.

!*/

use crate::error::Result;
use async_trait::async_trait;
use hypershift_utils::aws::AwsCredentials;
use serde::Serialize;

pub mod aws;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new<S1, S2>(key: S1, value: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticIp {
    pub allocation_id: String,
    pub public_ip: String,
    /// Set while the address is attached, e.g. to a load balancer.
    pub network_interface_id: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZone {
    pub zone_name: String,
    pub subnet_id: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub arn: String,
    pub dns_name: String,
    pub vpc_id: Option<String>,
    pub availability_zones: Vec<AvailabilityZone>,
}

/// Where a new load balancer is placed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubnetPlacement {
    pub subnet_id: String,
    /// Binds a fixed public address to the load balancer node in `subnet_id`.
    pub allocation_id: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// The protocol name used by load balancer listeners and target groups.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }

    /// The protocol name used by security group rules.
    pub fn ip_protocol(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TargetType {
    Ip,
    Instance,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetGroupSpec {
    pub name: String,
    pub vpc_id: String,
    pub port: i32,
    pub protocol: Protocol,
    pub target_type: TargetType,
    /// Health is checked over TCP; this overrides the port when traffic is not TCP.
    pub health_check_port: Option<i32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetGroup {
    pub arn: String,
    pub port: i32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Listener {
    pub arn: String,
    pub port: i32,
    /// Target group of the listener's default forward action.
    pub target_group_arn: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordChange {
    Upsert,
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CnameRecord {
    pub name: String,
    pub value: String,
    pub ttl: i64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub continuation_token: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub from_port: i32,
    pub to_port: i32,
    pub cidr: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroup {
    pub group_id: String,
    pub ingress: Vec<IngressRule>,
}

#[async_trait]
pub trait AddressClient: Send + Sync {
    /// Find the address tagged `Name=name`.
    async fn find_address(&self, name: &str) -> Result<Option<ElasticIp>>;

    async fn allocate_address(&self) -> Result<ElasticIp>;

    async fn tag_address(&self, allocation_id: &str, tags: &[Tag]) -> Result<()>;

    async fn release_address(&self, allocation_id: &str) -> Result<()>;
}

#[async_trait]
pub trait LoadBalancerClient: Send + Sync {
    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>>;

    /// Create an internet-facing network load balancer.
    async fn create_load_balancer(
        &self,
        name: &str,
        placement: &SubnetPlacement,
        tags: &[Tag],
    ) -> Result<LoadBalancer>;

    async fn delete_load_balancer(&self, arn: &str) -> Result<()>;
}

#[async_trait]
pub trait TargetGroupClient: Send + Sync {
    async fn find_target_group(&self, name: &str) -> Result<Option<TargetGroup>>;

    async fn create_target_group(&self, spec: &TargetGroupSpec) -> Result<TargetGroup>;

    async fn delete_target_group(&self, arn: &str) -> Result<()>;

    /// IDs of the targets currently registered with the target group.
    async fn registered_targets(&self, target_group_arn: &str) -> Result<Vec<String>>;

    async fn register_target(&self, target_group_arn: &str, target_id: &str) -> Result<()>;

    async fn deregister_target(&self, target_group_arn: &str, target_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ListenerClient: Send + Sync {
    async fn listeners(&self, load_balancer_arn: &str) -> Result<Vec<Listener>>;

    /// Create a listener forwarding everything on `port` to `target_group_arn`.
    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        port: i32,
        protocol: Protocol,
    ) -> Result<Listener>;

    async fn delete_listener(&self, arn: &str) -> Result<()>;
}

#[async_trait]
pub trait DnsClient: Send + Sync {
    /// Read the CNAME record called `name` in `zone_id`, if there is one.
    async fn find_cname(&self, zone_id: &str, name: &str) -> Result<Option<CnameRecord>>;

    async fn change_cname(
        &self,
        zone_id: &str,
        change: RecordChange,
        record: &CnameRecord,
    ) -> Result<()>;
}

#[async_trait]
pub trait BucketClient: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create a publicly readable bucket.
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn tag_bucket(&self, bucket: &str, tags: &[Tag]) -> Result<()>;

    /// Upload a publicly readable object, replacing any existing one.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    async fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

#[async_trait]
pub trait SecurityGroupClient: Send + Sync {
    /// Find the security group tagged `Name=name`.
    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>>;

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<()>;
}

/// Every capability the orchestrators need from a cloud provider.
pub trait CloudProvider:
    AddressClient
    + LoadBalancerClient
    + TargetGroupClient
    + ListenerClient
    + DnsClient
    + BucketClient
    + SecurityGroupClient
{
}

impl<T> CloudProvider for T where
    T: AddressClient
        + LoadBalancerClient
        + TargetGroupClient
        + ListenerClient
        + DnsClient
        + BucketClient
        + SecurityGroupClient
{
}

/// Creates a [`CloudProvider`] once the region and credentials have been discovered.
#[async_trait]
pub trait CloudConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &AwsCredentials,
        region: &str,
    ) -> Result<Box<dyn CloudProvider>>;
}

/// Route 53 returns names fully qualified and with `*` escaped as `\052`.
pub fn normalize_record_name(name: &str) -> String {
    name.trim_end_matches('.')
        .replace("\\052", "*")
        .to_lowercase()
}
