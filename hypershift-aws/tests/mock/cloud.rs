use super::{INFRA_NAME, SUBNET_ID, VPC_ID, ZONE};
use async_trait::async_trait;
use hypershift_aws::cloud::{
    normalize_record_name, AddressClient, AvailabilityZone, BucketClient, CloudConnector,
    CloudProvider, CnameRecord, DnsClient, ElasticIp, IngressRule, Listener, ListenerClient,
    LoadBalancer, LoadBalancerClient, ObjectPage, Protocol, RecordChange, SecurityGroup,
    SecurityGroupClient, SubnetPlacement, Tag, TargetGroup, TargetGroupClient, TargetGroupSpec,
};
use hypershift_aws::error::{Error, Result};
use hypershift_utils::aws::AwsCredentials;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Objects per `list_objects` page, small so that removal has to follow continuation tokens.
const OBJECT_PAGE_SIZE: usize = 2;

#[derive(Clone, Debug)]
pub(crate) struct MockAddress {
    pub(crate) name: Option<String>,
    pub(crate) address: ElasticIp,
    pub(crate) tags: Vec<Tag>,
}

#[derive(Clone, Debug)]
pub(crate) struct MockLoadBalancer {
    pub(crate) name: String,
    pub(crate) load_balancer: LoadBalancer,
    pub(crate) placement: SubnetPlacement,
    pub(crate) tags: Vec<Tag>,
}

#[derive(Clone, Debug)]
pub(crate) struct MockTargetGroup {
    pub(crate) arn: String,
    pub(crate) spec: TargetGroupSpec,
    pub(crate) targets: Vec<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct MockListener {
    pub(crate) load_balancer_arn: String,
    pub(crate) listener: Listener,
    pub(crate) protocol: Protocol,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MockBucket {
    pub(crate) tags: Vec<Tag>,
    pub(crate) objects: BTreeMap<String, Vec<u8>>,
}

/// Everything the mock cloud holds. Tests inspect and seed it through [`MockCloud::state`].
#[derive(Debug, Default)]
pub(crate) struct CloudState {
    pub(crate) addresses: Vec<MockAddress>,
    pub(crate) load_balancers: Vec<MockLoadBalancer>,
    pub(crate) target_groups: Vec<MockTargetGroup>,
    pub(crate) listeners: Vec<MockListener>,
    /// Keyed by zone and normalized name. Names are stored the way Route 53 returns them.
    pub(crate) records: BTreeMap<(String, String), CnameRecord>,
    /// Every record change in the order it was submitted.
    pub(crate) changes: Vec<(RecordChange, CnameRecord)>,
    pub(crate) buckets: BTreeMap<String, MockBucket>,
    /// Keyed by the group's `Name` tag.
    pub(crate) security_groups: BTreeMap<String, SecurityGroup>,
    pub(crate) connected_region: Option<String>,
    next_id: u32,
}

impl CloudState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    pub(crate) fn load_balancer(&self, name: &str) -> Option<&MockLoadBalancer> {
        self.load_balancers.iter().find(|lb| lb.name == name)
    }

    pub(crate) fn target_group(&self, name: &str) -> Option<&MockTargetGroup> {
        self.target_groups.iter().find(|tg| tg.spec.name == name)
    }

    pub(crate) fn address(&self, name: &str) -> Option<&MockAddress> {
        self.addresses
            .iter()
            .find(|address| address.name.as_deref() == Some(name))
    }

    pub(crate) fn record(&self, zone_id: &str, name: &str) -> Option<&CnameRecord> {
        self.records
            .get(&(zone_id.to_string(), normalize_record_name(name)))
    }

    pub(crate) fn listeners_of(&self, load_balancer_arn: &str) -> Vec<&MockListener> {
        self.listeners
            .iter()
            .filter(|listener| listener.load_balancer_arn == load_balancer_arn)
            .collect()
    }

    fn set_attachment(&mut self, allocation_id: &str, interface: Option<String>) {
        if let Some(address) = self
            .addresses
            .iter_mut()
            .find(|address| address.address.allocation_id == allocation_id)
        {
            address.address.network_interface_id = interface;
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<CloudState>,
    calls: Mutex<BTreeMap<String, usize>>,
    failing: Mutex<Option<String>>,
}

/// An in-memory cloud that behaves like the AWS APIs closely enough for the reconcilers: duplicate
/// names are rejected, attached addresses cannot be released, target groups in use cannot be
/// deleted and buckets must be empty before deletion.
///
/// Clones share state, so a clone handed out by [`CloudConnector::connect`] can be inspected
/// through the original.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockCloud {
    inner: Arc<Inner>,
}

fn reject<T>(operation: &str, message: String) -> Result<T> {
    Err(Error::AwsRequest {
        operation: operation.to_string(),
        source: message.into(),
    })
}

impl MockCloud {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A cloud containing what the management cluster brings along: its external API load
    /// balancer, spread over `zones`, and its worker security group without node-port rules.
    pub(crate) fn with_management_network(zones: &[(&str, &str)]) -> Self {
        let cloud = Self::new();
        {
            let mut state = cloud.state();
            let arn = state.id("arn:aws:elasticloadbalancing:lb/mgmt");
            state.load_balancers.push(MockLoadBalancer {
                name: format!("{}-ext", INFRA_NAME),
                load_balancer: LoadBalancer {
                    arn,
                    dns_name: format!("{}-ext.elb.us-east-2.amazonaws.com", INFRA_NAME),
                    vpc_id: Some(VPC_ID.to_string()),
                    availability_zones: zones
                        .iter()
                        .map(|(zone_name, subnet_id)| AvailabilityZone {
                            zone_name: zone_name.to_string(),
                            subnet_id: subnet_id.to_string(),
                        })
                        .collect(),
                },
                placement: SubnetPlacement {
                    subnet_id: zones
                        .first()
                        .map(|(_, subnet_id)| subnet_id.to_string())
                        .unwrap_or_default(),
                    allocation_id: None,
                },
                tags: Vec::new(),
            });
            state.security_groups.insert(
                format!("{}-worker-sg", INFRA_NAME),
                SecurityGroup {
                    group_id: "sg-0worker".to_string(),
                    ingress: Vec::new(),
                },
            );
        }
        cloud
    }

    /// The management network with a single zone.
    pub(crate) fn standard() -> Self {
        Self::with_management_network(&[(ZONE, SUBNET_ID)])
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, CloudState> {
        self.inner.state.lock().unwrap()
    }

    /// How many times `operation` (named after the AWS API action) was called.
    pub(crate) fn calls(&self, operation: &str) -> usize {
        self.inner
            .calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    /// Make every future call of `operation` fail.
    pub(crate) fn fail_on(&self, operation: &str) {
        *self.inner.failing.lock().unwrap() = Some(operation.to_string());
    }

    pub(crate) fn reset_calls(&self) {
        self.inner.calls.lock().unwrap().clear();
    }

    fn call(&self, operation: &str) -> Result<MutexGuard<'_, CloudState>> {
        *self
            .inner
            .calls
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default() += 1;
        if self.inner.failing.lock().unwrap().as_deref() == Some(operation) {
            return reject(operation, "injected failure".to_string());
        }
        Ok(self.state())
    }
}

#[async_trait]
impl AddressClient for MockCloud {
    async fn find_address(&self, name: &str) -> Result<Option<ElasticIp>> {
        let state = self.call("DescribeAddresses")?;
        Ok(state.address(name).map(|address| address.address.clone()))
    }

    async fn allocate_address(&self) -> Result<ElasticIp> {
        let mut state = self.call("AllocateAddress")?;
        let allocation_id = state.id("eipalloc");
        let address = ElasticIp {
            allocation_id,
            public_ip: format!("203.0.113.{}", state.next_id),
            network_interface_id: None,
        };
        state.addresses.push(MockAddress {
            name: None,
            address: address.clone(),
            tags: Vec::new(),
        });
        Ok(address)
    }

    async fn tag_address(&self, allocation_id: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.call("CreateTags")?;
        match state
            .addresses
            .iter_mut()
            .find(|address| address.address.allocation_id == allocation_id)
        {
            Some(address) => {
                for tag in tags {
                    if tag.key == "Name" {
                        address.name = Some(tag.value.clone());
                    }
                    address.tags.push(tag.clone());
                }
                Ok(())
            }
            None => reject("CreateTags", format!("no address '{}'", allocation_id)),
        }
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        let mut state = self.call("ReleaseAddress")?;
        let index = match state
            .addresses
            .iter()
            .position(|address| address.address.allocation_id == allocation_id)
        {
            Some(index) => index,
            None => return reject("ReleaseAddress", format!("no address '{}'", allocation_id)),
        };
        if state.addresses[index].address.network_interface_id.is_some() {
            return reject(
                "ReleaseAddress",
                format!("address '{}' is in use", allocation_id),
            );
        }
        state.addresses.remove(index);
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerClient for MockCloud {
    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let state = self.call("DescribeLoadBalancers")?;
        Ok(state.load_balancer(name).map(|lb| lb.load_balancer.clone()))
    }

    async fn create_load_balancer(
        &self,
        name: &str,
        placement: &SubnetPlacement,
        tags: &[Tag],
    ) -> Result<LoadBalancer> {
        let mut state = self.call("CreateLoadBalancer")?;
        if state.load_balancer(name).is_some() {
            return reject(
                "CreateLoadBalancer",
                format!("load balancer '{}' already exists", name),
            );
        }
        let arn = state.id(&format!("arn:aws:elasticloadbalancing:lb/{}", name));
        let load_balancer = LoadBalancer {
            arn: arn.clone(),
            dns_name: format!("{}-{}.elb.us-east-2.amazonaws.com", name, state.next_id),
            vpc_id: Some(VPC_ID.to_string()),
            availability_zones: vec![AvailabilityZone {
                zone_name: ZONE.to_string(),
                subnet_id: placement.subnet_id.clone(),
            }],
        };
        if let Some(allocation_id) = &placement.allocation_id {
            state.set_attachment(allocation_id, Some(format!("eni-{}", arn)));
        }
        state.load_balancers.push(MockLoadBalancer {
            name: name.to_string(),
            load_balancer: load_balancer.clone(),
            placement: placement.clone(),
            tags: tags.to_vec(),
        });
        Ok(load_balancer)
    }

    async fn delete_load_balancer(&self, arn: &str) -> Result<()> {
        let mut state = self.call("DeleteLoadBalancer")?;
        let index = match state
            .load_balancers
            .iter()
            .position(|lb| lb.load_balancer.arn == arn)
        {
            Some(index) => index,
            None => return reject("DeleteLoadBalancer", format!("no load balancer '{}'", arn)),
        };
        let removed = state.load_balancers.remove(index);
        state
            .listeners
            .retain(|listener| listener.load_balancer_arn != arn);
        if let Some(allocation_id) = &removed.placement.allocation_id {
            state.set_attachment(allocation_id, None);
        }
        Ok(())
    }
}

#[async_trait]
impl TargetGroupClient for MockCloud {
    async fn find_target_group(&self, name: &str) -> Result<Option<TargetGroup>> {
        let state = self.call("DescribeTargetGroups")?;
        Ok(state.target_group(name).map(|tg| TargetGroup {
            arn: tg.arn.clone(),
            port: tg.spec.port,
        }))
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec) -> Result<TargetGroup> {
        let mut state = self.call("CreateTargetGroup")?;
        if state.target_group(&spec.name).is_some() {
            return reject(
                "CreateTargetGroup",
                format!("target group '{}' already exists", spec.name),
            );
        }
        let arn = state.id(&format!("arn:aws:elasticloadbalancing:tg/{}", spec.name));
        state.target_groups.push(MockTargetGroup {
            arn: arn.clone(),
            spec: spec.clone(),
            targets: Vec::new(),
        });
        Ok(TargetGroup {
            arn,
            port: spec.port,
        })
    }

    async fn delete_target_group(&self, arn: &str) -> Result<()> {
        let mut state = self.call("DeleteTargetGroup")?;
        if state
            .listeners
            .iter()
            .any(|listener| listener.listener.target_group_arn.as_deref() == Some(arn))
        {
            return reject(
                "DeleteTargetGroup",
                format!("target group '{}' is in use by a listener", arn),
            );
        }
        let before = state.target_groups.len();
        state.target_groups.retain(|tg| tg.arn != arn);
        if state.target_groups.len() == before {
            return reject("DeleteTargetGroup", format!("no target group '{}'", arn));
        }
        Ok(())
    }

    async fn registered_targets(&self, target_group_arn: &str) -> Result<Vec<String>> {
        let state = self.call("DescribeTargetHealth")?;
        match state.target_groups.iter().find(|tg| tg.arn == target_group_arn) {
            Some(tg) => Ok(tg.targets.clone()),
            None => reject(
                "DescribeTargetHealth",
                format!("no target group '{}'", target_group_arn),
            ),
        }
    }

    async fn register_target(&self, target_group_arn: &str, target_id: &str) -> Result<()> {
        let mut state = self.call("RegisterTargets")?;
        match state
            .target_groups
            .iter_mut()
            .find(|tg| tg.arn == target_group_arn)
        {
            Some(tg) => {
                if !tg.targets.iter().any(|target| target == target_id) {
                    tg.targets.push(target_id.to_string());
                }
                Ok(())
            }
            None => reject(
                "RegisterTargets",
                format!("no target group '{}'", target_group_arn),
            ),
        }
    }

    async fn deregister_target(&self, target_group_arn: &str, target_id: &str) -> Result<()> {
        let mut state = self.call("DeregisterTargets")?;
        match state
            .target_groups
            .iter_mut()
            .find(|tg| tg.arn == target_group_arn)
        {
            Some(tg) => {
                tg.targets.retain(|target| target != target_id);
                Ok(())
            }
            None => reject(
                "DeregisterTargets",
                format!("no target group '{}'", target_group_arn),
            ),
        }
    }
}

#[async_trait]
impl ListenerClient for MockCloud {
    async fn listeners(&self, load_balancer_arn: &str) -> Result<Vec<Listener>> {
        let state = self.call("DescribeListeners")?;
        Ok(state
            .listeners_of(load_balancer_arn)
            .into_iter()
            .map(|listener| listener.listener.clone())
            .collect())
    }

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        port: i32,
        protocol: Protocol,
    ) -> Result<Listener> {
        let mut state = self.call("CreateListener")?;
        if state
            .listeners_of(load_balancer_arn)
            .iter()
            .any(|listener| listener.listener.port == port)
        {
            return reject(
                "CreateListener",
                format!("a listener for port {} already exists", port),
            );
        }
        let listener = Listener {
            arn: state.id("arn:aws:elasticloadbalancing:listener"),
            port,
            target_group_arn: Some(target_group_arn.to_string()),
        };
        state.listeners.push(MockListener {
            load_balancer_arn: load_balancer_arn.to_string(),
            listener: listener.clone(),
            protocol,
        });
        Ok(listener)
    }

    async fn delete_listener(&self, arn: &str) -> Result<()> {
        let mut state = self.call("DeleteListener")?;
        state.listeners.retain(|listener| listener.listener.arn != arn);
        Ok(())
    }
}

/// The form Route 53 returns a name in.
fn route53_name(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.').replace('*', "\\052"))
}

#[async_trait]
impl DnsClient for MockCloud {
    async fn find_cname(&self, zone_id: &str, name: &str) -> Result<Option<CnameRecord>> {
        let state = self.call("ListResourceRecordSets")?;
        Ok(state.record(zone_id, name).cloned())
    }

    async fn change_cname(
        &self,
        zone_id: &str,
        change: RecordChange,
        record: &CnameRecord,
    ) -> Result<()> {
        let mut state = self.call("ChangeResourceRecordSets")?;
        state.changes.push((change, record.clone()));
        let key = (zone_id.to_string(), normalize_record_name(&record.name));
        match change {
            RecordChange::Upsert => {
                state.records.insert(
                    key,
                    CnameRecord {
                        name: route53_name(&record.name),
                        value: record.value.clone(),
                        ttl: record.ttl,
                    },
                );
                Ok(())
            }
            // A deletion must match the existing record exactly.
            RecordChange::Delete => {
                let matches = state.records.get(&key).map_or(false, |existing| {
                    existing.value == record.value && existing.ttl == record.ttl
                });
                if !matches {
                    return reject(
                        "ChangeResourceRecordSets",
                        format!("no matching record for '{}'", record.name),
                    );
                }
                state.records.remove(&key);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BucketClient for MockCloud {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let state = self.call("HeadBucket")?;
        Ok(state.buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.call("CreateBucket")?;
        if state.buckets.contains_key(bucket) {
            return reject("CreateBucket", format!("bucket '{}' already exists", bucket));
        }
        state.buckets.insert(bucket.to_string(), MockBucket::default());
        Ok(())
    }

    async fn tag_bucket(&self, bucket: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.call("PutBucketTagging")?;
        match state.buckets.get_mut(bucket) {
            Some(mock) => {
                mock.tags = tags.to_vec();
                Ok(())
            }
            None => reject("PutBucketTagging", format!("no bucket '{}'", bucket)),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut state = self.call("PutObject")?;
        match state.buckets.get_mut(bucket) {
            Some(mock) => {
                mock.objects.insert(key.to_string(), body);
                Ok(())
            }
            None => reject("PutObject", format!("no bucket '{}'", bucket)),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage> {
        let state = self.call("ListObjectsV2")?;
        let mock = match state.buckets.get(bucket) {
            Some(mock) => mock,
            None => return reject("ListObjectsV2", format!("no bucket '{}'", bucket)),
        };
        let remaining: Vec<&String> = mock
            .objects
            .keys()
            .filter(|key| match &continuation_token {
                Some(after) => key.as_str() > after.as_str(),
                None => true,
            })
            .collect();
        let keys: Vec<String> = remaining
            .iter()
            .take(OBJECT_PAGE_SIZE)
            .map(|key| key.to_string())
            .collect();
        let continuation_token = if remaining.len() > OBJECT_PAGE_SIZE {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ObjectPage {
            keys,
            continuation_token,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.call("DeleteObject")?;
        if let Some(mock) = state.buckets.get_mut(bucket) {
            mock.objects.remove(key);
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.call("DeleteBucket")?;
        let empty = match state.buckets.get(bucket) {
            Some(mock) => mock.objects.is_empty(),
            None => return reject("DeleteBucket", format!("no bucket '{}'", bucket)),
        };
        if !empty {
            return reject("DeleteBucket", format!("bucket '{}' is not empty", bucket));
        }
        state.buckets.remove(bucket);
        Ok(())
    }
}

#[async_trait]
impl SecurityGroupClient for MockCloud {
    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let state = self.call("DescribeSecurityGroups")?;
        Ok(state.security_groups.get(name).cloned())
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<()> {
        let mut state = self.call("AuthorizeSecurityGroupIngress")?;
        match state
            .security_groups
            .values_mut()
            .find(|group| group.group_id == group_id)
        {
            Some(group) if group.ingress.contains(rule) => reject(
                "AuthorizeSecurityGroupIngress",
                "the rule already exists".to_string(),
            ),
            Some(group) => {
                group.ingress.push(rule.clone());
                Ok(())
            }
            None => reject(
                "AuthorizeSecurityGroupIngress",
                format!("no security group '{}'", group_id),
            ),
        }
    }
}

#[async_trait]
impl CloudConnector for MockCloud {
    async fn connect(
        &self,
        _credentials: &AwsCredentials,
        region: &str,
    ) -> Result<Box<dyn CloudProvider>> {
        self.state().connected_region = Some(region.to_string());
        Ok(Box::new(self.clone()))
    }
}
