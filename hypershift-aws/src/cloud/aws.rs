use super::{
    AddressClient, AvailabilityZone, BucketClient, CloudConnector, CloudProvider, CnameRecord,
    DnsClient, ElasticIp, IngressRule, Listener, ListenerClient, LoadBalancer, LoadBalancerClient,
    ObjectPage, Protocol, RecordChange, SecurityGroup, SecurityGroupClient, SubnetPlacement, Tag,
    TargetGroup, TargetGroupClient, TargetGroupSpec, TargetType,
};
use crate::cloud::normalize_record_name;
use crate::error::{self, AwsResultExt, Result};
use async_trait::async_trait;
use aws_sdk_ec2::model::{DomainType, Filter};
use aws_sdk_elasticloadbalancingv2::error::{
    DescribeLoadBalancersError, DescribeLoadBalancersErrorKind, DescribeTargetGroupsError,
    DescribeTargetGroupsErrorKind,
};
use aws_sdk_elasticloadbalancingv2::model::{
    Action, ActionTypeEnum, LoadBalancerSchemeEnum, LoadBalancerTypeEnum, ProtocolEnum,
    SubnetMapping, TargetDescription, TargetTypeEnum,
};
use aws_sdk_elasticloadbalancingv2::types::SdkError;
use aws_sdk_route53::model::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_s3::error::{HeadBucketError, HeadBucketErrorKind};
use aws_sdk_s3::model::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl,
    Tagging,
};
use aws_sdk_s3::types::ByteStream;
use aws_types::SdkConfig;
use hypershift_utils::aws::{aws_config, AwsCredentials};
use log::{debug, trace};
use snafu::OptionExt;

/// The region in which buckets are created without a location constraint.
const DEFAULT_BUCKET_REGION: &str = "us-east-1";

/// Implements every cloud capability with the AWS SDK.
pub struct AwsCloud {
    region: String,
    ec2_client: aws_sdk_ec2::Client,
    elb_client: aws_sdk_elasticloadbalancingv2::Client,
    route53_client: aws_sdk_route53::Client,
    s3_client: aws_sdk_s3::Client,
}

impl AwsCloud {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            region: config
                .region()
                .map(|region| region.to_string())
                .unwrap_or_else(|| DEFAULT_BUCKET_REGION.to_string()),
            ec2_client: aws_sdk_ec2::Client::new(config),
            elb_client: aws_sdk_elasticloadbalancingv2::Client::new(config),
            route53_client: aws_sdk_route53::Client::new(config),
            s3_client: aws_sdk_s3::Client::new(config),
        }
    }
}

/// Connects to AWS with credentials discovered on the management cluster.
#[derive(Clone, Copy, Debug, Default)]
pub struct AwsConnector;

#[async_trait]
impl CloudConnector for AwsConnector {
    async fn connect(
        &self,
        credentials: &AwsCredentials,
        region: &str,
    ) -> Result<Box<dyn CloudProvider>> {
        let config = aws_config(credentials, region).await;
        Ok(Box::new(AwsCloud::new(&config)))
    }
}

fn name_filter(name: &str) -> Filter {
    Filter::builder().name("tag:Name").values(name).build()
}

fn load_balancer_not_found<T>(
    result: &std::result::Result<T, SdkError<DescribeLoadBalancersError>>,
) -> bool {
    if let Err(SdkError::ServiceError(service_error)) = result {
        if matches!(
            &service_error.err().kind,
            DescribeLoadBalancersErrorKind::LoadBalancerNotFoundException(_)
        ) {
            return true;
        }
    }
    false
}

fn target_group_not_found<T>(
    result: &std::result::Result<T, SdkError<DescribeTargetGroupsError>>,
) -> bool {
    if let Err(SdkError::ServiceError(service_error)) = result {
        if matches!(
            &service_error.err().kind,
            DescribeTargetGroupsErrorKind::TargetGroupNotFoundException(_)
        ) {
            return true;
        }
    }
    false
}

fn bucket_not_found<T>(result: &std::result::Result<T, SdkError<HeadBucketError>>) -> bool {
    if let Err(SdkError::ServiceError(service_error)) = result {
        if matches!(&service_error.err().kind, HeadBucketErrorKind::NotFound(_)) {
            return true;
        }
    }
    false
}

fn elb_protocol(protocol: Protocol) -> ProtocolEnum {
    match protocol {
        Protocol::Tcp => ProtocolEnum::Tcp,
        Protocol::Udp => ProtocolEnum::Udp,
    }
}

fn elb_load_balancer(
    operation: &str,
    lb: &aws_sdk_elasticloadbalancingv2::model::LoadBalancer,
) -> Result<LoadBalancer> {
    Ok(LoadBalancer {
        arn: lb
            .load_balancer_arn()
            .context(error::AwsResponseSnafu {
                operation,
                what: "LoadBalancerArn",
            })?
            .to_string(),
        dns_name: lb
            .dns_name()
            .context(error::AwsResponseSnafu {
                operation,
                what: "DNSName",
            })?
            .to_string(),
        vpc_id: lb.vpc_id().map(str::to_string),
        availability_zones: lb
            .availability_zones()
            .unwrap_or_default()
            .iter()
            .filter_map(|zone| {
                Some(AvailabilityZone {
                    zone_name: zone.zone_name()?.to_string(),
                    subnet_id: zone.subnet_id()?.to_string(),
                })
            })
            .collect(),
    })
}

fn elb_target_group(
    operation: &str,
    tg: &aws_sdk_elasticloadbalancingv2::model::TargetGroup,
) -> Result<TargetGroup> {
    Ok(TargetGroup {
        arn: tg
            .target_group_arn()
            .context(error::AwsResponseSnafu {
                operation,
                what: "TargetGroupArn",
            })?
            .to_string(),
        port: tg.port().unwrap_or_default(),
    })
}

#[async_trait]
impl AddressClient for AwsCloud {
    async fn find_address(&self, name: &str) -> Result<Option<ElasticIp>> {
        let output = self
            .ec2_client
            .describe_addresses()
            .filters(name_filter(name))
            .send()
            .await
            .aws_context("DescribeAddresses")?;
        Ok(output
            .addresses()
            .unwrap_or_default()
            .first()
            .map(|address| ElasticIp {
                allocation_id: address.allocation_id().unwrap_or_default().to_string(),
                public_ip: address.public_ip().unwrap_or_default().to_string(),
                network_interface_id: address
                    .network_interface_id()
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
            }))
    }

    async fn allocate_address(&self) -> Result<ElasticIp> {
        let output = self
            .ec2_client
            .allocate_address()
            .domain(DomainType::Vpc)
            .send()
            .await
            .aws_context("AllocateAddress")?;
        Ok(ElasticIp {
            allocation_id: output
                .allocation_id()
                .context(error::AwsResponseSnafu {
                    operation: "AllocateAddress",
                    what: "AllocationId",
                })?
                .to_string(),
            public_ip: output.public_ip().unwrap_or_default().to_string(),
            network_interface_id: None,
        })
    }

    async fn tag_address(&self, allocation_id: &str, tags: &[Tag]) -> Result<()> {
        let mut request = self.ec2_client.create_tags().resources(allocation_id);
        for tag in tags {
            request = request.tags(
                aws_sdk_ec2::model::Tag::builder()
                    .key(&tag.key)
                    .value(&tag.value)
                    .build(),
            );
        }
        request.send().await.aws_context("CreateTags")?;
        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.ec2_client
            .release_address()
            .allocation_id(allocation_id)
            .send()
            .await
            .aws_context("ReleaseAddress")?;
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerClient for AwsCloud {
    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let result = self
            .elb_client
            .describe_load_balancers()
            .names(name)
            .send()
            .await;
        if load_balancer_not_found(&result) {
            trace!("Load balancer '{}' does not exist", name);
            return Ok(None);
        }
        let output = result.aws_context("DescribeLoadBalancers")?;
        output
            .load_balancers()
            .unwrap_or_default()
            .first()
            .map(|lb| elb_load_balancer("DescribeLoadBalancers", lb))
            .transpose()
    }

    async fn create_load_balancer(
        &self,
        name: &str,
        placement: &SubnetPlacement,
        tags: &[Tag],
    ) -> Result<LoadBalancer> {
        let mut request = self
            .elb_client
            .create_load_balancer()
            .name(name)
            .scheme(LoadBalancerSchemeEnum::InternetFacing)
            .r#type(LoadBalancerTypeEnum::Network);
        for tag in tags {
            request = request.tags(
                aws_sdk_elasticloadbalancingv2::model::Tag::builder()
                    .key(&tag.key)
                    .value(&tag.value)
                    .build(),
            );
        }
        request = match &placement.allocation_id {
            Some(allocation_id) => request.subnet_mappings(
                SubnetMapping::builder()
                    .subnet_id(&placement.subnet_id)
                    .allocation_id(allocation_id)
                    .build(),
            ),
            None => request.subnets(&placement.subnet_id),
        };
        let output = request.send().await.aws_context("CreateLoadBalancer")?;
        let lb = output
            .load_balancers()
            .unwrap_or_default()
            .first()
            .context(error::AwsResponseSnafu {
                operation: "CreateLoadBalancer",
                what: "LoadBalancers",
            })?;
        elb_load_balancer("CreateLoadBalancer", lb)
    }

    async fn delete_load_balancer(&self, arn: &str) -> Result<()> {
        self.elb_client
            .delete_load_balancer()
            .load_balancer_arn(arn)
            .send()
            .await
            .aws_context("DeleteLoadBalancer")?;
        Ok(())
    }
}

#[async_trait]
impl TargetGroupClient for AwsCloud {
    async fn find_target_group(&self, name: &str) -> Result<Option<TargetGroup>> {
        let result = self
            .elb_client
            .describe_target_groups()
            .names(name)
            .send()
            .await;
        if target_group_not_found(&result) {
            trace!("Target group '{}' does not exist", name);
            return Ok(None);
        }
        let output = result.aws_context("DescribeTargetGroups")?;
        output
            .target_groups()
            .unwrap_or_default()
            .first()
            .map(|tg| elb_target_group("DescribeTargetGroups", tg))
            .transpose()
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec) -> Result<TargetGroup> {
        let target_type = match spec.target_type {
            TargetType::Ip => TargetTypeEnum::Ip,
            TargetType::Instance => TargetTypeEnum::Instance,
        };
        let output = self
            .elb_client
            .create_target_group()
            .name(&spec.name)
            .port(spec.port)
            .vpc_id(&spec.vpc_id)
            .protocol(elb_protocol(spec.protocol))
            .target_type(target_type)
            .health_check_protocol(ProtocolEnum::Tcp)
            .set_health_check_port(spec.health_check_port.map(|port| port.to_string()))
            .health_check_enabled(true)
            .health_check_interval_seconds(crate::constants::HEALTH_CHECK_INTERVAL_SECONDS)
            .health_check_timeout_seconds(crate::constants::HEALTH_CHECK_TIMEOUT_SECONDS)
            .healthy_threshold_count(crate::constants::HEALTH_CHECK_THRESHOLD)
            .unhealthy_threshold_count(crate::constants::HEALTH_CHECK_THRESHOLD)
            .send()
            .await
            .aws_context("CreateTargetGroup")?;
        let tg = output
            .target_groups()
            .unwrap_or_default()
            .first()
            .context(error::AwsResponseSnafu {
                operation: "CreateTargetGroup",
                what: "TargetGroups",
            })?;
        elb_target_group("CreateTargetGroup", tg)
    }

    async fn delete_target_group(&self, arn: &str) -> Result<()> {
        self.elb_client
            .delete_target_group()
            .target_group_arn(arn)
            .send()
            .await
            .aws_context("DeleteTargetGroup")?;
        Ok(())
    }

    async fn registered_targets(&self, target_group_arn: &str) -> Result<Vec<String>> {
        let output = self
            .elb_client
            .describe_target_health()
            .target_group_arn(target_group_arn)
            .send()
            .await
            .aws_context("DescribeTargetHealth")?;
        Ok(output
            .target_health_descriptions()
            .unwrap_or_default()
            .iter()
            .filter_map(|description| description.target()?.id())
            .map(str::to_string)
            .collect())
    }

    async fn register_target(&self, target_group_arn: &str, target_id: &str) -> Result<()> {
        self.elb_client
            .register_targets()
            .target_group_arn(target_group_arn)
            .targets(TargetDescription::builder().id(target_id).build())
            .send()
            .await
            .aws_context("RegisterTargets")?;
        Ok(())
    }

    async fn deregister_target(&self, target_group_arn: &str, target_id: &str) -> Result<()> {
        self.elb_client
            .deregister_targets()
            .target_group_arn(target_group_arn)
            .targets(TargetDescription::builder().id(target_id).build())
            .send()
            .await
            .aws_context("DeregisterTargets")?;
        Ok(())
    }
}

#[async_trait]
impl ListenerClient for AwsCloud {
    async fn listeners(&self, load_balancer_arn: &str) -> Result<Vec<Listener>> {
        let output = self
            .elb_client
            .describe_listeners()
            .load_balancer_arn(load_balancer_arn)
            .send()
            .await
            .aws_context("DescribeListeners")?;
        Ok(output
            .listeners()
            .unwrap_or_default()
            .iter()
            .filter_map(|listener| {
                Some(Listener {
                    arn: listener.listener_arn()?.to_string(),
                    port: listener.port()?,
                    target_group_arn: listener
                        .default_actions()
                        .unwrap_or_default()
                        .first()
                        .and_then(|action| action.target_group_arn())
                        .map(str::to_string),
                })
            })
            .collect())
    }

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        port: i32,
        protocol: Protocol,
    ) -> Result<Listener> {
        let output = self
            .elb_client
            .create_listener()
            .load_balancer_arn(load_balancer_arn)
            .port(port)
            .protocol(elb_protocol(protocol))
            .default_actions(
                Action::builder()
                    .r#type(ActionTypeEnum::Forward)
                    .target_group_arn(target_group_arn)
                    .build(),
            )
            .send()
            .await
            .aws_context("CreateListener")?;
        let arn = output
            .listeners()
            .unwrap_or_default()
            .first()
            .and_then(|listener| listener.listener_arn())
            .context(error::AwsResponseSnafu {
                operation: "CreateListener",
                what: "ListenerArn",
            })?;
        Ok(Listener {
            arn: arn.to_string(),
            port,
            target_group_arn: Some(target_group_arn.to_string()),
        })
    }

    async fn delete_listener(&self, arn: &str) -> Result<()> {
        self.elb_client
            .delete_listener()
            .listener_arn(arn)
            .send()
            .await
            .aws_context("DeleteListener")?;
        Ok(())
    }
}

#[async_trait]
impl DnsClient for AwsCloud {
    async fn find_cname(&self, zone_id: &str, name: &str) -> Result<Option<CnameRecord>> {
        let wanted = normalize_record_name(name);
        // Record sets are listed in order, so the record (if it exists) is the first one returned
        // when starting the listing at its name.
        let output = self
            .route53_client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .start_record_name(name)
            .start_record_type(RrType::Cname)
            .send()
            .await
            .aws_context("ListResourceRecordSets")?;
        let record = output
            .resource_record_sets()
            .unwrap_or_default()
            .iter()
            .filter(|record| record.r#type() == Some(&RrType::Cname))
            .find(|record| {
                record
                    .name()
                    .map(|record_name| normalize_record_name(record_name) == wanted)
                    .unwrap_or_default()
            });
        Ok(record.and_then(|record| {
            let value = record.resource_records()?.first()?.value()?;
            Some(CnameRecord {
                name: record.name()?.to_string(),
                value: value.to_string(),
                ttl: record.ttl().unwrap_or(crate::constants::DNS_RECORD_TTL),
            })
        }))
    }

    async fn change_cname(
        &self,
        zone_id: &str,
        change: RecordChange,
        record: &CnameRecord,
    ) -> Result<()> {
        let action = match change {
            RecordChange::Upsert => ChangeAction::Upsert,
            RecordChange::Delete => ChangeAction::Delete,
        };
        let record_set = ResourceRecordSet::builder()
            .name(&record.name)
            .r#type(RrType::Cname)
            .ttl(record.ttl)
            .resource_records(ResourceRecord::builder().value(&record.value).build())
            .build();
        let output = self
            .route53_client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(
                ChangeBatch::builder()
                    .changes(
                        Change::builder()
                            .action(action)
                            .resource_record_set(record_set)
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .aws_context("ChangeResourceRecordSets")?;
        debug!(
            "Record change for '{}' submitted: {:?}",
            record.name,
            output.change_info().and_then(|info| info.id())
        );
        Ok(())
    }
}

#[async_trait]
impl BucketClient for AwsCloud {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let result = self.s3_client.head_bucket().bucket(bucket).send().await;
        if bucket_not_found(&result) {
            return Ok(false);
        }
        result.aws_context("HeadBucket")?;
        Ok(true)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self
            .s3_client
            .create_bucket()
            .bucket(bucket)
            .acl(BucketCannedAcl::PublicRead);
        if self.region != DEFAULT_BUCKET_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.aws_context("CreateBucket")?;
        Ok(())
    }

    async fn tag_bucket(&self, bucket: &str, tags: &[Tag]) -> Result<()> {
        let mut tagging = Tagging::builder();
        for tag in tags {
            tagging = tagging.tag_set(
                aws_sdk_s3::model::Tag::builder()
                    .key(&tag.key)
                    .value(&tag.value)
                    .build(),
            );
        }
        self.s3_client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging.build())
            .send()
            .await
            .aws_context("PutBucketTagging")?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(body))
            .send()
            .await
            .aws_context("PutObject")?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage> {
        let output = self
            .s3_client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .aws_context("ListObjectsV2")?;
        Ok(ObjectPage {
            keys: output
                .contents()
                .unwrap_or_default()
                .iter()
                .filter_map(|object| object.key())
                .map(str::to_string)
                .collect(),
            continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.s3_client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .aws_context("DeleteObject")?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.s3_client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .aws_context("DeleteBucket")?;
        Ok(())
    }
}

#[async_trait]
impl SecurityGroupClient for AwsCloud {
    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let output = self
            .ec2_client
            .describe_security_groups()
            .filters(name_filter(name))
            .send()
            .await
            .aws_context("DescribeSecurityGroups")?;
        let group = match output.security_groups().unwrap_or_default().first() {
            Some(group) => group,
            None => return Ok(None),
        };
        let mut ingress = Vec::new();
        for permission in group.ip_permissions().unwrap_or_default() {
            let protocol = match permission.ip_protocol() {
                Some("tcp") => Protocol::Tcp,
                Some("udp") => Protocol::Udp,
                _ => continue,
            };
            for range in permission.ip_ranges().unwrap_or_default() {
                if let Some(cidr) = range.cidr_ip() {
                    ingress.push(IngressRule {
                        protocol,
                        from_port: permission.from_port().unwrap_or_default(),
                        to_port: permission.to_port().unwrap_or_default(),
                        cidr: cidr.to_string(),
                    });
                }
            }
        }
        Ok(Some(SecurityGroup {
            group_id: group
                .group_id()
                .context(error::AwsResponseSnafu {
                    operation: "DescribeSecurityGroups",
                    what: "GroupId",
                })?
                .to_string(),
            ingress,
        }))
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<()> {
        self.ec2_client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_protocol(rule.protocol.ip_protocol())
            .from_port(rule.from_port)
            .to_port(rule.to_port)
            .cidr_ip(&rule.cidr)
            .send()
            .await
            .aws_context("AuthorizeSecurityGroupIngress")?;
        Ok(())
    }
}
