use super::Reconciler;
use crate::cloud::{IngressRule, Protocol};
use crate::constants::{
    NODE_PORT_RANGE_END, NODE_PORT_RANGE_START, NODE_PORT_TCP_SOURCE, NODE_PORT_UDP_SOURCE,
};
use crate::error::{self, Result};
use log::{debug, info};
use snafu::OptionExt;

impl Reconciler<'_> {
    /// Ensure the management cluster workers accept node-port traffic: TCP from the VPC and UDP
    /// from anywhere. Rules are only ever added.
    pub async fn ensure_worker_node_port_access(&self) -> Result<()> {
        let group = self
            .cloud
            .find_security_group(&self.security_group)
            .await?
            .context(error::ResourceNotFoundSnafu {
                kind: "security group",
                name: &self.security_group,
            })?;
        let wanted = [
            node_port_rule(Protocol::Tcp, NODE_PORT_TCP_SOURCE),
            node_port_rule(Protocol::Udp, NODE_PORT_UDP_SOURCE),
        ];
        for rule in wanted.iter() {
            if group.ingress.contains(rule) {
                debug!(
                    "Security group '{}' already allows {} node ports from {}",
                    group.group_id,
                    rule.protocol.as_str(),
                    rule.cidr
                );
                continue;
            }
            info!(
                "Allowing {} node ports from {} in security group '{}'",
                rule.protocol.as_str(),
                rule.cidr,
                group.group_id
            );
            self.cloud.authorize_ingress(&group.group_id, rule).await?;
        }
        Ok(())
    }
}

fn node_port_rule(protocol: Protocol, cidr: &str) -> IngressRule {
    IngressRule {
        protocol,
        from_port: NODE_PORT_RANGE_START,
        to_port: NODE_PORT_RANGE_END,
        cidr: cidr.to_string(),
    }
}
