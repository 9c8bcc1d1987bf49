use super::Reconciler;
use crate::cloud::{Protocol, TargetGroupSpec, TargetType};
use crate::error::Result;
use log::{debug, info};

impl Reconciler<'_> {
    /// Ensure a TCP target group of IP targets called `name` forwards to `port`. Returns its ARN.
    pub async fn ensure_target_group(&self, vpc_id: &str, name: &str, port: i32) -> Result<String> {
        self.ensure_target_group_spec(TargetGroupSpec {
            name: name.to_string(),
            vpc_id: vpc_id.to_string(),
            port,
            protocol: Protocol::Tcp,
            target_type: TargetType::Ip,
            health_check_port: None,
        })
        .await
    }

    /// Ensure a UDP target group of instance targets called `name` forwards to `port`, checking
    /// target health over TCP on `health_check_port`. Returns its ARN.
    pub async fn ensure_udp_target_group(
        &self,
        vpc_id: &str,
        name: &str,
        port: i32,
        health_check_port: i32,
    ) -> Result<String> {
        self.ensure_target_group_spec(TargetGroupSpec {
            name: name.to_string(),
            vpc_id: vpc_id.to_string(),
            port,
            protocol: Protocol::Udp,
            target_type: TargetType::Instance,
            health_check_port: Some(health_check_port),
        })
        .await
    }

    async fn ensure_target_group_spec(&self, spec: TargetGroupSpec) -> Result<String> {
        if let Some(existing) = self.cloud.find_target_group(&spec.name).await? {
            if existing.port == spec.port {
                debug!("Target group '{}' already exists: {}", spec.name, existing.arn);
                return Ok(existing.arn);
            }
            // The port of a target group cannot be changed in place.
            info!(
                "Target group '{}' forwards to port {} instead of {}, recreating it",
                spec.name, existing.port, spec.port
            );
            self.cloud.delete_target_group(&existing.arn).await?;
        }
        Ok(self.cloud.create_target_group(&spec).await?.arn)
    }

    /// Make `target_id` the only target registered with the target group.
    pub async fn ensure_target(&self, target_group_arn: &str, target_id: &str) -> Result<()> {
        let registered = self.cloud.registered_targets(target_group_arn).await?;
        for other in registered.iter().filter(|id| id.as_str() != target_id) {
            info!("Deregistering target '{}' from {}", other, target_group_arn);
            self.cloud.deregister_target(target_group_arn, other).await?;
        }
        if !registered.iter().any(|id| id == target_id) {
            self.cloud
                .register_target(target_group_arn, target_id)
                .await?;
        }
        Ok(())
    }

    pub async fn remove_target_group(&self, name: &str) -> Result<()> {
        match self.cloud.find_target_group(name).await? {
            Some(tg) => self.cloud.delete_target_group(&tg.arn).await,
            None => {
                debug!("Target group '{}' does not exist", name);
                Ok(())
            }
        }
    }
}
