use super::Reconciler;
use crate::cloud::{LoadBalancer, SubnetPlacement};
use crate::error::Result;
use log::debug;

impl Reconciler<'_> {
    /// Return the load balancer called `name`, creating it in `subnet_id` if it does not exist.
    ///
    /// An existing load balancer is returned untouched, even if it was created with a different
    /// subnet or address. When `allocation_id` is given the new load balancer is bound to that
    /// elastic IP.
    pub async fn ensure_load_balancer(
        &self,
        name: &str,
        subnet_id: &str,
        allocation_id: Option<&str>,
    ) -> Result<LoadBalancer> {
        if let Some(lb) = self.cloud.find_load_balancer(name).await? {
            debug!("Load balancer '{}' already exists: {}", name, lb.arn);
            return Ok(lb);
        }
        let placement = SubnetPlacement {
            subnet_id: subnet_id.to_string(),
            allocation_id: allocation_id.map(str::to_string),
        };
        self.cloud
            .create_load_balancer(name, &placement, &[self.owner.clone()])
            .await
    }

    pub async fn remove_load_balancer(&self, name: &str) -> Result<()> {
        match self.cloud.find_load_balancer(name).await? {
            Some(lb) => self.cloud.delete_load_balancer(&lb.arn).await,
            None => {
                debug!("Load balancer '{}' does not exist", name);
                Ok(())
            }
        }
    }
}
