use super::Reconciler;
use crate::cloud::Protocol;
use crate::error::Result;
use log::{debug, info};

impl Reconciler<'_> {
    /// Ensure the single listener on `port` of the load balancer forwards to `target_group_arn`.
    pub async fn ensure_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        port: i32,
        protocol: Protocol,
    ) -> Result<()> {
        let listeners = self.cloud.listeners(load_balancer_arn).await?;
        for listener in listeners.iter().filter(|listener| listener.port == port) {
            if listener.target_group_arn.as_deref() == Some(target_group_arn) {
                debug!("Listener on port {} already forwards to {}", port, target_group_arn);
                return Ok(());
            }
            info!("Deleting listener on port {} forwarding elsewhere", port);
            self.cloud.delete_listener(&listener.arn).await?;
        }
        self.cloud
            .create_listener(load_balancer_arn, target_group_arn, port, protocol)
            .await?;
        Ok(())
    }
}
