use super::Reconciler;
use crate::cloud::{ElasticIp, Tag};
use crate::constants::{ADDRESS_RELEASE_INTERVAL, ADDRESS_RELEASE_TIMEOUT};
use crate::error::Result;
use crate::wait::wait_for;
use log::{debug, info};

/// What the release wait observed.
enum Releasable {
    Gone,
    Detached(String),
}

impl Reconciler<'_> {
    /// Find the elastic IP tagged `Name=name`, allocating and tagging one if there is none.
    pub async fn ensure_address(&self, name: &str) -> Result<ElasticIp> {
        if let Some(address) = self.cloud.find_address(name).await? {
            debug!(
                "Elastic IP '{}' already exists with allocation '{}'",
                name, address.allocation_id
            );
            return Ok(address);
        }
        let address = self.cloud.allocate_address().await?;
        self.cloud
            .tag_address(
                &address.allocation_id,
                &[Tag::new("Name", name), self.owner.clone()],
            )
            .await?;
        Ok(address)
    }

    /// Release the elastic IP tagged `Name=name` once nothing is attached to it.
    pub async fn remove_address(&self, name: &str) -> Result<()> {
        let cloud = self.cloud;
        let state = wait_for(
            ADDRESS_RELEASE_INTERVAL,
            ADDRESS_RELEASE_TIMEOUT,
            &format!("elastic IP '{}' to be detached", name),
            || async move {
                Result::<_>::Ok(match cloud.find_address(name).await? {
                    None => Some(Releasable::Gone),
                    Some(ElasticIp {
                        allocation_id,
                        network_interface_id: None,
                        ..
                    }) => Some(Releasable::Detached(allocation_id)),
                    Some(_) => None,
                })
            },
        )
        .await?;
        match state {
            Releasable::Gone => {
                debug!("Elastic IP '{}' does not exist", name);
                Ok(())
            }
            Releasable::Detached(allocation_id) => {
                info!("Releasing elastic IP '{}' ({})", name, allocation_id);
                self.cloud.release_address(&allocation_id).await
            }
        }
    }
}
