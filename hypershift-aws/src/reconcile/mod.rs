/*!

Idempotent `ensure` and `remove` operations for each kind of cloud resource a hosted cluster
owns. Ensure operations reuse a resource that already exists under the requested name and only
create what is missing. Remove operations treat a missing resource as already removed, so an
interrupted install or uninstall can always be run again.

!*/

use crate::cloud::{CloudProvider, Tag};
use crate::naming::ClusterIdentity;

mod address;
mod bucket;
mod dns;
mod listener;
mod load_balancer;
mod security;
mod target_group;

/// Reconciles cloud resources on behalf of one cluster.
pub struct Reconciler<'a> {
    cloud: &'a dyn CloudProvider,
    owner: Tag,
    security_group: String,
}

impl<'a> Reconciler<'a> {
    pub fn new(cloud: &'a dyn CloudProvider, identity: &ClusterIdentity) -> Self {
        Self {
            cloud,
            owner: identity.owner_tag(),
            security_group: identity.worker_security_group(),
        }
    }
}
