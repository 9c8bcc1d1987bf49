use crate::cloud::CloudConnector;
use crate::constants::MACHINE_API_NAMESPACE;
use crate::error::{self, Result};
use crate::management::{cluster_context, ManagementCluster};
use crate::reconcile::Reconciler;
use log::info;
use snafu::ResultExt;

/// Remove everything [`install_cluster`](crate::install::install_cluster) creates for `name`,
/// in reverse dependency order.
///
/// Resources that no longer exist are skipped, so an uninstall that failed part way can simply
/// be run again. The worker security group rules are shared by all clusters and are kept.
pub async fn uninstall_cluster(
    management: &dyn ManagementCluster,
    cloud: &dyn CloudConnector,
    name: &str,
) -> Result<()> {
    info!("Discovering management cluster facts");
    let discovery = error::StepSnafu {
        step: "discover management cluster facts",
    };
    let context = cluster_context(management, name).await.context(discovery)?;
    let identity = &context.identity;
    let dns = &context.dns_names;
    let zone_id = context.dns_zone.zone_id.as_str();
    let credentials = management.aws_credentials().await.context(discovery)?;
    let cloud = cloud
        .connect(&credentials, &identity.region)
        .await
        .context(error::StepSnafu {
            step: "connect to AWS",
        })?;
    let reconciler = Reconciler::new(cloud.as_ref(), identity);

    info!("Removing API DNS record '{}'", dns.api);
    reconciler
        .remove_cname(zone_id, &dns.api)
        .await
        .context(error::StepSnafu {
            step: "remove API DNS record",
        })?;
    info!("Removing API load balancer '{}'", identity.api_load_balancer());
    reconciler
        .remove_load_balancer(&identity.api_load_balancer())
        .await
        .context(error::StepSnafu {
            step: "remove API load balancer",
        })?;
    info!("Removing API target groups");
    let api_target_groups = error::StepSnafu {
        step: "remove API target groups",
    };
    reconciler
        .remove_target_group(&identity.api_target_group())
        .await
        .context(api_target_groups)?;
    reconciler
        .remove_target_group(&identity.oauth_target_group())
        .await
        .context(api_target_groups)?;
    info!("Releasing API elastic IP '{}'", identity.api_address());
    reconciler
        .remove_address(&identity.api_address())
        .await
        .context(error::StepSnafu {
            step: "release API elastic IP",
        })?;

    info!("Removing VPN DNS record '{}'", dns.vpn);
    reconciler
        .remove_cname(zone_id, &dns.vpn)
        .await
        .context(error::StepSnafu {
            step: "remove VPN DNS record",
        })?;
    info!("Removing VPN load balancer '{}'", identity.vpn_load_balancer());
    reconciler
        .remove_load_balancer(&identity.vpn_load_balancer())
        .await
        .context(error::StepSnafu {
            step: "remove VPN load balancer",
        })?;
    reconciler
        .remove_target_group(&identity.vpn_target_group())
        .await
        .context(error::StepSnafu {
            step: "remove VPN target group",
        })?;

    info!("Removing router DNS record '{}'", dns.router);
    reconciler
        .remove_cname(zone_id, &dns.router)
        .await
        .context(error::StepSnafu {
            step: "remove router DNS record",
        })?;
    info!(
        "Removing router load balancer '{}'",
        identity.router_load_balancer()
    );
    reconciler
        .remove_load_balancer(&identity.router_load_balancer())
        .await
        .context(error::StepSnafu {
            step: "remove router load balancer",
        })?;
    let router_target_groups = error::StepSnafu {
        step: "remove router target groups",
    };
    reconciler
        .remove_target_group(&identity.router_http_target_group())
        .await
        .context(router_target_groups)?;
    reconciler
        .remove_target_group(&identity.router_https_target_group())
        .await
        .context(router_target_groups)?;

    info!("Removing worker machineset '{}'", identity.worker_machine_set());
    management
        .delete_machine_set(&identity.worker_machine_set())
        .await
        .context(error::StepSnafu {
            step: "remove worker machineset",
        })?;
    management
        .delete_secret(MACHINE_API_NAMESPACE, &identity.user_data_secret())
        .await
        .context(error::StepSnafu {
            step: "remove worker user data",
        })?;

    info!("Removing ignition bucket '{}'", identity.ignition_bucket());
    reconciler
        .remove_ignition_bucket(&identity.ignition_bucket())
        .await
        .context(error::StepSnafu {
            step: "remove ignition bucket",
        })?;

    info!("Deleting namespace '{}'", name);
    management
        .delete_namespace(name)
        .await
        .context(error::StepSnafu {
            step: "delete namespace",
        })?;
    info!("Cluster '{}' is uninstalled", name);
    Ok(())
}
