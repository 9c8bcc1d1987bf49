/*!

Installs a hosted cluster: a namespace on the management cluster, the load balancers, target
groups, DNS records and bucket that expose it, and the rendered control plane manifests.

Every step either succeeds or ends the install. Nothing is rolled back; since every step is
idempotent the install can be run again after a failure, or the cluster can be uninstalled.

!*/

use crate::apply::{apply_manifests, ManifestApplier};
use crate::cloud::{CloudConnector, CloudProvider, Protocol};
use crate::constants::{
    API_PORT, EXCLUDED_MANIFESTS, OAUTH_PORT, OPENSHIFT_API_SERVICE_PORT,
    OPENSHIFT_API_TARGET_PORT, ROUTER_HTTPS_PORT, ROUTER_HTTP_PORT, ROUTER_NODE_PORT_HTTP,
    ROUTER_NODE_PORT_HTTPS, VPN_PORT, WORKER_REPLICAS,
};
use crate::error::{self, Result};
use crate::management::{
    cluster_context, ManagementCluster, PlaceholderService, ServiceEndpoint, ServiceType,
};
use crate::manifests::{write_install_manifests, InstallManifests};
use crate::naming::ClusterIdentity;
use crate::params::{
    image_registry_http_secret, next_subnet, ClusterParams, KubeadminPassword, CLOUD_PROVIDER,
    ETCD_CLIENT_NAME, NETWORK_TYPE, ROUTER_SERVICE_TYPE,
};
use crate::readiness::{wait_for_cluster_ready, ProbeConnector};
use crate::reconcile::Reconciler;
use crate::toolkit::{IgnitionGenerator, ManifestRenderer, PkiGenerator};
use hypershift_utils::{base64_encode_file, impl_display_as_json};
use log::{debug, info};
use serde::Serialize;
use snafu::{ensure, OptionExt, ResultExt};
use std::path::{Path, PathBuf};

const API_SERVICE: PlaceholderService = PlaceholderService {
    name: "kube-apiserver",
    service_type: ServiceType::NodePort,
    protocol: Protocol::Tcp,
    port_name: None,
    port: API_PORT,
    target_port: API_PORT,
};

const VPN_SERVICE: PlaceholderService = PlaceholderService {
    name: "openvpn-server",
    service_type: ServiceType::NodePort,
    protocol: Protocol::Udp,
    port_name: None,
    port: VPN_PORT,
    target_port: VPN_PORT,
};

const OPENSHIFT_API_SERVICE: PlaceholderService = PlaceholderService {
    name: "openshift-apiserver",
    service_type: ServiceType::ClusterIp,
    protocol: Protocol::Tcp,
    port_name: Some("https"),
    port: OPENSHIFT_API_SERVICE_PORT,
    target_port: OPENSHIFT_API_TARGET_PORT,
};

const OAUTH_SERVICE: PlaceholderService = PlaceholderService {
    name: "oauth-openshift",
    service_type: ServiceType::NodePort,
    protocol: Protocol::Tcp,
    port_name: None,
    port: OAUTH_PORT,
    target_port: API_PORT,
};

/// The external systems an install drives.
pub struct Collaborators<'a> {
    pub management: &'a dyn ManagementCluster,
    pub cloud: &'a dyn CloudConnector,
    pub pki: &'a dyn PkiGenerator,
    pub ignition: &'a dyn IgnitionGenerator,
    pub renderer: &'a dyn ManifestRenderer,
    pub applier: &'a dyn ManifestApplier,
    pub probe: &'a dyn ProbeConnector,
}

#[derive(Clone, Debug, Default)]
pub struct InstallOptions {
    pub name: String,
    /// Defaults to the management cluster's own release image.
    pub release_image: Option<String>,
    /// Diffie-Hellman parameters for the VPN server. The toolkit generates them when absent.
    pub dh_params: Option<PathBuf>,
    pub wait_for_cluster_ready: bool,
    pub control_plane_operator_image: Option<String>,
    /// Where the PKI, ignition and manifests are written. A new temporary directory, which is
    /// kept after the install, is used when not set.
    pub work_dir: Option<PathBuf>,
}

/// The subnet, VPC and zone every load balancer of a cluster is placed in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadBalancerInfo {
    pub vpc_id: String,
    pub zone: String,
    pub subnet_id: String,
}

/// Summary of a finished install.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledCluster {
    pub name: String,
    pub api_dns_name: String,
    pub api_address: String,
    pub vpn_dns_name: String,
    pub router_dns_name: String,
    pub ignition_bucket: String,
    pub work_dir: PathBuf,
    pub admin_kubeconfig: PathBuf,
}

impl_display_as_json!(InstalledCluster);

/// Find the zone of the management cluster's external load balancer that has a worker machine,
/// and return it along with the name of that machine.
pub async fn discover_load_balancer_info(
    cloud: &dyn CloudProvider,
    management: &dyn ManagementCluster,
    identity: &ClusterIdentity,
) -> Result<(LoadBalancerInfo, String)> {
    let lb_name = identity.management_load_balancer();
    let lb = cloud
        .find_load_balancer(&lb_name)
        .await?
        .context(error::ResourceNotFoundSnafu {
            kind: "load balancer",
            name: &lb_name,
        })?;
    let vpc_id = lb.vpc_id.clone().context(error::MissingFieldSnafu {
        what: "VpcId",
        from: format!("load balancer '{}'", lb_name),
    })?;
    let machines = management.machine_names().await?;
    for zone in &lb.availability_zones {
        let prefix = identity.worker_machine_prefix(&zone.zone_name);
        if let Some(machine) = machines.iter().find(|name| name.starts_with(&prefix)) {
            return Ok((
                LoadBalancerInfo {
                    vpc_id,
                    zone: zone.zone_name.clone(),
                    subnet_id: zone.subnet_id.clone(),
                },
                machine.clone(),
            ));
        }
    }
    error::NoSuitableZoneSnafu {
        load_balancer: lb_name,
    }
    .fail()
}

fn node_port(endpoint: &ServiceEndpoint, service: &PlaceholderService) -> Result<i32> {
    endpoint.node_port.context(error::MissingFieldSnafu {
        what: "nodePort",
        from: format!("service '{}'", service.name),
    })
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).context(error::FileSnafu {
        action: "create",
        path,
    })
}

fn prepare_work_dir(options: &InstallOptions) -> Result<PathBuf> {
    match &options.work_dir {
        Some(dir) => {
            create_dir(dir)?;
            Ok(dir.clone())
        }
        None => Ok(tempfile::Builder::new()
            .prefix(&format!("hypershift-{}-", options.name))
            .tempdir()
            .context(error::FileSnafu {
                action: "create",
                path: std::env::temp_dir(),
            })?
            .keep()),
    }
}

pub async fn install_cluster(
    collaborators: &Collaborators<'_>,
    options: &InstallOptions,
) -> Result<InstalledCluster> {
    let management = collaborators.management;
    let name = options.name.as_str();

    info!("Discovering management cluster facts");
    let discovery = error::StepSnafu {
        step: "discover management cluster facts",
    };
    let context = cluster_context(management, name).await.context(discovery)?;
    let identity = &context.identity;
    let dns = &context.dns_names;
    let zone_id = context.dns_zone.zone_id.as_str();
    let network = management.network().await.context(discovery)?;
    let release_image = match &options.release_image {
        Some(image) => image.clone(),
        None => management.release_image().await.context(discovery)?,
    };
    debug!("Using release image '{}'", release_image);
    let pull_secret = management.pull_secret().await.context(discovery)?;
    let ssh_public_key = management.ssh_public_key().await.context(discovery)?;
    let credentials = management.aws_credentials().await.context(discovery)?;

    let cloud = collaborators
        .cloud
        .connect(&credentials, &identity.region)
        .await
        .context(error::StepSnafu {
            step: "connect to AWS",
        })?;
    let cloud = cloud.as_ref();
    let (lb_info, machine_name) = discover_load_balancer_info(cloud, management, identity)
        .await
        .context(error::StepSnafu {
            step: "discover load balancer placement",
        })?;
    let machine = management
        .machine(&machine_name)
        .await
        .context(discovery)?;
    let machine_set_template = management
        .machine_set(&identity.worker_machine_prefix(&lb_info.zone))
        .await
        .context(discovery)?;
    info!(
        "Placing load balancers in '{}' ({}) of '{}', targeting machine '{}'",
        lb_info.zone, lb_info.subnet_id, lb_info.vpc_id, machine_name
    );

    let namespace_exists = management
        .namespace_exists(name)
        .await
        .context(discovery)?;
    ensure!(
        !namespace_exists,
        error::NamespaceExistsSnafu { namespace: name }
    );

    info!("Creating namespace '{}'", name);
    management
        .create_namespace(name)
        .await
        .context(error::StepSnafu {
            step: "create namespace",
        })?;
    management
        .ensure_privileged(name)
        .await
        .context(error::StepSnafu {
            step: "grant privileged permission",
        })?;
    management
        .create_pull_secret(name, &pull_secret)
        .await
        .context(error::StepSnafu {
            step: "create pull secret",
        })?;

    info!("Creating placeholder services");
    let services = error::StepSnafu {
        step: "create placeholder services",
    };
    let api_node_port = node_port(
        &management
            .create_service(name, &API_SERVICE)
            .await
            .context(services)?,
        &API_SERVICE,
    )?;
    let vpn_node_port = node_port(
        &management
            .create_service(name, &VPN_SERVICE)
            .await
            .context(services)?,
        &VPN_SERVICE,
    )?;
    let openshift_api_cluster_ip = management
        .create_service(name, &OPENSHIFT_API_SERVICE)
        .await
        .context(services)?
        .cluster_ip
        .context(error::MissingFieldSnafu {
            what: "clusterIP",
            from: "service 'openshift-apiserver'",
        })?;
    let oauth_node_port = node_port(
        &management
            .create_service(name, &OAUTH_SERVICE)
            .await
            .context(services)?,
        &OAUTH_SERVICE,
    )?;

    let reconciler = Reconciler::new(cloud, identity);
    let vpc_id = lb_info.vpc_id.as_str();
    let subnet_id = lb_info.subnet_id.as_str();

    info!("Ensuring API elastic IP '{}'", identity.api_address());
    let address = reconciler
        .ensure_address(&identity.api_address())
        .await
        .context(error::StepSnafu {
            step: "ensure API elastic IP",
        })?;
    info!(
        "API elastic IP: {} ({})",
        address.public_ip, address.allocation_id
    );

    info!("Ensuring API load balancer '{}'", identity.api_load_balancer());
    let api_lb = reconciler
        .ensure_load_balancer(
            &identity.api_load_balancer(),
            subnet_id,
            Some(&address.allocation_id),
        )
        .await
        .context(error::StepSnafu {
            step: "ensure API load balancer",
        })?;
    info!("API load balancer: {} ({})", api_lb.dns_name, api_lb.arn);

    info!("Ensuring API and OAuth target groups");
    let target_groups = error::StepSnafu {
        step: "ensure API target groups",
    };
    let api_tg = reconciler
        .ensure_target_group(vpc_id, &identity.api_target_group(), api_node_port)
        .await
        .context(target_groups)?;
    let oauth_tg = reconciler
        .ensure_target_group(vpc_id, &identity.oauth_target_group(), oauth_node_port)
        .await
        .context(target_groups)?;
    info!("API target groups: {}, {}", api_tg, oauth_tg);

    info!("Registering '{}' with the API target groups", machine.internal_ip);
    let targets = error::StepSnafu {
        step: "register API target",
    };
    reconciler
        .ensure_target(&api_tg, &machine.internal_ip)
        .await
        .context(targets)?;
    reconciler
        .ensure_target(&oauth_tg, &machine.internal_ip)
        .await
        .context(targets)?;

    info!("Ensuring API listeners");
    let listeners = error::StepSnafu {
        step: "ensure API listeners",
    };
    reconciler
        .ensure_listener(&api_lb.arn, &api_tg, API_PORT, Protocol::Tcp)
        .await
        .context(listeners)?;
    reconciler
        .ensure_listener(&api_lb.arn, &oauth_tg, OAUTH_PORT, Protocol::Tcp)
        .await
        .context(listeners)?;

    info!("Pointing '{}' at '{}'", dns.api, api_lb.dns_name);
    reconciler
        .ensure_cname(zone_id, &dns.api, &api_lb.dns_name)
        .await
        .context(error::StepSnafu {
            step: "ensure API DNS record",
        })?;

    info!(
        "Ensuring router load balancer '{}'",
        identity.router_load_balancer()
    );
    let router_lb = reconciler
        .ensure_load_balancer(&identity.router_load_balancer(), subnet_id, None)
        .await
        .context(error::StepSnafu {
            step: "ensure router load balancer",
        })?;
    info!(
        "Router load balancer: {} ({})",
        router_lb.dns_name, router_lb.arn
    );
    let router = error::StepSnafu {
        step: "ensure router target groups and listeners",
    };
    let http_tg = reconciler
        .ensure_target_group(
            vpc_id,
            &identity.router_http_target_group(),
            ROUTER_NODE_PORT_HTTP,
        )
        .await
        .context(router)?;
    let https_tg = reconciler
        .ensure_target_group(
            vpc_id,
            &identity.router_https_target_group(),
            ROUTER_NODE_PORT_HTTPS,
        )
        .await
        .context(router)?;
    reconciler
        .ensure_listener(&router_lb.arn, &http_tg, ROUTER_HTTP_PORT, Protocol::Tcp)
        .await
        .context(router)?;
    reconciler
        .ensure_listener(&router_lb.arn, &https_tg, ROUTER_HTTPS_PORT, Protocol::Tcp)
        .await
        .context(router)?;
    info!("Pointing '{}' at '{}'", dns.router, router_lb.dns_name);
    reconciler
        .ensure_cname(zone_id, &dns.router, &router_lb.dns_name)
        .await
        .context(error::StepSnafu {
            step: "ensure router DNS record",
        })?;

    info!("Ensuring VPN load balancer '{}'", identity.vpn_load_balancer());
    let vpn_lb = reconciler
        .ensure_load_balancer(&identity.vpn_load_balancer(), subnet_id, None)
        .await
        .context(error::StepSnafu {
            step: "ensure VPN load balancer",
        })?;
    info!("VPN load balancer: {} ({})", vpn_lb.dns_name, vpn_lb.arn);
    let vpn = error::StepSnafu {
        step: "ensure VPN target group and listener",
    };
    let vpn_tg = reconciler
        .ensure_udp_target_group(
            vpc_id,
            &identity.vpn_target_group(),
            vpn_node_port,
            api_node_port,
        )
        .await
        .context(vpn)?;
    reconciler
        .ensure_target(&vpn_tg, &machine.instance_id)
        .await
        .context(vpn)?;
    reconciler
        .ensure_listener(&vpn_lb.arn, &vpn_tg, VPN_PORT, Protocol::Udp)
        .await
        .context(vpn)?;
    info!("Pointing '{}' at '{}'", dns.vpn, vpn_lb.dns_name);
    reconciler
        .ensure_cname(zone_id, &dns.vpn, &vpn_lb.dns_name)
        .await
        .context(error::StepSnafu {
            step: "ensure VPN DNS record",
        })?;

    info!("Ensuring worker node port access");
    reconciler
        .ensure_worker_node_port_access()
        .await
        .context(error::StepSnafu {
            step: "ensure worker node port access",
        })?;

    let cidrs = error::StepSnafu {
        step: "compute cluster networks",
    };
    let service_cidr = next_subnet(&network.service_cidr).context(cidrs)?;
    let pod_cidr = next_subnet(&network.pod_cidr).context(cidrs)?;
    info!("Service network {}, pod network {}", service_cidr, pod_cidr);

    let mut params = ClusterParams {
        namespace: name.to_string(),
        external_api_dns_name: dns.api.clone(),
        external_api_port: API_PORT,
        external_api_address: address.public_ip.clone(),
        external_vpn_dns_name: dns.vpn.clone(),
        external_vpn_port: VPN_PORT,
        external_oauth_dns_name: dns.api.clone(),
        external_oauth_port: OAUTH_PORT,
        api_node_port,
        oauth_node_port,
        vpn_node_port: vpn_node_port.to_string(),
        service_cidr,
        pod_cidr,
        release_image,
        ingress_subdomain: dns.ingress_subdomain.clone(),
        openshift_api_cluster_ip,
        image_registry_http_secret: image_registry_http_secret(),
        router_node_port_http: ROUTER_NODE_PORT_HTTP.to_string(),
        router_node_port_https: ROUTER_NODE_PORT_HTTPS.to_string(),
        base_domain: dns.base_domain.clone(),
        network_type: NETWORK_TYPE.to_string(),
        replicas: WORKER_REPLICAS.to_string(),
        etcd_client_name: ETCD_CLIENT_NAME.to_string(),
        openshift_api_server_ca_bundle: String::new(),
        cloud_provider: CLOUD_PROVIDER.to_string(),
        internal_api_port: API_PORT,
        router_service_type: ROUTER_SERVICE_TYPE.to_string(),
        control_plane_operator_image: options.control_plane_operator_image.clone(),
    };

    let work_dir = prepare_work_dir(options)?;
    let pki_dir = work_dir.join("pki");
    let ignition_dir = work_dir.join("ignition");
    let manifests_dir = work_dir.join("manifests");
    for dir in &[&pki_dir, &ignition_dir, &manifests_dir] {
        create_dir(dir)?;
    }
    let pull_secret_path = work_dir.join("pull-secret.json");
    tokio::fs::write(&pull_secret_path, &pull_secret)
        .await
        .context(error::FileSnafu {
            action: "write",
            path: &pull_secret_path,
        })?;
    debug!("Writing generated files to '{}'", work_dir.display());

    info!("Generating PKI");
    let pki = error::StepSnafu {
        step: "generate PKI",
    };
    if let Some(dh_params) = &options.dh_params {
        let destination = pki_dir.join("openvpn-dh.pem");
        tokio::fs::copy(dh_params, &destination)
            .await
            .context(error::FileSnafu {
                action: "copy",
                path: dh_params,
            })
            .context(pki)?;
    }
    collaborators
        .pki
        .generate_pki(&params, &pki_dir)
        .await
        .context(pki)?;
    params.openshift_api_server_ca_bundle = base64_encode_file(pki_dir.join("combined-ca.crt"))
        .map_err(error::Error::from)
        .context(pki)?;

    info!("Generating ignition");
    let ignition = collaborators
        .ignition
        .generate_ignition(
            &params,
            &ssh_public_key,
            &pull_secret_path,
            &pki_dir,
            &ignition_dir,
        )
        .await
        .context(error::StepSnafu {
            step: "generate ignition",
        })?;

    let bucket = identity.ignition_bucket();
    info!("Uploading ignition to bucket '{}'", bucket);
    reconciler
        .ensure_ignition_bucket(&bucket, &ignition)
        .await
        .context(error::StepSnafu {
            step: "ensure ignition bucket",
        })?;

    info!("Rendering manifests");
    collaborators
        .renderer
        .render(&params, &pull_secret_path, &pki_dir, &manifests_dir)
        .await
        .context(error::StepSnafu {
            step: "render manifests",
        })?;

    let admin_kubeconfig = pki_dir.join("admin.kubeconfig");
    let generated = error::StepSnafu {
        step: "generate install manifests",
    };
    let kubeadmin = KubeadminPassword::generate().context(generated)?;
    let kubeconfig = tokio::fs::read_to_string(&admin_kubeconfig)
        .await
        .context(error::FileSnafu {
            action: "read",
            path: &admin_kubeconfig,
        })
        .context(generated)?;
    write_install_manifests(
        &manifests_dir,
        &InstallManifests {
            machine_set_template: &machine_set_template,
            worker_machine_set: &identity.worker_machine_set(),
            user_data_secret: &identity.user_data_secret(),
            router_load_balancer: &identity.router_load_balancer(),
            ignition_bucket: &bucket,
            kubeadmin: &kubeadmin,
            admin_kubeconfig: &kubeconfig,
            pull_secret: &pull_secret,
        },
    )
    .context(generated)?;

    info!("Applying manifests to namespace '{}'", name);
    apply_manifests(
        collaborators.applier,
        name,
        &manifests_dir,
        EXCLUDED_MANIFESTS,
    )
    .await
    .context(error::StepSnafu {
        step: "apply manifests",
    })?;

    if options.wait_for_cluster_ready {
        let ready = error::StepSnafu {
            step: "wait for the cluster to become ready",
        };
        let probe = collaborators
            .probe
            .connect(name, &dns.api, &pki_dir)
            .await
            .context(ready)?;
        wait_for_cluster_ready(probe.as_ref(), WORKER_REPLICAS as usize)
            .await
            .context(ready)?;
    }

    info!("Cluster '{}' is installed", name);
    Ok(InstalledCluster {
        name: name.to_string(),
        api_dns_name: dns.api.clone(),
        api_address: address.public_ip,
        vpn_dns_name: dns.vpn.clone(),
        router_dns_name: dns.router.clone(),
        ignition_bucket: bucket,
        work_dir,
        admin_kubeconfig,
    })
}
