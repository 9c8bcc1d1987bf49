use super::{
    parse_dns_zone, parse_infrastructure, parse_machine, parse_network, parse_release_image,
    parse_ssh_public_key, AllowNotFound, DnsZone, Infrastructure, MachineInfo, ManagementCluster,
    NetworkCidrs, PlaceholderService, ServiceEndpoint,
};
use crate::constants::{
    MACHINE_API_NAMESPACE, PULL_SECRET_NAME, READINESS_POLL_INTERVAL, SERVICE_ACCOUNT_TIMEOUT,
};
use crate::error::{self, Result};
use crate::wait::wait_for;
use async_trait::async_trait;
use hypershift_utils::aws::AwsCredentials;
use k8s_openapi::api::core::v1::{
    Namespace, Secret, Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
    ResourceExt,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::{Client, Config};
use log::{debug, info};
use maplit::btreemap;
use serde_json::{json, Value};
use snafu::{OptionExt, ResultExt};
use std::path::Path;

const AWS_CREDENTIALS_NAMESPACE: &str = "kube-system";
const AWS_CREDENTIALS_SECRET: &str = "aws-creds";
const GLOBAL_PULL_SECRET_NAMESPACE: &str = "openshift-config";
const MASTER_SSH_MACHINE_CONFIG: &str = "99-master-ssh";
const PRIVILEGED_SCC: &str = "privileged";
const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Build a client from `kubeconfig`, or from the environment when no path is given.
pub async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig =
                Kubeconfig::read_from(path).context(error::KubeconfigSnafu { path })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context(error::KubeconfigSnafu { path })?
        }
        None => Config::infer().await.context(error::KubeInferConfigSnafu)?,
    };
    Client::try_from(config).context(error::KubeClientSnafu)
}

fn openshift_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
}

fn infrastructures() -> ApiResource {
    openshift_resource("config.openshift.io", "v1", "Infrastructure", "infrastructures")
}

fn networks() -> ApiResource {
    openshift_resource("config.openshift.io", "v1", "Network", "networks")
}

fn dnses() -> ApiResource {
    openshift_resource("config.openshift.io", "v1", "DNS", "dnses")
}

fn cluster_versions() -> ApiResource {
    openshift_resource("config.openshift.io", "v1", "ClusterVersion", "clusterversions")
}

fn machine_configs() -> ApiResource {
    openshift_resource(
        "machineconfiguration.openshift.io",
        "v1",
        "MachineConfig",
        "machineconfigs",
    )
}

fn machines() -> ApiResource {
    openshift_resource("machine.openshift.io", "v1beta1", "Machine", "machines")
}

fn machine_sets() -> ApiResource {
    openshift_resource("machine.openshift.io", "v1beta1", "MachineSet", "machinesets")
}

fn security_context_constraints() -> ApiResource {
    openshift_resource(
        "security.openshift.io",
        "v1",
        "SecurityContextConstraints",
        "securitycontextconstraints",
    )
}

fn secret_value(secret: &Secret, key: &str) -> Result<String> {
    let from = format!("secret '{}'", secret.name_any());
    let ByteString(bytes) = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .context(error::MissingFieldSnafu { what: key, from: &from })?;
    String::from_utf8(bytes.clone()).context(error::Utf8Snafu {
        what: format!("key '{}' of {}", key, from),
    })
}

/// [`ManagementCluster`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeManagementCluster {
    client: Client,
}

impl KubeManagementCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn get_cluster_scoped(&self, resource: &ApiResource, name: &str) -> Result<Value> {
        let api = Api::<DynamicObject>::all_with(self.client.clone(), resource);
        let object = api.get(name).await.context(error::KubeSnafu {
            what: format!("get {} '{}'", resource.kind, name),
        })?;
        Ok(object.data)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get(name)
            .await
            .context(error::KubeSnafu {
                what: format!("get secret '{}/{}'", namespace, name),
            })
    }
}

#[async_trait]
impl ManagementCluster for KubeManagementCluster {
    async fn infrastructure(&self) -> Result<Infrastructure> {
        parse_infrastructure(&self.get_cluster_scoped(&infrastructures(), "cluster").await?)
    }

    async fn network(&self) -> Result<NetworkCidrs> {
        parse_network(&self.get_cluster_scoped(&networks(), "cluster").await?)
    }

    async fn dns_zone(&self) -> Result<DnsZone> {
        parse_dns_zone(&self.get_cluster_scoped(&dnses(), "cluster").await?)
    }

    async fn release_image(&self) -> Result<String> {
        parse_release_image(&self.get_cluster_scoped(&cluster_versions(), "version").await?)
    }

    async fn pull_secret(&self) -> Result<String> {
        let secret = self
            .get_secret(GLOBAL_PULL_SECRET_NAMESPACE, PULL_SECRET_NAME)
            .await?;
        secret_value(&secret, DOCKER_CONFIG_JSON_KEY)
    }

    async fn ssh_public_key(&self) -> Result<String> {
        parse_ssh_public_key(
            &self
                .get_cluster_scoped(&machine_configs(), MASTER_SSH_MACHINE_CONFIG)
                .await?,
        )
    }

    async fn aws_credentials(&self) -> Result<AwsCredentials> {
        let secret = self
            .get_secret(AWS_CREDENTIALS_NAMESPACE, AWS_CREDENTIALS_SECRET)
            .await?;
        Ok(AwsCredentials {
            access_key_id: secret_value(&secret, "aws_access_key_id")?,
            secret_access_key: secret_value(&secret, "aws_secret_access_key")?,
        })
    }

    async fn machine_names(&self) -> Result<Vec<String>> {
        let api = Api::<DynamicObject>::namespaced_with(
            self.client.clone(),
            MACHINE_API_NAMESPACE,
            &machines(),
        );
        let list = api
            .list(&ListParams::default())
            .await
            .context(error::KubeSnafu {
                what: "list machines",
            })?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn machine(&self, name: &str) -> Result<MachineInfo> {
        let api = Api::<DynamicObject>::namespaced_with(
            self.client.clone(),
            MACHINE_API_NAMESPACE,
            &machines(),
        );
        let machine = api.get(name).await.context(error::KubeSnafu {
            what: format!("get machine '{}'", name),
        })?;
        parse_machine(name, &machine.data)
    }

    async fn machine_set(&self, name: &str) -> Result<Value> {
        let api = Api::<DynamicObject>::namespaced_with(
            self.client.clone(),
            MACHINE_API_NAMESPACE,
            &machine_sets(),
        );
        let machine_set = api.get(name).await.context(error::KubeSnafu {
            what: format!("get machineset '{}'", name),
        })?;
        serde_json::to_value(&machine_set).context(error::JsonSnafu {
            what: format!("serialize machineset '{}'", name),
        })
    }

    async fn delete_machine_set(&self, name: &str) -> Result<()> {
        let api = Api::<DynamicObject>::namespaced_with(
            self.client.clone(),
            MACHINE_API_NAMESPACE,
            &machine_sets(),
        );
        if api
            .delete(name, &DeleteParams::default())
            .await
            .allow_not_found()
            .context(error::KubeSnafu {
                what: format!("delete machineset '{}'", name),
            })?
            .is_none()
        {
            debug!("Machineset '{}' does not exist", name);
        }
        Ok(())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let api = Api::<Namespace>::all(self.client.clone());
        Ok(api
            .get_opt(namespace)
            .await
            .context(error::KubeSnafu {
                what: format!("get namespace '{}'", namespace),
            })?
            .is_some())
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        let api = Api::<Namespace>::all(self.client.clone());
        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &object)
            .await
            .context(error::KubeSnafu {
                what: format!("create namespace '{}'", namespace),
            })?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let api = Api::<Namespace>::all(self.client.clone());
        if api
            .delete(namespace, &DeleteParams::default())
            .await
            .allow_not_found()
            .context(error::KubeSnafu {
                what: format!("delete namespace '{}'", namespace),
            })?
            .is_none()
        {
            debug!("Namespace '{}' does not exist", namespace);
        }
        Ok(())
    }

    async fn ensure_privileged(&self, namespace: &str) -> Result<()> {
        let api =
            Api::<DynamicObject>::all_with(self.client.clone(), &security_context_constraints());
        let scc = api.get(PRIVILEGED_SCC).await.context(error::KubeSnafu {
            what: "get securitycontextconstraints 'privileged'",
        })?;
        let user = format!("system:serviceaccount:{}:default", namespace);
        let mut users: Vec<Value> = scc
            .data
            .get("users")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if users.iter().any(|existing| existing.as_str() == Some(user.as_str())) {
            debug!("'{}' is already privileged", user);
            return Ok(());
        }
        users.push(Value::String(user));
        api.patch(
            PRIVILEGED_SCC,
            &PatchParams::default(),
            &Patch::Merge(json!({ "users": users })),
        )
        .await
        .context(error::KubeSnafu {
            what: "update securitycontextconstraints 'privileged'",
        })?;
        Ok(())
    }

    async fn create_pull_secret(&self, namespace: &str, dockerconfigjson: &str) -> Result<()> {
        let secrets = Api::<Secret>::namespaced(self.client.clone(), namespace);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(PULL_SECRET_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            string_data: Some(btreemap! {
                DOCKER_CONFIG_JSON_KEY.to_string() => dockerconfigjson.to_string(),
            }),
            ..Default::default()
        };
        secrets
            .create(&PostParams::default(), &secret)
            .await
            .allow_already_exists()
            .context(error::KubeSnafu {
                what: format!("create secret '{}/{}'", namespace, PULL_SECRET_NAME),
            })?;

        // The service account controller creates `default` shortly after the namespace.
        let accounts = &Api::<ServiceAccount>::namespaced(self.client.clone(), namespace);
        let account = wait_for(
            READINESS_POLL_INTERVAL,
            SERVICE_ACCOUNT_TIMEOUT,
            &format!("service account '{}/default'", namespace),
            || async move {
                accounts.get_opt("default").await.context(error::KubeSnafu {
                    what: format!("get service account '{}/default'", namespace),
                })
            },
        )
        .await?;
        let mut pull_secrets: Vec<Value> = account
            .image_pull_secrets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|reference| reference.name)
            .map(|name| json!({ "name": name }))
            .collect();
        pull_secrets.push(json!({ "name": PULL_SECRET_NAME }));
        accounts
            .patch(
                "default",
                &PatchParams::default(),
                &Patch::Merge(json!({ "imagePullSecrets": pull_secrets })),
            )
            .await
            .context(error::KubeSnafu {
                what: format!("attach pull secret to '{}/default'", namespace),
            })?;
        Ok(())
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &PlaceholderService,
    ) -> Result<ServiceEndpoint> {
        let api = Api::<Service>::namespaced(self.client.clone(), namespace);
        let object = Service {
            metadata: ObjectMeta {
                name: Some(service.name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(service.service_type.as_str().to_string()),
                selector: Some(btreemap! { "app".to_string() => service.name.to_string() }),
                ports: Some(vec![ServicePort {
                    name: service.port_name.map(str::to_string),
                    protocol: Some(service.protocol.as_str().to_string()),
                    port: service.port,
                    target_port: Some(IntOrString::Int(service.target_port)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let created = api
            .create(&PostParams::default(), &object)
            .await
            .context(error::KubeSnafu {
                what: format!("create service '{}/{}'", namespace, service.name),
            })?;
        let spec = created.spec.unwrap_or_default();
        let endpoint = ServiceEndpoint {
            node_port: spec
                .ports
                .as_ref()
                .and_then(|ports| ports.first())
                .and_then(|port| port.node_port),
            cluster_ip: spec.cluster_ip,
        };
        info!(
            "Created service '{}' (node port {:?}, cluster IP {:?})",
            service.name, endpoint.node_port, endpoint.cluster_ip
        );
        Ok(endpoint)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let api = Api::<Secret>::namespaced(self.client.clone(), namespace);
        if api
            .delete(name, &DeleteParams::default())
            .await
            .allow_not_found()
            .context(error::KubeSnafu {
                what: format!("delete secret '{}/{}'", namespace, name),
            })?
            .is_none()
        {
            debug!("Secret '{}/{}' does not exist", namespace, name);
        }
        Ok(())
    }
}
