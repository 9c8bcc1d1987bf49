use super::{
    INFRA_NAME, PARENT_DOMAIN, REGION, WORKER_INSTANCE_ID, WORKER_INTERNAL_IP, WORKER_MACHINE,
    ZONE, ZONE_ID,
};
use async_trait::async_trait;
use hypershift_aws::error::{Error, Result};
use hypershift_aws::management::{
    DnsZone, Infrastructure, MachineInfo, ManagementCluster, NetworkCidrs, PlaceholderService,
    ServiceEndpoint, ServiceType,
};
use hypershift_utils::aws::AwsCredentials;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) const RELEASE_IMAGE: &str = "quay.io/openshift-release-dev/ocp-release:4.4.0-x86_64";
pub(crate) const PULL_SECRET: &str = r#"{"auths":{"quay.io":{"auth":"Zm9vOmJhcg=="}}}"#;
pub(crate) const SSH_PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2E core@management";

/// A namespaced object, written `namespace/name`.
pub(crate) fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[derive(Debug, Default)]
pub(crate) struct ManagementState {
    pub(crate) namespaces: BTreeSet<String>,
    pub(crate) privileged: BTreeSet<String>,
    pub(crate) pull_secrets: BTreeMap<String, String>,
    pub(crate) services: BTreeMap<String, ServiceEndpoint>,
    /// Machine sets of the machine API namespace by name.
    pub(crate) machine_sets: BTreeMap<String, Value>,
    pub(crate) machines: Vec<String>,
    pub(crate) secrets: BTreeSet<String>,
    next_port: i32,
}

/// A management cluster with one worker machine in [`ZONE`] and the machine set that owns it.
#[derive(Clone, Debug)]
pub(crate) struct MockManagementCluster {
    state: Arc<Mutex<ManagementState>>,
}

impl Default for MockManagementCluster {
    fn default() -> Self {
        let template_name = format!("{}-worker-{}", INFRA_NAME, ZONE);
        let mut state = ManagementState::default();
        state
            .machine_sets
            .insert(template_name.clone(), machine_set_template(&template_name));
        state.machines = vec![
            format!("{}-master-0", INFRA_NAME),
            WORKER_MACHINE.to_string(),
        ];
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl MockManagementCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ManagementState> {
        self.state.lock().unwrap()
    }
}

pub(crate) fn machine_set_template(name: &str) -> Value {
    json!({
        "apiVersion": "machine.openshift.io/v1beta1",
        "kind": "MachineSet",
        "metadata": {
            "name": name,
            "namespace": "openshift-machine-api",
            "uid": "5c8e4b4e",
            "resourceVersion": "12345"
        },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": {
                "machine.openshift.io/cluster-api-machineset": name
            } },
            "template": {
                "metadata": { "labels": {
                    "machine.openshift.io/cluster-api-machineset": name
                } },
                "spec": {
                    "metadata": {},
                    "providerSpec": { "value": {
                        "instanceType": "m5.large",
                        "publicIp": false,
                        "userDataSecret": { "name": "worker-user-data" }
                    } }
                }
            }
        },
        "status": { "replicas": 1 }
    })
}

fn not_found(kind: &str, name: &str) -> Error {
    Error::ResourceNotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ManagementCluster for MockManagementCluster {
    async fn infrastructure(&self) -> Result<Infrastructure> {
        Ok(Infrastructure {
            infra_name: INFRA_NAME.to_string(),
            region: REGION.to_string(),
        })
    }

    async fn network(&self) -> Result<NetworkCidrs> {
        Ok(NetworkCidrs {
            service_cidr: "172.30.0.0/16".to_string(),
            pod_cidr: "10.128.0.0/14".to_string(),
        })
    }

    async fn dns_zone(&self) -> Result<DnsZone> {
        Ok(DnsZone {
            zone_id: ZONE_ID.to_string(),
            parent_domain: PARENT_DOMAIN.to_string(),
        })
    }

    async fn release_image(&self) -> Result<String> {
        Ok(RELEASE_IMAGE.to_string())
    }

    async fn pull_secret(&self) -> Result<String> {
        Ok(PULL_SECRET.to_string())
    }

    async fn ssh_public_key(&self) -> Result<String> {
        Ok(SSH_PUBLIC_KEY.to_string())
    }

    async fn aws_credentials(&self) -> Result<AwsCredentials> {
        Ok(AwsCredentials {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
        })
    }

    async fn machine_names(&self) -> Result<Vec<String>> {
        Ok(self.state().machines.clone())
    }

    async fn machine(&self, name: &str) -> Result<MachineInfo> {
        if name != WORKER_MACHINE {
            return Err(not_found("machine", name));
        }
        Ok(MachineInfo {
            instance_id: WORKER_INSTANCE_ID.to_string(),
            internal_ip: WORKER_INTERNAL_IP.to_string(),
        })
    }

    async fn machine_set(&self, name: &str) -> Result<Value> {
        self.state()
            .machine_sets
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("machineset", name))
    }

    async fn delete_machine_set(&self, name: &str) -> Result<()> {
        self.state().machine_sets.remove(name);
        Ok(())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.state().namespaces.contains(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        self.state().namespaces.insert(namespace.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let mut state = self.state();
        let prefix = key(namespace, "");
        state.namespaces.remove(namespace);
        state.privileged.remove(namespace);
        state.pull_secrets.remove(namespace);
        state.services.retain(|name, _| !name.starts_with(&prefix));
        state.secrets.retain(|name| !name.starts_with(&prefix));
        Ok(())
    }

    async fn ensure_privileged(&self, namespace: &str) -> Result<()> {
        self.state().privileged.insert(namespace.to_string());
        Ok(())
    }

    async fn create_pull_secret(&self, namespace: &str, dockerconfigjson: &str) -> Result<()> {
        self.state()
            .pull_secrets
            .insert(namespace.to_string(), dockerconfigjson.to_string());
        Ok(())
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &PlaceholderService,
    ) -> Result<ServiceEndpoint> {
        let mut state = self.state();
        if !state.namespaces.contains(namespace) {
            return Err(not_found("namespace", namespace));
        }
        state.next_port += 1;
        let endpoint = match service.service_type {
            ServiceType::NodePort => ServiceEndpoint {
                node_port: Some(30000 + state.next_port),
                cluster_ip: Some(format!("172.30.0.{}", state.next_port)),
            },
            ServiceType::ClusterIp => ServiceEndpoint {
                node_port: None,
                cluster_ip: Some(format!("172.30.0.{}", state.next_port)),
            },
        };
        state
            .services
            .insert(key(namespace, service.name), endpoint.clone());
        Ok(endpoint)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.state().secrets.remove(&key(namespace, name));
        Ok(())
    }
}
