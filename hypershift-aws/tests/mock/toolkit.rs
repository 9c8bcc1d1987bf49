use super::management::key;
use super::MockManagementCluster;
use async_trait::async_trait;
use hypershift_aws::apply::ManifestApplier;
use hypershift_aws::constants::{EXCLUDED_MANIFESTS, IGNITION_FILE_NAME, MACHINE_API_NAMESPACE};
use hypershift_aws::error::{Error, Result};
use hypershift_aws::params::ClusterParams;
use hypershift_aws::readiness::{ClusterProbe, ConditionStatus, PodStatus, ProbeConnector};
use hypershift_aws::toolkit::{IgnitionGenerator, ManifestRenderer, PkiGenerator};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) const RENDERED_MANIFEST: &str = "kube-apiserver-deployment.yaml";

fn write(path: PathBuf, content: &str) -> Result<()> {
    std::fs::write(&path, content).map_err(|source| Error::File {
        action: "write".to_string(),
        path,
        source,
    })
}

/// Stands in for the toolkit binary by writing the files later install steps read.
#[derive(Debug, Default)]
pub(crate) struct MockToolkit {
    pub(crate) rendered: Mutex<Vec<ClusterParams>>,
}

#[async_trait]
impl PkiGenerator for MockToolkit {
    async fn generate_pki(&self, params: &ClusterParams, output_dir: &Path) -> Result<()> {
        let certificate = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            params.namespace
        );
        write(output_dir.join("root-ca.crt"), &certificate)?;
        write(output_dir.join("combined-ca.crt"), &certificate)?;
        write(
            output_dir.join("admin.kubeconfig"),
            &format!(
                "apiVersion: v1\nkind: Config\nclusters:\n- cluster:\n    server: https://{}:{}\n",
                params.external_api_dns_name, params.external_api_port
            ),
        )
    }
}

#[async_trait]
impl IgnitionGenerator for MockToolkit {
    async fn generate_ignition(
        &self,
        _params: &ClusterParams,
        ssh_public_key: &str,
        _pull_secret: &Path,
        _pki_dir: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let path = output_dir.join(IGNITION_FILE_NAME);
        let ignition = json!({
            "ignition": { "version": "2.2.0" },
            "passwd": { "users": [{ "name": "core", "sshAuthorizedKeys": [ssh_public_key] }] }
        });
        write(path.clone(), &ignition.to_string())?;
        Ok(path)
    }
}

#[async_trait]
impl ManifestRenderer for MockToolkit {
    async fn render(
        &self,
        params: &ClusterParams,
        _pull_secret: &Path,
        _pki_dir: &Path,
        output_dir: &Path,
    ) -> Result<()> {
        self.rendered.lock().unwrap().push(params.clone());
        write(
            output_dir.join(RENDERED_MANIFEST),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: kube-apiserver\n",
        )?;
        for excluded in EXCLUDED_MANIFESTS {
            write(
                output_dir.join(excluded),
                "apiVersion: v1\nkind: Service\nmetadata:\n  name: placeholder\n",
            )?;
        }
        Ok(())
    }
}

/// Records the files of every apply attempt and fails the first `failures` of them. When given a
/// management cluster, a successful apply creates the worker machine set and its user data there.
#[derive(Debug, Default)]
pub(crate) struct MockApplier {
    failures: Mutex<u32>,
    pub(crate) attempts: Mutex<Vec<Vec<String>>>,
    management: Option<MockManagementCluster>,
}

impl MockApplier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(failures: u32) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    pub(crate) fn applying_to(management: &MockManagementCluster) -> Self {
        Self {
            management: Some(management.clone()),
            ..Self::default()
        }
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// The files seen by the last attempt.
    pub(crate) fn last_files(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

fn read_json(path: PathBuf) -> Result<Value> {
    let content = std::fs::read_to_string(&path).map_err(|source| Error::File {
        action: "read".to_string(),
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| Error::Manifest {
        path,
        reason: e.to_string(),
    })
}

fn object_name(object: &Value) -> String {
    object["metadata"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ManifestApplier for MockApplier {
    async fn apply(&self, _namespace: &str, dir: &Path) -> Result<()> {
        let mut files: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        self.attempts.lock().unwrap().push(files);

        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Manifest {
                    path: dir.to_path_buf(),
                    reason: "the server is currently unable to handle the request".to_string(),
                });
            }
        }

        if let Some(management) = &self.management {
            let machine_set = read_json(dir.join("machineset.json"))?;
            let user_data = read_json(dir.join("machine-user-data.json"))?;
            let mut state = management.state();
            state
                .machine_sets
                .insert(object_name(&machine_set), machine_set);
            state
                .secrets
                .insert(key(MACHINE_API_NAMESPACE, &object_name(&user_data)));
        }
        Ok(())
    }
}

pub(crate) fn condition(name: &str, status: Option<&str>) -> ConditionStatus {
    ConditionStatus {
        name: name.to_string(),
        status: status.map(str::to_string),
    }
}

pub(crate) fn pod(name: &str, phase: &str) -> PodStatus {
    PodStatus {
        name: name.to_string(),
        phase: Some(phase.to_string()),
    }
}

#[derive(Debug, Default)]
struct ProbeScript {
    unhealthy_polls: usize,
    bootstrap: Vec<Vec<PodStatus>>,
    nodes: Vec<Vec<ConditionStatus>>,
    operators: Vec<ConditionStatus>,
    polls: BTreeMap<&'static str, usize>,
    connected_to: Option<String>,
    namespace: Option<String>,
    /// Pods of other namespaces, only visible to a probe connected to that namespace.
    namespaced_pods: Vec<(String, PodStatus)>,
}

/// Returns scripted observations. Each sequence advances by one entry per poll and then keeps
/// returning its last entry.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockProbe {
    script: Arc<Mutex<ProbeScript>>,
}

fn scripted<T: Clone>(sequence: &[Vec<T>], poll: usize) -> Vec<T> {
    sequence
        .get(poll)
        .or_else(|| sequence.last())
        .cloned()
        .unwrap_or_default()
}

impl MockProbe {
    /// A cluster that is ready from the first poll.
    pub(crate) fn ready(nodes: usize) -> Self {
        let probe = Self::default();
        {
            let mut script = probe.script.lock().unwrap();
            script.bootstrap = vec![vec![pod("manifests-bootstrapper", "Succeeded")]];
            script.nodes = vec![(0..nodes)
                .map(|i| condition(&format!("ip-10-0-140-{}", i), Some("True")))
                .collect()];
            script.operators = vec![
                condition("kube-apiserver", Some("True")),
                condition("ingress", Some("True")),
            ];
        }
        probe
    }

    pub(crate) fn unhealthy_for(self, polls: usize) -> Self {
        self.script.lock().unwrap().unhealthy_polls = polls;
        self
    }

    pub(crate) fn with_bootstrap(self, sequence: Vec<Vec<PodStatus>>) -> Self {
        self.script.lock().unwrap().bootstrap = sequence;
        self
    }

    pub(crate) fn with_pod_in(self, namespace: &str, pod: PodStatus) -> Self {
        self.script
            .lock()
            .unwrap()
            .namespaced_pods
            .push((namespace.to_string(), pod));
        self
    }

    pub(crate) fn with_nodes(self, sequence: Vec<Vec<ConditionStatus>>) -> Self {
        self.script.lock().unwrap().nodes = sequence;
        self
    }

    pub(crate) fn with_operators(self, operators: Vec<ConditionStatus>) -> Self {
        self.script.lock().unwrap().operators = operators;
        self
    }

    pub(crate) fn polls(&self, what: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .polls
            .get(what)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn connected_to(&self) -> Option<String> {
        self.script.lock().unwrap().connected_to.clone()
    }

    pub(crate) fn namespace(&self) -> Option<String> {
        self.script.lock().unwrap().namespace.clone()
    }

    /// Count a poll of `what` and return how many came before it.
    fn poll(&self, what: &'static str) -> usize {
        let mut script = self.script.lock().unwrap();
        let count = script.polls.entry(what).or_default();
        *count += 1;
        *count - 1
    }
}

#[async_trait]
impl ClusterProbe for MockProbe {
    async fn api_healthy(&self) -> Result<bool> {
        let poll = self.poll("api");
        Ok(poll >= self.script.lock().unwrap().unhealthy_polls)
    }

    async fn bootstrap_pods(&self) -> Result<Vec<PodStatus>> {
        let poll = self.poll("bootstrap");
        let script = self.script.lock().unwrap();
        let mut pods = scripted(&script.bootstrap, poll);
        pods.extend(
            script
                .namespaced_pods
                .iter()
                .filter(|(namespace, _)| script.namespace.as_ref() == Some(namespace))
                .map(|(_, pod)| pod.clone()),
        );
        Ok(pods)
    }

    async fn node_conditions(&self) -> Result<Vec<ConditionStatus>> {
        let poll = self.poll("nodes");
        Ok(scripted(&self.script.lock().unwrap().nodes, poll))
    }

    async fn operator_conditions(&self) -> Result<Vec<ConditionStatus>> {
        self.poll("operators");
        Ok(self.script.lock().unwrap().operators.clone())
    }
}

#[async_trait]
impl ProbeConnector for MockProbe {
    async fn connect(
        &self,
        namespace: &str,
        api_dns_name: &str,
        pki_dir: &Path,
    ) -> Result<Box<dyn ClusterProbe>> {
        assert!(pki_dir.join("root-ca.crt").is_file());
        let mut script = self.script.lock().unwrap();
        script.connected_to = Some(api_dns_name.to_string());
        script.namespace = Some(namespace.to_string());
        drop(script);
        Ok(Box::new(self.clone()))
    }
}
