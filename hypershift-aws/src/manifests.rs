//! Objects created for every install in addition to the rendered control plane manifests.
//!
//! Objects that belong to the hosted cluster itself are wrapped in user-manifest config maps,
//! which the control plane's manifest bootstrapper applies once the hosted API is up.

use crate::constants::{
    IGNITION_OBJECT_KEY, MACHINE_API_NAMESPACE, PULL_SECRET_NAME, ROUTER_HTTPS_PORT,
    ROUTER_HTTP_PORT, ROUTER_NODE_PORT_HTTP, ROUTER_NODE_PORT_HTTPS, WORKER_REPLICAS,
};
use crate::error::{self, Result};
use crate::params::KubeadminPassword;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use maplit::btreemap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use snafu::{OptionExt, ResultExt};
use std::path::Path;

const MACHINE_SET_LABEL: &str = "machine.openshift.io/cluster-api-machineset";
const USER_MANIFEST_PREFIX: &str = "user-manifest-";
const USER_MANIFEST_KEY: &str = "data";
const KUBEADMIN_PASSWORD_SECRET: &str = "kubeadmin-password";
const ADMIN_KUBECONFIG_SECRET: &str = "admin-kubeconfig";
const OAUTH_BRANDING_SECRET: &str = "oauth-openshift-branding";
const ROUTER_SELECTOR: &str = "ingresscontroller.operator.openshift.io/deployment-ingresscontroller";

const LOGIN_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Log in</title></head>
  <body>
    <form action="{{ .Action }}" method="POST">
      <input type="hidden" name="{{ .Names.Then }}" value="{{ .Values.Then }}">
      <input type="hidden" name="{{ .Names.CSRF }}" value="{{ .Values.CSRF }}">
      {{ if .Error }}<p>{{ .Error }}</p>{{ end }}
      <input type="text" name="{{ .Names.Username }}" value="{{ .Values.Username }}" autofocus>
      <input type="password" name="{{ .Names.Password }}" value="">
      <button type="submit">Log in</button>
    </form>
  </body>
</html>
"#;

/// Inputs for [`write_install_manifests`].
pub struct InstallManifests<'a> {
    /// The full JSON of the management cluster machine set the workers are copied from.
    pub machine_set_template: &'a Value,
    pub worker_machine_set: &'a str,
    pub user_data_secret: &'a str,
    pub router_load_balancer: &'a str,
    pub ignition_bucket: &'a str,
    pub kubeadmin: &'a KubeadminPassword,
    pub admin_kubeconfig: &'a str,
    pub pull_secret: &'a str,
}

/// Write every per-install manifest into `dir` as JSON.
pub fn write_install_manifests(dir: &Path, inputs: &InstallManifests<'_>) -> Result<()> {
    write_manifest(
        dir,
        "machineset.json",
        &worker_machine_set(
            inputs.machine_set_template,
            inputs.worker_machine_set,
            inputs.user_data_secret,
            inputs.router_load_balancer,
        )?,
    )?;
    write_manifest(
        dir,
        "machine-user-data.json",
        &user_data_secret(inputs.user_data_secret, inputs.ignition_bucket)?,
    )?;
    write_manifest(
        dir,
        "kubeadmin-password-secret.json",
        &kubeadmin_password_secret(&inputs.kubeadmin.password),
    )?;
    write_manifest(
        dir,
        "user-manifest-kubeadmin-password.json",
        &user_manifest("kubeadmin-password", &kubeadmin_hash_secret(&inputs.kubeadmin.hash))?,
    )?;
    write_manifest(
        dir,
        "admin-kubeconfig-secret.json",
        &admin_kubeconfig_secret(inputs.admin_kubeconfig),
    )?;
    write_manifest(
        dir,
        "user-manifest-pull-secret.json",
        &user_manifest("pull-secret", &hosted_pull_secret(inputs.pull_secret))?,
    )?;
    write_manifest(
        dir,
        "user-manifest-router-service.json",
        &user_manifest("router-service", &router_service())?,
    )?;
    write_manifest(dir, "oauth-branding-secret.json", &oauth_branding_secret())
}

fn write_manifest<T: Serialize>(dir: &Path, file_name: &str, object: &T) -> Result<()> {
    let path = dir.join(file_name);
    let content = serde_json::to_vec_pretty(object).context(error::JsonSnafu {
        what: format!("serialize '{}'", file_name),
    })?;
    std::fs::write(&path, content).context(error::FileSnafu {
        action: "write",
        path,
    })
}

fn object_at<'a>(value: &'a mut Value, pointer: &str) -> Result<&'a mut Map<String, Value>> {
    value
        .pointer_mut(pointer)
        .and_then(Value::as_object_mut)
        .context(error::MissingFieldSnafu {
            what: pointer,
            from: "template machineset",
        })
}

/// Copy `template` into a new machine set called `name` whose machines boot from
/// `user_data_secret` and join the router load balancer.
pub fn worker_machine_set(
    template: &Value,
    name: &str,
    user_data_secret: &str,
    router_load_balancer: &str,
) -> Result<Value> {
    let mut machine_set = template.clone();
    object_at(&mut machine_set, "")?.remove("status");

    let metadata = object_at(&mut machine_set, "/metadata")?;
    for server_set in &[
        "creationTimestamp",
        "generation",
        "managedFields",
        "resourceVersion",
        "selfLink",
        "uid",
    ] {
        metadata.remove(*server_set);
    }
    metadata.insert("name".to_string(), json!(name));

    object_at(&mut machine_set, "/spec")?.insert("replicas".to_string(), json!(WORKER_REPLICAS));
    object_at(&mut machine_set, "/spec/selector/matchLabels")?
        .insert(MACHINE_SET_LABEL.to_string(), json!(name));
    object_at(&mut machine_set, "/spec/template/metadata/labels")?
        .insert(MACHINE_SET_LABEL.to_string(), json!(name));
    object_at(&mut machine_set, "/spec/template/spec")?.remove("metadata");

    let provider = object_at(&mut machine_set, "/spec/template/spec/providerSpec/value")?;
    provider.remove("publicIp");
    provider.insert(
        "userDataSecret".to_string(),
        json!({ "name": user_data_secret }),
    );
    provider.insert(
        "loadBalancers".to_string(),
        json!([{ "name": router_load_balancer, "type": "network" }]),
    );
    Ok(machine_set)
}

/// The Ignition stub that makes new workers fetch their real config from the bucket.
pub fn worker_user_data(bucket: &str) -> Result<String> {
    let source = format!("https://{}.s3.amazonaws.com/{}", bucket, IGNITION_OBJECT_KEY);
    serde_json::to_string(&json!({
        "ignition": {
            "config": { "append": [{ "source": source, "verification": {} }] },
            "security": {},
            "timeouts": {},
            "version": "2.2.0"
        },
        "networkd": {},
        "passwd": {},
        "storage": {},
        "systemd": {}
    }))
    .context(error::JsonSnafu {
        what: "serialize worker user data",
    })
}

pub fn user_data_secret(name: &str, bucket: &str) -> Result<Secret> {
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(MACHINE_API_NAMESPACE.to_string()),
            ..Default::default()
        },
        string_data: Some(btreemap! {
            "disableTemplating".to_string() => "true".to_string(),
            "userData".to_string() => worker_user_data(bucket)?,
        }),
        ..Default::default()
    })
}

fn kubeadmin_password_secret(password: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(KUBEADMIN_PASSWORD_SECRET.to_string()),
            ..Default::default()
        },
        string_data: Some(btreemap! {
            "password".to_string() => password.to_string(),
        }),
        ..Default::default()
    }
}

fn kubeadmin_hash_secret(hash: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("kubeadmin".to_string()),
            namespace: Some("kube-system".to_string()),
            ..Default::default()
        },
        string_data: Some(btreemap! {
            "kubeadmin".to_string() => hash.to_string(),
        }),
        ..Default::default()
    }
}

fn admin_kubeconfig_secret(kubeconfig: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(ADMIN_KUBECONFIG_SECRET.to_string()),
            ..Default::default()
        },
        string_data: Some(btreemap! {
            "kubeconfig".to_string() => kubeconfig.to_string(),
        }),
        ..Default::default()
    }
}

fn hosted_pull_secret(dockerconfigjson: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(PULL_SECRET_NAME.to_string()),
            namespace: Some("openshift-config".to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        string_data: Some(btreemap! {
            ".dockerconfigjson".to_string() => dockerconfigjson.to_string(),
        }),
        ..Default::default()
    }
}

/// The hosted cluster's default router, exposed on the node ports the router load balancer
/// targets.
fn router_service() -> Service {
    let port = |name: &str, port: i32, node_port: i32| ServicePort {
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        port,
        target_port: Some(IntOrString::String(name.to_string())),
        node_port: Some(node_port),
        ..Default::default()
    };
    Service {
        metadata: ObjectMeta {
            name: Some("router-default".to_string()),
            namespace: Some("openshift-ingress".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(btreemap! {
                ROUTER_SELECTOR.to_string() => "default".to_string(),
            }),
            ports: Some(vec![
                port("http", ROUTER_HTTP_PORT, ROUTER_NODE_PORT_HTTP),
                port("https", ROUTER_HTTPS_PORT, ROUTER_NODE_PORT_HTTPS),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn oauth_branding_secret() -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(OAUTH_BRANDING_SECRET.to_string()),
            ..Default::default()
        },
        string_data: Some(btreemap! {
            "login.html".to_string() => LOGIN_TEMPLATE.to_string(),
        }),
        ..Default::default()
    }
}

/// Wrap `object` in the config map the manifest bootstrapper applies to the hosted cluster.
pub fn user_manifest<T: Serialize>(name: &str, object: &T) -> Result<ConfigMap> {
    let content = serde_json::to_vec(object).context(error::JsonSnafu {
        what: format!("serialize user manifest '{}'", name),
    })?;
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(format!("{}{}", USER_MANIFEST_PREFIX, name)),
            ..Default::default()
        },
        data: Some(btreemap! {
            USER_MANIFEST_KEY.to_string() => base64::encode(content),
        }),
        ..Default::default()
    })
}
