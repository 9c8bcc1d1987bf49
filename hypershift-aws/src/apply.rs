use crate::constants::{APPLY_ATTEMPTS, APPLY_BACKOFF, FIELD_MANAGER, MAX_APPLY_MANIFEST_BYTES};
use crate::error::{self, Error, Result};
use crate::management::AllowNotFound;
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams, ResourceExt};
use kube::core::GroupVersionKind;
use kube::discovery::{Discovery, Scope};
use kube::Client;
use log::{debug, info, warn};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};

/// Converges every object in a directory of manifests.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Apply all manifests in `dir`. Namespaced objects without a namespace go to `namespace`.
    async fn apply(&self, namespace: &str, dir: &Path) -> Result<()>;
}

/// Apply `dir` with `applier`, retrying the whole directory a fixed number of times.
///
/// The files named in `exclude` are deleted from `dir` first.
pub async fn apply_manifests(
    applier: &dyn ManifestApplier,
    namespace: &str,
    dir: &Path,
    exclude: &[&str],
) -> Result<()> {
    for file_name in exclude {
        let path = dir.join(file_name);
        if path.is_file() {
            debug!("Excluding '{}' from apply", path.display());
            tokio::fs::remove_file(&path)
                .await
                .context(error::FileSnafu {
                    action: "remove",
                    path: &path,
                })?;
        }
    }

    let mut attempt = 1;
    loop {
        match applier.apply(namespace, dir).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < APPLY_ATTEMPTS => {
                warn!(
                    "Applying manifests failed (attempt {} of {}), retrying in {:?}: {}",
                    attempt, APPLY_ATTEMPTS, APPLY_BACKOFF, e
                );
                attempt += 1;
                tokio::time::sleep(APPLY_BACKOFF).await;
            }
            Err(e) => {
                return Err::<(), Error>(e).context(error::ApplyFailedSnafu {
                    attempts: APPLY_ATTEMPTS,
                })
            }
        }
    }
}

/// The `.yaml`, `.yml` and `.json` files in `dir`, sorted by name.
pub(crate) fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).context(error::FileSnafu {
        action: "list",
        path: dir,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .context(error::FileSnafu {
                action: "list",
                path: dir,
            })?
            .path();
        let is_manifest = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| matches!(extension, "yaml" | "yml" | "json"))
            .unwrap_or_default();
        if is_manifest && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every non-empty document of a manifest file. JSON files are single YAML documents.
pub(crate) fn parse_manifest(path: &Path, content: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).context(error::YamlSnafu {
            what: format!("parse '{}'", path.display()),
        })?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_yaml::from_value(value).context(error::YamlSnafu {
            what: format!("read an object from '{}'", path.display()),
        })?;
        objects.push(object);
    }
    Ok(objects)
}

fn group_version_kind(path: &Path, object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().context(error::ManifestSnafu {
        path,
        reason: "missing apiVersion or kind",
    })?;
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Server-side applies manifests with kube-rs, resolving kinds through API discovery.
pub struct KubeApplier {
    client: Client,
}

impl KubeApplier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_object(
        &self,
        discovery: &Discovery,
        namespace: &str,
        path: &Path,
        object: &DynamicObject,
        create_only: bool,
    ) -> Result<()> {
        let gvk = group_version_kind(path, object)?;
        let (resource, capabilities) =
            discovery
                .resolve_gvk(&gvk)
                .context(error::ManifestSnafu {
                    path,
                    reason: format!("unknown kind '{}' in '{}'", gvk.kind, gvk.api_version()),
                })?;
        let name = object.metadata.name.as_deref().context(error::ManifestSnafu {
            path,
            reason: "missing metadata.name",
        })?;
        let api: Api<DynamicObject> = match capabilities.scope {
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
            Scope::Namespaced => Api::namespaced_with(
                self.client.clone(),
                object.namespace().as_deref().unwrap_or(namespace),
                &resource,
            ),
        };
        let what = format!("apply {} '{}' from '{}'", gvk.kind, name, path.display());
        if create_only {
            // Too large for the last-applied annotation.
            if api
                .create(&PostParams::default(), object)
                .await
                .allow_already_exists()
                .context(error::KubeSnafu { what })?
                .is_none()
            {
                debug!("{} '{}' already exists", gvk.kind, name);
            }
        } else {
            api.patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(object),
            )
            .await
            .context(error::KubeSnafu { what })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ManifestApplier for KubeApplier {
    async fn apply(&self, namespace: &str, dir: &Path) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .context(error::KubeSnafu {
                what: "discover API resources",
            })?;
        let files = manifest_files(dir)?;
        info!("Applying {} manifests from '{}'", files.len(), dir.display());
        for path in files {
            let content = tokio::fs::read_to_string(&path)
                .await
                .context(error::FileSnafu {
                    action: "read",
                    path: &path,
                })?;
            let create_only = content.len() as u64 > MAX_APPLY_MANIFEST_BYTES;
            for object in parse_manifest(&path, &content)? {
                self.apply_object(&discovery, namespace, &path, &object, create_only)
                    .await?;
            }
            debug!("Applied '{}'", path.display());
        }
        Ok(())
    }
}
