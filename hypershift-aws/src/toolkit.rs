/*!

The install delegates certificate generation, node boot configuration and control plane
manifest rendering to the `hypershift` toolkit. Each step is a trait so the orchestrator can be
driven by any implementation; [`ToolkitCommand`] runs the toolkit binary.

`ToolkitCommand` expects a binary with three subcommands, each reading the cluster parameters
from the YAML file passed with `--config`:

- `pki --output-dir DIR` writes the control plane certificates, keys and kubeconfigs.
- `ignition --ssh-key-file FILE --pull-secret FILE --pki-dir DIR --output-dir DIR` writes the
  worker boot configuration. Ignition generation is a subcommand of this toolkit only, the
  upstream `hypershift` binary has no counterpart.
- `render --pull-secret FILE --pki-dir DIR --output-dir DIR` writes the control plane manifests.

!*/

use crate::constants::IGNITION_FILE_NAME;
use crate::error::{self, Result};
use crate::params::ClusterParams;
use async_trait::async_trait;
use hypershift_utils::command_output;
use log::{debug, info};
use snafu::ResultExt;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

#[async_trait]
pub trait PkiGenerator: Send + Sync {
    /// Write the certificates, keys and kubeconfigs of the control plane into `output_dir`.
    /// Files that already exist are kept.
    async fn generate_pki(&self, params: &ClusterParams, output_dir: &Path) -> Result<()>;
}

#[async_trait]
pub trait IgnitionGenerator: Send + Sync {
    /// Write the worker boot configuration into `output_dir` and return its path.
    async fn generate_ignition(
        &self,
        params: &ClusterParams,
        ssh_public_key: &str,
        pull_secret: &Path,
        pki_dir: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf>;
}

#[async_trait]
pub trait ManifestRenderer: Send + Sync {
    /// Write the control plane manifests into `output_dir`.
    async fn render(
        &self,
        params: &ClusterParams,
        pull_secret: &Path,
        pki_dir: &Path,
        output_dir: &Path,
    ) -> Result<()>;
}

/// Runs the toolkit binary, passing the parameters as a `cluster.yaml` file.
#[derive(Clone, Debug)]
pub struct ToolkitCommand {
    binary: PathBuf,
}

impl ToolkitCommand {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn write_params(&self, params: &ClusterParams) -> Result<NamedTempFile> {
        let content = serde_yaml::to_string(params).context(error::YamlSnafu {
            what: "serialize cluster parameters",
        })?;
        temp_file("cluster", ".yaml", content.as_bytes())
    }

    fn run<I, S>(&self, subcommand: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let hint = format!("{} {}", self.binary.display(), subcommand);
        info!("Running '{}'", hint);
        let output = Command::new(&self.binary)
            .arg(subcommand)
            .args(args)
            .output()
            .context(error::CommandStartSnafu { command: &hint })?;
        let stdout = command_output(output, &hint)?;
        debug!("'{}' output:\n{}", hint, stdout);
        Ok(stdout)
    }
}

fn temp_file(prefix: &str, suffix: &str, content: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .context(error::FileSnafu {
            action: "create",
            path: std::env::temp_dir(),
        })?;
    file.write_all(content).context(error::FileSnafu {
        action: "write",
        path: file.path(),
    })?;
    Ok(file)
}

#[async_trait]
impl PkiGenerator for ToolkitCommand {
    async fn generate_pki(&self, params: &ClusterParams, output_dir: &Path) -> Result<()> {
        let config = self.write_params(params)?;
        self.run(
            "pki",
            [
                OsStr::new("--config"),
                config.path().as_os_str(),
                OsStr::new("--output-dir"),
                output_dir.as_os_str(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl IgnitionGenerator for ToolkitCommand {
    async fn generate_ignition(
        &self,
        params: &ClusterParams,
        ssh_public_key: &str,
        pull_secret: &Path,
        pki_dir: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let config = self.write_params(params)?;
        let ssh_key = temp_file("ssh-key", ".pub", ssh_public_key.as_bytes())?;
        self.run(
            "ignition",
            [
                OsStr::new("--config"),
                config.path().as_os_str(),
                OsStr::new("--ssh-key-file"),
                ssh_key.path().as_os_str(),
                OsStr::new("--pull-secret"),
                pull_secret.as_os_str(),
                OsStr::new("--pki-dir"),
                pki_dir.as_os_str(),
                OsStr::new("--output-dir"),
                output_dir.as_os_str(),
            ],
        )?;
        Ok(output_dir.join(IGNITION_FILE_NAME))
    }
}

#[async_trait]
impl ManifestRenderer for ToolkitCommand {
    async fn render(
        &self,
        params: &ClusterParams,
        pull_secret: &Path,
        pki_dir: &Path,
        output_dir: &Path,
    ) -> Result<()> {
        let config = self.write_params(params)?;
        self.run(
            "render",
            [
                OsStr::new("--config"),
                config.path().as_os_str(),
                OsStr::new("--pull-secret"),
                pull_secret.as_os_str(),
                OsStr::new("--pki-dir"),
                pki_dir.as_os_str(),
                OsStr::new("--output-dir"),
                output_dir.as_os_str(),
            ],
        )?;
        Ok(())
    }
}
