/*!

`hypershift-utils` is a collection of functions shared by the `hypershift-aws` library and its
command line interface.
`aws` builds the SDK configuration used by every AWS client from credentials that were
discovered on the management cluster.

!*/

use constants::DEFAULT_LEVEL_FILTER;
use env_logger::Builder;
pub use error::{Error, Result};
use log::LevelFilter;
use snafu::ResultExt;
use std::path::Path;
use std::process::Output;
use std::{env, fs};

pub mod aws;
pub mod constants;
mod error;

/// Read the file at `path` and return its contents as a base64 string.
pub fn base64_encode_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let bytes = fs::read(path).context(error::ReadFileSnafu { path })?;
    Ok(base64::encode(bytes))
}

/// Extract the value of `RUST_LOG` if it exists, otherwise log this application at
/// `DEFAULT_LEVEL_FILTER` (or `log_level` when given).
pub fn init_logger(bin_crate: &str, log_level: Option<LevelFilter>) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level except AWS SDK and kube.
            let log_level = log_level.unwrap_or(DEFAULT_LEVEL_FILTER);
            Builder::new()
                // Set log level to Error for crates other than our own.
                .filter_level(LevelFilter::Error)
                // Set all of our crates to the desired level.
                .filter(Some(bin_crate), log_level)
                .filter(Some("hypershift_aws"), log_level)
                .filter(Some("hypershift_utils"), log_level)
                .init();
        }
    }
}

/// Implement `Display` using `serde_json` `to_string_pretty` for types that implement Serialize.
#[macro_export]
macro_rules! impl_display_as_json {
    ($i:ident) => {
        impl std::fmt::Display for $i {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = serde_json::to_string_pretty(self)
                    .unwrap_or_else(|e| format!("Serialization failed: {}", e));
                std::fmt::Display::fmt(&s, f)
            }
        }
    };
}

/// If the command was successful (exit code zero), returns the command's `stdout`. Otherwise
/// returns an error carrying both output streams.
/// - `output`: the `Output` object from a `std::process::Command`
/// - `hint`: the command that was executed, e.g. `hypershift pki`
pub fn command_output(output: Output, hint: &str) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        Ok(stdout.to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error::CommandFailedSnafu {
            hint,
            code: output.status.code().unwrap_or(-1),
            stderr,
            stdout,
        }
        .fail()
    }
}
