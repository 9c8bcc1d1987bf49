use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Manifests could not be applied after {} attempts: {}", attempts, source))]
    ApplyFailed {
        attempts: u32,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("AWS request '{}' failed: {}", operation, source))]
    AwsRequest {
        operation: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[snafu(display("The response to AWS request '{}' was missing '{}'", operation, what))]
    AwsResponse { operation: String, what: String },

    #[snafu(display("Unable to hash the kubeadmin password: {}", source))]
    Bcrypt { source: bcrypt::BcryptError },

    #[snafu(display("The CIDR '{}' cannot be advanced without exceeding the address space", cidr))]
    CidrExhausted { cidr: String },

    #[snafu(display("Unable to start '{}': {}", command, source))]
    CommandStart {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to {} '{}': {}", action, path.display(), source))]
    File {
        action: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to build an HTTP client for '{}': {}", url, source))]
    HttpClient { url: String, source: reqwest::Error },

    #[snafu(display("Invalid CIDR '{}': {}", cidr, reason))]
    InvalidCidr { cidr: String, reason: String },

    #[snafu(display("Unable to {}: {}", what, source))]
    Json {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to {}: {}", what, source))]
    Kube { what: String, source: kube::Error },

    #[snafu(display("Unable to create a kubernetes client from '{}': {}", path.display(), source))]
    Kubeconfig {
        path: PathBuf,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to infer the kubernetes client configuration: {}", source))]
    KubeInferConfig {
        source: kube::config::InferConfigError,
    },

    #[snafu(display("Unable to build a kubernetes client: {}", source))]
    KubeClient { source: kube::Error },

    #[snafu(display("Manifest '{}' is invalid: {}", path.display(), reason))]
    Manifest { path: PathBuf, reason: String },

    #[snafu(display("'{}' was missing from {}", what, from))]
    MissingField { what: String, from: String },

    #[snafu(display("Target namespace '{}' already exists on the management cluster", namespace))]
    NamespaceExists { namespace: String },

    #[snafu(display("Load balancer '{}' has no zone containing worker machines", load_balancer))]
    NoSuitableZone { load_balancer: String },

    #[snafu(display("Node '{}' reported Ready=False", node))]
    NodeNotReady { node: String },

    #[snafu(display("Cluster operator '{}' reported Available=False", operator))]
    OperatorUnavailable { operator: String },

    #[snafu(display("No {} named '{}' was found", kind, name))]
    ResourceNotFound { kind: String, name: String },

    #[snafu(display("Failed to {}: {}", step, source))]
    Step {
        step: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Timed out after {:?} waiting for {}", duration, what))]
    Timeout {
        what: String,
        duration: Duration,
        source: tokio::time::error::Elapsed,
    },

    #[snafu(display("Expected pod '{}' but observed pod '{}'", expected, name))]
    UnexpectedPod { expected: String, name: String },

    #[snafu(display("{} is not valid UTF-8: {}", what, source))]
    Utf8 {
        what: String,
        source: std::string::FromUtf8Error,
    },

    #[snafu(context(false), display("{}", source))]
    Utils { source: hypershift_utils::Error },

    #[snafu(display("Unable to {}: {}", what, source))]
    Yaml {
        what: String,
        source: serde_yaml::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Converts SDK results into `Error::AwsRequest`, naming the operation that failed.
pub(crate) trait AwsResultExt<T> {
    fn aws_context<S>(self, operation: S) -> Result<T>
    where
        S: Into<String>;
}

impl<T, E> AwsResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn aws_context<S>(self, operation: S) -> Result<T>
    where
        S: Into<String>,
    {
        self.map_err(|e| Error::AwsRequest {
            operation: operation.into(),
            source: Box::new(e),
        })
    }
}
