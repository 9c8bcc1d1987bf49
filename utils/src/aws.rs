use crate::constants::SDK_MAX_ATTEMPTS;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_smithy_types::retry::{RetryConfig, RetryMode};
use aws_types::region::Region;
use aws_types::SdkConfig;
use log::info;
use std::fmt::{Debug, Formatter};

/// Static credentials read from the management cluster.
#[derive(Clone, Eq, PartialEq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Debug for AwsCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

/// Set up the config for aws calls using static `credentials` in `region`.
pub async fn aws_config(credentials: &AwsCredentials, region: &str) -> SdkConfig {
    info!(
        "Creating a custom region provider for '{}' to be used in the aws config.",
        region
    );
    let provider = SharedCredentialsProvider::new(Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        None,
        None,
        "management-cluster",
    ));
    aws_config::from_env()
        .retry_config(
            RetryConfig::standard()
                .with_retry_mode(RetryMode::Adaptive)
                .with_max_attempts(SDK_MAX_ATTEMPTS),
        )
        .credentials_provider(provider)
        .region(Region::new(region.to_string()))
        .load()
        .await
}

#[test]
fn credentials_debug_hides_secret() {
    let credentials = AwsCredentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI".to_string(),
    };
    let debug = format!("{:?}", credentials);
    assert!(debug.contains("AKIDEXAMPLE"));
    assert!(!debug.contains("wJalrXUtnFEMI"));
}
