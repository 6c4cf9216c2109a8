use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_cloudformation::config::Region;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved AWS configuration, loaded once per process
#[derive(Debug, Clone)]
pub struct AwsSession {
    config: SdkConfig,
}

impl AwsSession {
    /// Loads credentials and region from the environment and shared config,
    /// with optional explicit overrides
    ///
    /// Every API call attempt is bounded by `timeout`.
    pub async fn load(region: Option<&str>, profile: Option<&str>, timeout: Duration) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .operation_attempt_timeout(timeout)
            .build();
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        tracing::debug!(region = ?config.region(), "Loaded AWS configuration");
        Self { config }
    }

    pub fn from_config(config: SdkConfig) -> Self {
        Self { config }
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region().map(|r| r.as_ref())
    }
}
