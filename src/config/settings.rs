//! Process-wide settings, constructed once and passed down.

use serde::{Deserialize, Serialize};

/// Default control-plane polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Default deployment region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Fixed deployment id used when `USE_FIXED_DEPLOYMENT_PREFIX` is set.
pub const FIXED_DEPLOYMENT_ID: &str = "default";

/// Runtime settings for the deployment core.
///
/// Constructed once at process start (or by a test) and passed by
/// reference into every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Control-plane API endpoint.
    pub endpoint: String,
    /// Control-plane API token.
    pub api_token: String,
    /// Default region for deployments.
    pub region: String,
    /// Seconds between event polls.
    pub poll_interval_secs: u64,
    /// Forces a constant deployment id for local testing.
    pub use_fixed_deployment_prefix: bool,
    /// Demo/fast-path configuration, present only when `DEMO_MODE` is set.
    pub demo: Option<DemoConfig>,
}

/// Demo-mode configuration.
///
/// When present, role synthesis returns a reference to these
/// pre-provisioned identity resources instead of creating new ones,
/// skipping the 30-90s propagation delay of fresh grants. The compute
/// image is pinned to `image_id` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Name of the pre-provisioned role.
    pub role_name: String,
    /// Name of the pre-provisioned instance profile.
    pub profile_name: String,
    /// Optional pre-baked machine image id.
    pub image_id: Option<String>,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// Recognized variables: `FOUNDRY_ENDPOINT`, `FOUNDRY_API_TOKEN`,
    /// `FOUNDRY_REGION`, `FOUNDRY_POLL_INTERVAL_SECS`, `DEMO_MODE`,
    /// `DEMO_ROLE_NAME`, `DEMO_PROFILE_NAME`, `DEMO_IMAGE_ID`,
    /// `USE_FIXED_DEPLOYMENT_PREFIX`.
    #[must_use]
    pub fn from_env() -> Self {
        let demo = if env_flag("DEMO_MODE") {
            Some(DemoConfig {
                role_name: std::env::var("DEMO_ROLE_NAME")
                    .unwrap_or_else(|_| String::from("foundry-demo-role")),
                profile_name: std::env::var("DEMO_PROFILE_NAME")
                    .unwrap_or_else(|_| String::from("foundry-demo-profile")),
                image_id: std::env::var("DEMO_IMAGE_ID").ok(),
            })
        } else {
            None
        };

        Self {
            endpoint: std::env::var("FOUNDRY_ENDPOINT")
                .unwrap_or_else(|_| String::from("http://localhost:9440")),
            api_token: std::env::var("FOUNDRY_API_TOKEN").unwrap_or_default(),
            region: std::env::var("FOUNDRY_REGION")
                .unwrap_or_else(|_| String::from(DEFAULT_REGION)),
            poll_interval_secs: std::env::var("FOUNDRY_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            use_fixed_deployment_prefix: env_flag("USE_FIXED_DEPLOYMENT_PREFIX"),
            demo,
        }
    }

    /// Returns true when demo mode is active.
    #[must_use]
    pub const fn demo_mode(&self) -> bool {
        self.demo.is_some()
    }

    /// Resolves the deployment id for a new deployment.
    ///
    /// Honors `USE_FIXED_DEPLOYMENT_PREFIX` so repeated local test runs
    /// land on the same stack.
    #[must_use]
    pub fn resolve_deployment_id(&self, requested: Option<&str>) -> String {
        if self.use_fixed_deployment_prefix {
            return String::from(FIXED_DEPLOYMENT_ID);
        }
        requested.map_or_else(
            || format!("foundry-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            String::from,
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://localhost:9440"),
            api_token: String::new(),
            region: String::from(DEFAULT_REGION),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            use_fixed_deployment_prefix: false,
            demo: None,
        }
    }
}

/// Interprets an environment variable as a boolean flag.
fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| {
        matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.region, DEFAULT_REGION);
        assert_eq!(settings.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert!(!settings.demo_mode());
    }

    #[test]
    fn test_fixed_prefix_wins() {
        let settings = Settings {
            use_fixed_deployment_prefix: true,
            ..Settings::default()
        };
        assert_eq!(settings.resolve_deployment_id(Some("custom")), "default");
        assert_eq!(settings.resolve_deployment_id(None), "default");
    }

    #[test]
    fn test_requested_id_respected() {
        let settings = Settings::default();
        assert_eq!(settings.resolve_deployment_id(Some("prod-42")), "prod-42");
    }

    #[test]
    fn test_generated_id_has_prefix() {
        let settings = Settings::default();
        let id = settings.resolve_deployment_id(None);
        assert!(id.starts_with("foundry-"));
    }
}
