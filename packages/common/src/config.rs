use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Settings for the assembly-pipeline dispatch strategy.
///
/// Import and store steps run on the remote side with these credentials,
/// so the assembly service needs no standing access to the bucket beyond
/// what is embedded per submission.
#[derive(Debug, Deserialize, Clone)]
pub struct AssemblyConfig {
    /// Base URL of the assembly orchestration API.
    pub endpoint: String,
    /// API key sent with each assembly submission.
    pub auth_key: String,
    /// Object-store bucket the import/store steps read from and write to.
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Process-wide transformation settings.
///
/// Constructed once and passed to the engine; per-owner endpoint overrides
/// are resolved at dispatch time through a separate hook, not by mutating
/// this value.
#[derive(Debug, Deserialize, Clone)]
pub struct TransformConfig {
    /// Default transformation-API endpoint. Overridable per owning record.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Address dispatch payload URLs with time-limited signatures instead
    /// of stable paths. Required when the remote processor has no
    /// credentialed access to the bucket. Default: false.
    #[serde(default)]
    pub use_presigned_urls: bool,
    /// Presigned URL validity in seconds. Default: 3600.
    #[serde(default = "default_presigned_url_expiration")]
    pub presigned_url_expiration: u64,
    /// Client-side timeout for dispatch HTTP calls, in seconds. Default: 30.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Delay between completion polls, in milliseconds. Default: 500.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum completion polls before giving up a blocking wait. Default: 120.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Present when the assembly-pipeline strategy is deployed.
    #[serde(default)]
    pub assembly: Option<AssemblyConfig>,
}

fn default_endpoint() -> String {
    "http://localhost:8080".into()
}
fn default_presigned_url_expiration() -> u64 {
    3600
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_max_polls() -> u32 {
    120
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            use_presigned_urls: false,
            presigned_url_expiration: default_presigned_url_expiration(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            assembly: None,
        }
    }
}

impl TransformConfig {
    /// Load from `config/config.toml`, then override from environment
    /// variables (e.g. `DARKROOM__TRANSFORM__ENDPOINT`).
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config/config").required(false))
            .add_source(Environment::with_prefix("DARKROOM").separator("__"))
            .build()?;

        match s.get::<Self>("transform") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}
