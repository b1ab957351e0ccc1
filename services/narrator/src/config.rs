use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the narrator service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Image classification service configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Speech synthesis service configuration
    #[serde(default)]
    pub speech: SpeechConfig,
    /// Upload validation configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding both the photos and the synthesized audio
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Base URL used to build public object addresses (CDN, website endpoint)
    pub public_base_url: Option<String>,
    /// Send a public-read canned ACL with every upload.
    /// Disable for buckets with ACLs turned off that grant access by policy.
    #[serde(default = "default_true")]
    pub public_read_acl: bool,
    /// Send `If-None-Match: *` so an upload never replaces an existing object
    #[serde(default = "default_true")]
    pub conditional_writes: bool,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Clarifai classification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Clarifai API base URL
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    /// Clarifai API key
    #[serde(default)]
    pub api_key: String,
    /// Model used for predictions
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Request timeout in seconds
    #[serde(default = "default_client_timeout_secs")]
    pub timeout_secs: u64,
}

/// Google Cloud Text-to-Speech configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Text-to-Speech API base URL
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,
    /// Google API key
    #[serde(default)]
    pub api_key: String,
    /// BCP-47 language code of the voice
    #[serde(default = "default_language_code")]
    pub language_code: String,
    /// Request timeout in seconds
    #[serde(default = "default_client_timeout_secs")]
    pub timeout_secs: u64,
}

/// Upload validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted photo in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Accepted content type prefixes (empty = all)
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
    /// Label spoken when the classifier returns no concepts.
    /// When unset, such submissions are rejected.
    pub fallback_label: Option<String>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "narrator-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_classifier_base_url() -> String {
    "https://api.clarifai.com".to_string()
}

fn default_model_id() -> String {
    "foodcam".to_string()
}

fn default_speech_base_url() -> String {
    "https://texttospeech.googleapis.com".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_client_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_content_types() -> Vec<String> {
    vec!["image/".to_string()]
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "narrator-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(
                config::File::with_name("config/narrator")
                    .required(false)
            )
            .add_source(
                config::File::with_name("/etc/narrator/narrator")
                    .required(false)
            )
            // Override with environment variables
            // NARRATOR__S3__BUCKET -> s3.bucket
            .add_source(environment())
            // Variables understood by earlier deployments
            .set_override_option("s3.bucket", std::env::var("CLOUD_STORAGE_BUCKET").ok())?
            .set_override_option("classifier.api_key", std::env::var("CLARIFAI_API_KEY").ok())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.s3.bucket.trim().is_empty() {
            anyhow::bail!("s3.bucket must be set (NARRATOR__S3__BUCKET or CLOUD_STORAGE_BUCKET)");
        }
        if self.s3.part_size_bytes < 5 * 1024 * 1024 {
            anyhow::bail!("s3.part_size_bytes must be at least 5MB");
        }
        if self.upload.max_upload_bytes == 0 {
            anyhow::bail!("upload.max_upload_bytes must be greater than zero");
        }
        Ok(())
    }
}

/// Keys read from the environment as comma-separated lists
const LIST_KEYS: &[&str] = &["upload.allowed_content_types", "api.cors_origins"];

/// `NARRATOR__*` environment source
fn environment() -> config::Environment {
    LIST_KEYS.iter().fold(
        config::Environment::with_prefix("NARRATOR")
            .separator("__")
            .try_parsing(true)
            .list_separator(","),
        |env, key| env.with_list_parse_key(key),
    )
}

impl DatabaseConfig {
    /// Pool acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Idle connection timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ClassifierConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SpeechConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            api_key: String::new(),
            model_id: default_model_id(),
            timeout_secs: default_client_timeout_secs(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: default_speech_base_url(),
            api_key: String::new(),
            language_code: default_language_code(),
            timeout_secs: default_client_timeout_secs(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            allowed_content_types: default_allowed_content_types(),
            fallback_label: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl S3Config {
    /// Minimal configuration for a bucket with AWS defaults
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            public_base_url: None,
            public_read_acl: true,
            conditional_writes: true,
            multipart_threshold_bytes: default_multipart_threshold(),
            part_size_bytes: default_part_size(),
        }
    }
}
