use crate::twoface::{DescribeErr, ExternalError, Fallible};
use serde::Deserialize;

/// Config, read from the TOML file named on the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// <address>:<port> to serve userfacing endpoints
    pub listen_address: String,

    /// <address>:<port> to serve metrics on
    pub metrics_address: String,

    /// By default, output JSON logs. Only if this flag is set to true, output colourful human-friendly logs
    #[serde(default)]
    pub human_logs: bool,

    /// Max HTTP body size the API accepts. Post bodies carry a base64 image, so this is large.
    #[serde(default = "max_body_size")]
    pub max_body_size: usize,

    /// Max size of a decoded image upload.
    #[serde(default = "max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// How many posts the home feed shows.
    #[serde(default = "feed_limit")]
    pub feed_limit: u32,

    /// Seconds a cached feed is served before it's fetched again.
    #[serde(default = "feed_stale_secs")]
    pub feed_stale_secs: u64,

    /// Seconds a cached current-user lookup is served before it's fetched again.
    #[serde(default = "current_user_stale_secs")]
    pub current_user_stale_secs: u64,

    /// Most sessions whose user lookup is cached at once. The least recently used is dropped first.
    #[serde(default = "query_cache_capacity")]
    pub query_cache_capacity: usize,

    pub backend: BackendConfig,
}

/// Where the hosted backend lives, and which of its databases/buckets/collections we use.
#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    /// e.g. https://cloud.appwrite.io/v1
    pub endpoint: String,
    pub project_id: String,
    /// Server key for database and storage calls. Never logged.
    pub api_key: String,
    pub database_id: String,
    pub storage_id: String,
    pub users_collection_id: String,
    pub posts_collection_id: String,
    pub saves_collection_id: String,
    #[serde(default = "request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .field("api_key", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("storage_id", &self.storage_id)
            .field("users_collection_id", &self.users_collection_id)
            .field("posts_collection_id", &self.posts_collection_id)
            .field("saves_collection_id", &self.saves_collection_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_file(filepath: &str) -> Fallible<Self> {
        let contents = std::fs::read_to_string(filepath).describe_err(ExternalError {
            text: "Couldn't read from config file",
            ..Default::default()
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Fallible<Self> {
        toml::from_str(contents).describe_err(ExternalError {
            text: "Couldn't parse config file",
            ..Default::default()
        })
    }
}

fn max_body_size() -> usize {
    65536 * 160
}

fn max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn feed_limit() -> u32 {
    20
}

fn feed_stale_secs() -> u64 {
    10
}

fn current_user_stale_secs() -> u64 {
    30
}

fn query_cache_capacity() -> usize {
    10_000
}

fn request_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_toml(
        r#"
        listen_address = "127.0.0.1:8080"
        metrics_address = "127.0.0.1:9090"

        [backend]
        endpoint = "https://backend.test/v1"
        project_id = "snapgram"
        api_key = "secret-key"
        database_id = "main"
        storage_id = "media"
        users_collection_id = "users"
        posts_collection_id = "posts"
        saves_collection_id = "saves"
        "#,
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        let config = test_config();
        assert!(!config.human_logs);
        assert_eq!(config.feed_limit, 20);
        assert_eq!(config.feed_stale_secs, 10);
        assert_eq!(config.query_cache_capacity, 10_000);
        assert_eq!(config.backend.request_timeout_secs, 30);
    }

    #[test]
    fn test_api_key_is_redacted() {
        let config = test_config();
        let debugged = format!("{:?}", config);
        assert!(!debugged.contains("secret-key"));
    }

    #[test]
    fn test_missing_backend_table_is_an_error() {
        let err = Config::from_toml("listen_address = \"a\"\nmetrics_address = \"b\"").unwrap_err();
        assert_eq!(err.to_string(), "ServerError: Couldn't parse config file");
    }
}
