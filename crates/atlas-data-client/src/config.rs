use crate::adapter::{DataApiError, DataApiResult};
use std::fmt;
use std::time::Duration;

pub const ENV_API_KEY: &str = "MONGODB_DATA_API_KEY";
pub const ENV_BASE_URL: &str = "MONGODB_DATA_API_BASE_URL";
pub const ENV_DATA_SOURCE: &str = "MONGODB_CLUSTER_NAME";
pub const ENV_TIMEOUT_SECS: &str = "MONGODB_DATA_API_TIMEOUT_SECS";

/// Process-wide Data API credentials and location. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct DataApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub data_source: String,
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for DataApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataApiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("data_source", &self.data_source)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl DataApiConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            data_source: data_source.into(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn from_env() -> DataApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> DataApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = Self::missing_variables(&lookup);
        if !missing.is_empty() {
            return Err(DataApiError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let read = |key: &str| non_blank(lookup(key)).unwrap_or_default();
        let mut config = Self::new(read(ENV_API_KEY), read(ENV_BASE_URL), read(ENV_DATA_SOURCE));

        if let Some(raw) = non_blank(lookup(ENV_TIMEOUT_SECS)) {
            let seconds = raw.parse::<u64>().map_err(|_| {
                DataApiError::Configuration(format!(
                    "{ENV_TIMEOUT_SECS} must be a whole number of seconds: {raw}"
                ))
            })?;
            config = config.with_request_timeout(Duration::from_secs(seconds));
        }

        config.validate()?;
        Ok(config)
    }

    /// Names of the required variables that `lookup` does not provide.
    pub fn missing_variables<F>(lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        [ENV_BASE_URL, ENV_API_KEY, ENV_DATA_SOURCE]
            .into_iter()
            .filter(|key| non_blank(lookup(key)).is_none())
            .collect()
    }

    pub fn validate(&self) -> DataApiResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(DataApiError::Configuration(
                "api key must not be empty".to_string(),
            ));
        }
        if self.data_source.trim().is_empty() {
            return Err(DataApiError::Configuration(
                "data source (cluster name) must not be empty".to_string(),
            ));
        }
        let base_url = self.base_url.trim();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(DataApiError::Configuration(format!(
                "base url must start with http:// or https://: {base_url}"
            )));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(DataApiError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
