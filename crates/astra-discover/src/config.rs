use std::collections::HashMap;

use crate::DiscoverError;

#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    /// Base URL of the location service, e.g. `http://discovery:7070`.
    pub endpoint: String,
    pub timeout_ms: u64,
    /// Sent with every registration.
    pub metadata: HashMap<String, String>,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7070".to_string(),
            timeout_ms: 2_000,
            metadata: HashMap::new(),
        }
    }
}

impl DiscoverConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), DiscoverError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(DiscoverError::InvalidConfig(format!(
                "endpoint must be an http(s) url, got {:?}",
                self.endpoint
            )));
        }
        if self.timeout_ms == 0 {
            return Err(DiscoverError::InvalidConfig("timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
