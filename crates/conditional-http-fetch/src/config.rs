use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "remote-file-cache/0.1";

/// HTTP client settings for [`ConditionalHttpFetchBackend`](crate::ConditionalHttpFetchBackend)
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Maximum time between receiving data from the server
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpBackendConfig {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub(crate) fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .user_agent(&self.user_agent)
            .build()
    }
}
