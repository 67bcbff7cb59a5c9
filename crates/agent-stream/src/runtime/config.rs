use std::time::Duration;

use crate::errors::AgentStreamError;
use crate::model::RuntimeId;

const DEFAULT_RUNTIME_ID: &str = "agent-runtime";

/// Configuration for the HTTP runtime client.
#[derive(Clone, Debug)]
pub struct RuntimeClientConfig {
    /// Identifier used in logs and error messages.
    pub runtime_id: RuntimeId,
    /// Full invocation URL of the runtime endpoint.
    pub invocation_url: String,
    /// Optional bearer token for runtimes behind an inbound authorizer.
    pub bearer_token: Option<String>,
    /// Default HTTP timeout for requests.
    pub timeout: Duration,
}

impl RuntimeClientConfig {
    /// Creates a config with default timeout and no credentials.
    pub fn new(invocation_url: impl Into<String>) -> Self {
        Self {
            runtime_id: RuntimeId::new(DEFAULT_RUNTIME_ID),
            invocation_url: invocation_url.into(),
            bearer_token: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `AGENT_RUNTIME_URL`: required invocation URL.
    /// - `AGENT_RUNTIME_TOKEN`: optional bearer token.
    /// - `AGENT_RUNTIME_ID`: optional runtime id for logs.
    /// - `AGENT_RUNTIME_TIMEOUT_SECS`: optional request timeout.
    pub fn from_env() -> Result<Self, AgentStreamError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AgentStreamError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = non_empty("AGENT_RUNTIME_URL").ok_or_else(|| {
            AgentStreamError::Config("missing AGENT_RUNTIME_URL for runtime client".into())
        })?;
        let mut config = Self::new(url);
        if let Some(token) = non_empty("AGENT_RUNTIME_TOKEN") {
            config = config.bearer_token(token);
        }
        if let Some(id) = non_empty("AGENT_RUNTIME_ID") {
            config = config.runtime_id(id);
        }
        if let Some(raw) = non_empty("AGENT_RUNTIME_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AgentStreamError::Config(format!(
                    "AGENT_RUNTIME_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config = config.timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the runtime id used in logs.
    pub fn runtime_id(mut self, id: impl Into<RuntimeId>) -> Self {
        self.runtime_id = id.into();
        self
    }

    /// Sets the bearer token sent with every invocation.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
