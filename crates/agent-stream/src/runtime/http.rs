use futures::StreamExt as _;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::errors::{AgentStreamError, UpstreamError};
use crate::model::RuntimeId;
use crate::response::{ByteStream, ContentType};

use super::config::RuntimeClientConfig;
use super::{AgentRuntime, InvocationRequest, RuntimeResponse};

pub(crate) const SESSION_ID_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
pub(crate) const TRACE_ID_HEADER: &str = "X-Amzn-Trace-Id";

/// Runtime client that invokes an agent over HTTP and streams the body.
pub struct HttpRuntimeClient {
    client: reqwest::Client,
    config: RuntimeClientConfig,
}

impl HttpRuntimeClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: RuntimeClientConfig) -> Result<Self, AgentStreamError> {
        if config.invocation_url.trim().is_empty() {
            return Err(AgentStreamError::Config(
                "runtime client config invocation_url must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentStreamError::Config(format!("failed to build runtime client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client using `AGENT_RUNTIME_*` environment variables.
    pub fn from_env() -> Result<Self, AgentStreamError> {
        Self::new(RuntimeClientConfig::from_env()?)
    }

    fn build_request(&self, request: &InvocationRequest) -> reqwest::RequestBuilder {
        let mut http_req = self
            .client
            .post(&self.config.invocation_url)
            .header(SESSION_ID_HEADER, request.session_id.as_str())
            .header(TRACE_ID_HEADER, request.session_id.trace_id())
            .json(&request.payload);
        if let Some(token) = &self.config.bearer_token {
            http_req = http_req.bearer_auth(token);
        }
        http_req
    }
}

#[async_trait::async_trait]
impl AgentRuntime for HttpRuntimeClient {
    fn id(&self) -> RuntimeId {
        self.config.runtime_id.clone()
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<RuntimeResponse, UpstreamError> {
        let runtime = self.id();
        debug!(runtime = %runtime, session_id = %request.session_id, "invoking agent runtime");

        let response = self.build_request(&request).send().await.map_err(|e| {
            UpstreamError::transport(runtime.clone(), format!("runtime request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(UpstreamError::runtime(
                runtime,
                format!("runtime invocation failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ContentType::classify)
            .unwrap_or_else(|| ContentType::Other(String::new()));
        debug!(runtime = %runtime, ?content_type, "runtime response started");

        let read_runtime = runtime.clone();
        let body: ByteStream = Box::pin(response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                UpstreamError::transport(
                    read_runtime.clone(),
                    format!("runtime streaming read failed: {e}"),
                )
            })
        }));

        Ok(RuntimeResponse {
            runtime,
            content_type,
            body,
        })
    }
}
