use std::fmt;

use chrono::NaiveDateTime;
use tracing::{error, info};

use crate::decode::InvalidBytePolicy;
use crate::errors::AgentStreamError;
use crate::runtime::{AgentRuntime, InvocationRequest};

/// Runtimes reject session ids shorter than this.
pub const MIN_SESSION_ID_LEN: usize = 16;
/// Trace ids longer than this are truncated.
pub const MAX_TRACE_ID_LEN: usize = 128;

/// Session id shared by every invocation of one logical conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RuntimeSessionId(String);

impl RuntimeSessionId {
    /// Wraps an existing id after checking its length.
    pub fn new(value: impl Into<String>) -> Result<Self, AgentStreamError> {
        let value = value.into();
        let len = value.chars().count();
        if len < MIN_SESSION_ID_LEN {
            return Err(AgentStreamError::Validation(format!(
                "session id must be at least {MIN_SESSION_ID_LEN} characters, got {len}"
            )));
        }
        Ok(Self(value))
    }

    /// Builds `<user_id>_<YYYYmmdd_HHMMSS>_<suffix>` from the local clock.
    pub fn generate(user_id: &str, suffix: &str) -> Result<Self, AgentStreamError> {
        Self::at(user_id, suffix, chrono::Local::now().naive_local())
    }

    /// Same as [`RuntimeSessionId::generate`] with an explicit timestamp.
    pub fn at(
        user_id: &str,
        suffix: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Self, AgentStreamError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AgentStreamError::Validation(
                "user id must not be empty".into(),
            ));
        }
        let stamp = timestamp.format("%Y%m%d_%H%M%S");
        let id = if suffix.is_empty() {
            format!("{user_id}_{stamp}")
        } else {
            format!("{user_id}_{stamp}_{suffix}")
        };
        Self::new(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trace id derived from the session id, capped at [`MAX_TRACE_ID_LEN`]
    /// characters.
    pub fn trace_id(&self) -> &str {
        match self.0.char_indices().nth(MAX_TRACE_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RuntimeSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one invocation inside [`invoke_all`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success { result: String },
    Error { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InvocationRecord {
    /// 1-based position in the prompt list.
    pub invocation_number: usize,
    pub prompt: String,
    #[serde(flatten)]
    pub outcome: InvocationOutcome,
}

/// Summary of several invocations made in one session.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionReport {
    pub session_id: RuntimeSessionId,
    pub user_id: String,
    pub total_invocations: usize,
    pub results: Vec<InvocationRecord>,
}

impl SessionReport {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, InvocationOutcome::Success { .. }))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total_invocations
    }
}

/// Sends each prompt to the runtime in order, reusing one session id.
///
/// A failed invocation is recorded and the loop moves on to the next prompt.
pub async fn invoke_all<P>(
    runtime: &dyn AgentRuntime,
    session_id: &RuntimeSessionId,
    user_id: &str,
    prompts: &[P],
    policy: InvalidBytePolicy,
) -> SessionReport
where
    P: AsRef<str>,
{
    let runtime_id = runtime.id();
    info!(runtime = %runtime_id, session_id = %session_id, user_id, invocations = prompts.len(), "starting session invocations");

    let mut results = Vec::with_capacity(prompts.len());
    for (idx, prompt) in prompts.iter().enumerate() {
        let invocation_number = idx + 1;
        let prompt = prompt.as_ref();
        let request = InvocationRequest::prompt(session_id.clone(), prompt);

        let outcome = match runtime.invoke(request).await {
            Ok(response) => match response.into_text(policy).await {
                Ok(result) => InvocationOutcome::Success { result },
                Err(err) => InvocationOutcome::Error {
                    error: err.to_string(),
                },
            },
            Err(err) => InvocationOutcome::Error {
                error: err.to_string(),
            },
        };

        match &outcome {
            InvocationOutcome::Success { .. } => {
                info!(runtime = %runtime_id, invocation_number, "invocation completed");
            }
            InvocationOutcome::Error { error } => {
                error!(runtime = %runtime_id, invocation_number, %error, "invocation failed");
            }
        }
        results.push(InvocationRecord {
            invocation_number,
            prompt: prompt.to_string(),
            outcome,
        });
    }

    SessionReport {
        session_id: session_id.clone(),
        user_id: user_id.to_string(),
        total_invocations: prompts.len(),
        results,
    }
}
