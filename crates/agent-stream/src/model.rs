use std::fmt;

use crate::decode::InvalidBytePolicy;
use crate::errors::AgentStreamError;

/// Stable identifier for an agent runtime (for example `cost-estimator`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RuntimeId(pub String);

impl RuntimeId {
    /// Creates a runtime id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the runtime id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuntimeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RuntimeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Options for a reconciled stream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReconcileOptions {
    /// Bounded event buffer size used by the streaming channel.
    pub stream_buffer_capacity: usize,
    /// Handling of bytes that can never decode as UTF-8.
    pub invalid_bytes: InvalidBytePolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            stream_buffer_capacity: 128,
            invalid_bytes: InvalidBytePolicy::Drop,
        }
    }
}

impl ReconcileOptions {
    /// Sets the channel capacity between the reconciler task and the consumer.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Sets the invalid byte policy used when decoding raw responses.
    pub fn invalid_bytes(mut self, policy: InvalidBytePolicy) -> Self {
        self.invalid_bytes = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), AgentStreamError> {
        if self.stream_buffer_capacity == 0 {
            return Err(AgentStreamError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_options_default_buffer_capacity() {
        let options = ReconcileOptions::default();
        assert_eq!(options.stream_buffer_capacity, 128);
        assert_eq!(options.invalid_bytes, InvalidBytePolicy::Drop);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ReconcileOptions::default()
            .stream_buffer_capacity(0)
            .validate()
            .expect_err("zero capacity");
        assert!(matches!(err, AgentStreamError::Validation(msg) if msg.contains("stream_buffer_capacity")));
    }
}
