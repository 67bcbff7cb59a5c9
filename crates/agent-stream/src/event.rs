use crate::errors::StreamFailure;
use crate::model::RuntimeId;

/// Event produced by an upstream text-generation stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Cumulative snapshot of all text produced so far.
    Data(String),
    /// Out-of-band event (metadata, tool traces, upstream error reports)
    /// forwarded without inspection.
    Passthrough(serde_json::Value),
}

impl StreamEvent {
    /// Creates a snapshot event.
    pub fn data(text: impl Into<String>) -> Self {
        Self::Data(text.into())
    }

    /// Classifies a JSON event from an agent framework.
    ///
    /// Objects carrying a `data` key are snapshots; a string payload is used
    /// as-is and any other payload is rendered as its JSON text. Every
    /// non-object value is out-of-band.
    ///
    /// Objects flagged with `"error": true` are out-of-band even when they
    /// carry `data`, unlike a bare `"data"` key check. An error report thus
    /// never enters the reconciled text nor resets its baseline; the caller
    /// decides whether it is fatal.
    pub fn from_json(value: serde_json::Value) -> Self {
        let is_error = value
            .get("error")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if is_error {
            return Self::Passthrough(value);
        }
        match value.get("data") {
            Some(serde_json::Value::String(text)) => Self::Data(text.clone()),
            Some(other) => Self::Data(other.to_string()),
            None => Self::Passthrough(value),
        }
    }
}

/// Output unit of the reconciler.
#[derive(Clone, Debug, PartialEq)]
pub enum DeltaEvent {
    /// Newly observed text. Never empty.
    Delta(String),
    /// Non-text event forwarded unchanged.
    Passthrough(serde_json::Value),
    /// Terminal marker emitted once when the upstream fails or the stream is
    /// cancelled. Nothing follows it.
    Error(StreamFailure),
}

impl DeltaEvent {
    /// Returns the delta text, if this is a text event.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Delta(text) => Some(text),
            _ => None,
        }
    }

    /// Returns true for the terminal error marker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Renders the event in the wire shape consumed by display/forwarding
    /// code: `{"data": ...}` for deltas, the original value for passthrough
    /// events, and `{"error": true, "data": <message>}` for failures.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Delta(text) => serde_json::json!({ "data": text }),
            Self::Passthrough(value) => value.clone(),
            Self::Error(failure) => serde_json::json!({
                "error": true,
                "data": failure.to_string(),
            }),
        }
    }

    /// Parses one fragment received from a runtime that streams events in
    /// the [`DeltaEvent::to_json`] shape.
    ///
    /// Non-JSON fragments and bare JSON strings are plain text. Returns
    /// `None` for fragments without text.
    pub fn from_wire(fragment: &str, runtime: &RuntimeId) -> Option<Self> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(fragment) else {
            return (!fragment.is_empty()).then(|| Self::Delta(fragment.to_owned()));
        };

        if value.get("error").and_then(|v| v.as_bool()) == Some(true) {
            let message = value
                .get("data")
                .and_then(|v| v.as_str())
                .unwrap_or("runtime reported an error")
                .to_owned();
            return Some(Self::Error(StreamFailure::Upstream {
                runtime: runtime.to_string(),
                message,
            }));
        }

        let text = match &value {
            serde_json::Value::String(text) => Some(text.as_str()),
            serde_json::Value::Object(map) => map.get("data").and_then(|v| v.as_str()),
            _ => None,
        };
        match text {
            Some("") => None,
            Some(text) => Some(Self::Delta(text.to_owned())),
            None => Some(Self::Passthrough(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_reads_string_data_as_snapshot() {
        let event = StreamEvent::from_json(serde_json::json!({"data": "Hello"}));
        assert_eq!(event, StreamEvent::data("Hello"));
    }

    #[test]
    fn from_json_renders_non_string_data() {
        let event = StreamEvent::from_json(serde_json::json!({"data": 42}));
        assert_eq!(event, StreamEvent::data("42"));
    }

    #[test]
    fn from_json_keeps_metadata_and_error_reports_out_of_band() {
        let meta = serde_json::json!({"meta": 1});
        assert_eq!(
            StreamEvent::from_json(meta.clone()),
            StreamEvent::Passthrough(meta)
        );

        let error = serde_json::json!({"error": true, "data": "tool failed"});
        assert_eq!(
            StreamEvent::from_json(error.clone()),
            StreamEvent::Passthrough(error)
        );
    }

    #[test]
    fn error_report_between_snapshots_keeps_baseline() {
        let mut state = crate::reconcile::ReconciliationState::new();
        let report = serde_json::json!({"error": true, "data": "tool failed"});
        let events = [
            serde_json::json!({"data": "Checking"}),
            report.clone(),
            serde_json::json!({"data": "Checking prices"}),
        ];
        let out: Vec<DeltaEvent> = events
            .into_iter()
            .filter_map(|value| state.step(StreamEvent::from_json(value)))
            .collect();
        assert_eq!(
            out,
            vec![
                DeltaEvent::Delta("Checking".into()),
                DeltaEvent::Passthrough(report),
                DeltaEvent::Delta(" prices".into()),
            ]
        );
    }

    #[test]
    fn error_marker_wire_shape() {
        let event = DeltaEvent::Error(StreamFailure::Upstream {
            runtime: "agent".into(),
            message: "boom".into(),
        });
        let value = event.to_json();
        assert_eq!(value.get("error").and_then(|v| v.as_bool()), Some(true));
        assert!(
            value
                .get("data")
                .and_then(|v| v.as_str())
                .is_some_and(|s| s.contains("boom"))
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn delta_wire_shape() {
        let event = DeltaEvent::Delta("hi".into());
        assert_eq!(event.to_json(), serde_json::json!({"data": "hi"}));
        assert_eq!(event.text(), Some("hi"));
    }

    #[test]
    fn from_wire_reads_runtime_events() {
        let runtime = RuntimeId::new("agent");
        assert_eq!(
            DeltaEvent::from_wire(r#"{"data": "Hi"}"#, &runtime),
            Some(DeltaEvent::Delta("Hi".into()))
        );
        assert_eq!(
            DeltaEvent::from_wire(r#""plain""#, &runtime),
            Some(DeltaEvent::Delta("plain".into()))
        );
        assert_eq!(
            DeltaEvent::from_wire("not json", &runtime),
            Some(DeltaEvent::Delta("not json".into()))
        );
        assert_eq!(DeltaEvent::from_wire(r#"{"data": ""}"#, &runtime), None);
        assert_eq!(
            DeltaEvent::from_wire(r#"{"usage": 3}"#, &runtime),
            Some(DeltaEvent::Passthrough(serde_json::json!({"usage": 3})))
        );
    }

    #[test]
    fn from_wire_round_trips_error_marker() {
        let runtime = RuntimeId::new("agent");
        let marker = DeltaEvent::Error(StreamFailure::Upstream {
            runtime: "agent".into(),
            message: "boom".into(),
        });
        let parsed = DeltaEvent::from_wire(&marker.to_json().to_string(), &runtime);
        assert!(matches!(
            parsed,
            Some(DeltaEvent::Error(StreamFailure::Upstream { message, .. })) if message.contains("boom")
        ));
    }
}
