//! Job payload codec.
//!
//! Due set members are opaque JSON strings describing a unit of work. This
//! module owns the string ⇄ struct boundary; the promotion path decodes a
//! payload once, after extraction, and the sink re-encodes it when handing
//! it to a work queue.

use serde::{Deserialize, Serialize};

fn default_queue() -> String {
    "default".to_string()
}

/// A decoded job description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Worker class that will execute the job.
    pub class: String,
    /// Positional arguments, passed through untouched.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    /// Work queue the job is destined for.
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Job identifier assigned at schedule time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    /// Retry policy (bool or max attempt count, depending on the producer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<serde_json::Value>,
    /// Epoch seconds when the job was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    /// Epoch seconds when the job landed on its work queue. Stamped by the
    /// sink at push time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<f64>,
}

impl JobPayload {
    /// Decode a raw due set member.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Encode for the work queue.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_payload() {
        let raw = r#"{
            "class": "EmailWorker",
            "args": ["user-1", {"template": "welcome"}],
            "queue": "mailers",
            "jid": "b4a577edbccf1d805744efa9",
            "retry": true,
            "created_at": 1700000000.123
        }"#;
        let job = JobPayload::from_json(raw).unwrap();
        assert_eq!(job.class, "EmailWorker");
        assert_eq!(job.args.len(), 2);
        assert_eq!(job.queue, "mailers");
        assert_eq!(job.jid.as_deref(), Some("b4a577edbccf1d805744efa9"));
        assert_eq!(job.retry, Some(serde_json::Value::Bool(true)));
        assert_eq!(job.created_at, Some(1700000000.123));
        assert_eq!(job.enqueued_at, None);
    }

    #[test]
    fn test_decode_minimal_payload_defaults_queue() {
        let job = JobPayload::from_json(r#"{"class":"Cleanup"}"#).unwrap();
        assert_eq!(job.class, "Cleanup");
        assert_eq!(job.queue, "default");
        assert!(job.args.is_empty());
        assert_eq!(job.jid, None);
    }

    #[test]
    fn test_decode_rejects_non_job_json() {
        assert!(JobPayload::from_json("not json").is_err());
        assert!(JobPayload::from_json(r#"{"args":[]}"#).is_err());
    }

    #[test]
    fn test_encode_skips_unset_optionals() {
        let job = JobPayload::from_json(r#"{"class":"Cleanup"}"#).unwrap();
        let encoded = job.to_json().unwrap();
        assert!(!encoded.contains("jid"));
        assert!(!encoded.contains("enqueued_at"));
        assert!(encoded.contains(r#""queue":"default""#));
    }

    #[test]
    fn test_roundtrip_preserves_args() {
        let raw = r#"{"class":"Sum","args":[1,2,3],"queue":"math"}"#;
        let job = JobPayload::from_json(raw).unwrap();
        let back = JobPayload::from_json(&job.to_json().unwrap()).unwrap();
        assert_eq!(job, back);
    }
}
