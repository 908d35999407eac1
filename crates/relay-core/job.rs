use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single unit of work. Serialized as one JSON object and passed around as
/// bytes everywhere it travels through Redis; optional fields are omitted on
/// write but accepted whether present or missing on read, so a fleet with
/// mixed versions in flight can always parse each other's jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub t: i64,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub fails: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<i64>,
    /// Periodic-job deadline: if set and wall clock has passed it by the
    /// time this entry is promoted off a scored set, the firing is dropped
    /// instead of run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl Job {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Job {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            t: Utc::now().timestamp(),
            args,
            fails: 0,
            err: None,
            failed_at: None,
            d: None,
            unique: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_deadline(mut self, deadline: i64) -> Self {
        self.d = Some(deadline);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Is this entry's periodic deadline in the past relative to `now`?
    pub fn is_stale(&self, now: i64) -> bool {
        matches!(self.d, Some(d) if now > d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_omitted_when_absent() {
        let job = Job::new("email", serde_json::json!({"to": "x"}));
        let bytes = job.to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("\"err\""));
        assert!(!text.contains("\"failed_at\""));
        assert!(!text.contains("\"d\""));
        assert!(!text.contains("\"unique\""));
    }

    #[test]
    fn round_trips_with_failure_fields_set() {
        let mut job = Job::new("email", serde_json::json!({}));
        job.fails = 2;
        job.err = Some("boom".into());
        job.failed_at = Some(1000);
        let bytes = job.to_bytes().unwrap();
        let back = Job::from_bytes(&bytes).unwrap();
        assert_eq!(job, back);
    }

    #[test]
    fn deserializes_job_missing_all_optional_fields() {
        let raw = br#"{"id":"a","name":"x","t":1}"#;
        let job = Job::from_bytes(raw).unwrap();
        assert_eq!(job.fails, 0);
        assert_eq!(job.err, None);
        assert!(!job.unique);
    }

    #[test]
    fn is_stale_checks_deadline() {
        let job = Job::new("p", serde_json::json!({})).with_deadline(100);
        assert!(job.is_stale(101));
        assert!(!job.is_stale(100));
        assert!(!job.is_stale(99));
    }

    #[test]
    fn job_without_deadline_is_never_stale() {
        let job = Job::new("p", serde_json::json!({}));
        assert!(!job.is_stale(i64::MAX));
    }
}
