//! Job descriptors and their persisted wire form.
//!
//! A `JobDescriptor` is the self-contained unit of work stored in the
//! durable queue: the staged directory to scan, where to deliver the
//! result, and how long the engine may run. It is persisted as a JSON
//! object using the field names `dir`, `callback` and `to`, with the
//! timeout written as a human duration string such as `"30s"` or `"5m"`.

use crate::core::error::{QueueError, QueueResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A pending scan, as stored in the durable queue.
///
/// # Examples
///
/// ```rust
/// use scanspool::core::JobDescriptor;
/// use std::time::Duration;
///
/// let job = JobDescriptor::new("/tmp/x", "http://example.test/cb", Duration::from_secs(2)).unwrap();
/// let bytes = job.encode().unwrap();
/// assert_eq!(JobDescriptor::decode(&bytes).unwrap(), job);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Unique job identifier, used for logging.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Absolute path of the staged, already extracted scan target.
    #[serde(rename = "dir")]
    pub directory: PathBuf,

    /// URL that receives the scan result.
    #[serde(default)]
    pub callback: String,

    /// Upper bound on the engine invocation.
    #[serde(rename = "to", with = "duration_str")]
    pub timeout: Duration,

    /// Number of failed attempts so far.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,

    /// When the job was first queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl JobDescriptor {
    /// Creates a validated descriptor with a fresh id.
    pub fn new(
        directory: impl Into<PathBuf>,
        callback: impl Into<String>,
        timeout: Duration,
    ) -> QueueResult<Self> {
        let job = Self {
            id: uuid::Uuid::new_v4().to_string(),
            directory: directory.into(),
            callback: callback.into(),
            timeout,
            attempts: 0,
            enqueued_at: None,
        };
        job.validate()?;
        Ok(job)
    }

    /// Checks the invariants every queued descriptor must hold.
    pub fn validate(&self) -> QueueResult<()> {
        if self.directory.as_os_str().is_empty() || !self.directory.is_absolute() {
            return Err(QueueError::invalid_job(format!(
                "directory must be an absolute path, got '{}'",
                self.directory.display()
            )));
        }
        if self.callback.trim().is_empty() {
            return Err(QueueError::invalid_job(
                "callback is required for queued jobs",
            ));
        }
        if self.timeout.is_zero() {
            return Err(QueueError::invalid_job("timeout must be positive"));
        }
        Ok(())
    }

    /// Returns the staged directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stamps the enqueue time if it is not already set.
    pub fn with_enqueued_now(mut self) -> Self {
        if self.enqueued_at.is_none() {
            self.enqueued_at = Some(Utc::now());
        }
        self
    }

    /// Returns a copy for another attempt, with the attempt counter bumped.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }

    /// Serializes the descriptor to its queue representation.
    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| QueueError::invalid_job(e.to_string()))
    }

    /// Parses a queue record back into a descriptor.
    ///
    /// Malformed JSON, an unparseable duration and records that break the
    /// descriptor invariants all fail with `QueueError::Decode`.
    pub fn decode(bytes: &[u8]) -> QueueResult<Self> {
        let job: Self =
            serde_json::from_slice(bytes).map_err(|e| QueueError::decode(e.to_string()))?;
        job.validate()
            .map_err(|e| QueueError::decode(e.to_string()))?;
        Ok(job)
    }
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Serde adapter writing durations as `humantime` strings.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional `humantime` durations.
pub(crate) mod option_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.collect_str(&humantime::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => humantime::parse_duration(raw.trim())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
