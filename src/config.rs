//! Configuration types for seqfetch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Sequencer behavior (how long a node waits for its turn per attempt)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Bounded wait for the sink handoff, in milliseconds (default: 5000)
    ///
    /// A node that has not received the sink within this window buffers the
    /// bytes it was given and returns control to its producer, which keeps
    /// reading its own source and retries acquisition on the next write.
    #[serde(default = "default_handoff_wait_ms")]
    pub handoff_wait_ms: u64,
}

impl SequencerConfig {
    /// The handoff wait as a [`Duration`]
    pub fn handoff_wait(&self) -> Duration {
        Duration::from_millis(self.handoff_wait_ms)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            handoff_wait_ms: default_handoff_wait_ms(),
        }
    }
}

/// HTTP client configuration used by [`HttpFetcher`](crate::fetch::HttpFetcher)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    /// TCP/TLS connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout including the body (default: none)
    ///
    /// Left unset by default: a task may legitimately stream for a long time
    /// while it waits for its predecessors.
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for a seqfetch run
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Ordering/handoff settings
    #[serde(default)]
    pub sequencer: SequencerConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the chain cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sequencer.handoff_wait_ms == 0 {
            return Err(Error::Config {
                message: "handoff wait must be greater than zero".to_string(),
                key: Some("sequencer.handoff_wait_ms".to_string()),
            });
        }
        if self.http.connect_timeout.is_zero() {
            return Err(Error::Config {
                message: "connect timeout must be greater than zero".to_string(),
                key: Some("http.connect_timeout".to_string()),
            });
        }
        if self.http.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config {
                message: "request timeout must be greater than zero when set".to_string(),
                key: Some("http.request_timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn default_handoff_wait_ms() -> u64 {
    5_000
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("seqfetch/{}", env!("CARGO_PKG_VERSION"))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
