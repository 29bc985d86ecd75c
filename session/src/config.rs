use std::path::PathBuf;

use anyhow::bail;

/// Timing and persistence knobs of the session engine. The defaults match
/// the service's production expectations; tests shrink them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum gap between connect attempts (millis).
    pub connect_retry_interval: i64,

    /// Minimum gap between bind attempts while offline (millis).
    pub login_retry_interval: i64,

    /// Idle time after which a ping is emitted (millis).
    pub ping_interval: i64,

    /// How long a double-direction frame may go unanswered before the
    /// socket is reset (millis).
    pub response_timeout: i64,

    /// Age after which an unacknowledged packet is surfaced as a
    /// send-timeout (millis).
    pub ack_timeout: i64,

    /// Base directory for the resource persistence file. Defaults to the
    /// executable's directory.
    pub resource_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_retry_interval: 10_000,
            login_retry_interval: 5_000,
            ping_interval: 15_000,
            response_timeout: 10_000,
            ack_timeout: 10_000,
            resource_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_retry_interval < 0
            || self.login_retry_interval < 0
            || self.ping_interval <= 0
            || self.response_timeout <= 0
            || self.ack_timeout <= 0
        {
            bail!("session intervals must be positive");
        }
        Ok(())
    }
}
