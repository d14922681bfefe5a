use std::time::Duration;

use framemux_frame::{StreamId, DEFAULT_MAX_PAYLOAD};

use crate::error::{MuxError, Result};

/// What the read pump does with a frame for an identifier nobody opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownStreamPolicy {
    /// Skip exactly the frame's payload and move on.
    #[default]
    Discard,
    /// Create the stream and queue it for [`Mux::accept`](crate::Mux::accept).
    Lazy,
}

/// Multiplexer behavior configuration.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Largest payload per frame, both directions. Writes are split at this
    /// size; incoming frames above it break the mux. Default: 16 MiB.
    pub max_frame_payload: usize,
    /// Handling of frames for unopened streams. Default: discard.
    pub unknown_stream_policy: UnknownStreamPolicy,
    /// Default limit on how long a read waits for data. Default: none.
    pub read_timeout: Option<Duration>,
    /// Default limit on how long a write waits for the writer token.
    /// Default: none.
    pub write_timeout: Option<Duration>,
    /// Send a zero-length frame this often to detect a dead connection.
    /// Default: disabled.
    pub keepalive_interval: Option<Duration>,
    /// Stream id stamped on keepalive probes. Default: 0.
    pub keepalive_stream: StreamId,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_frame_payload: DEFAULT_MAX_PAYLOAD,
            unknown_stream_policy: UnknownStreamPolicy::Discard,
            read_timeout: None,
            write_timeout: None,
            keepalive_interval: None,
            keepalive_stream: 0,
        }
    }
}

impl MuxConfig {
    /// Override the per-frame payload limit.
    pub fn with_max_frame_payload(mut self, max: usize) -> Self {
        self.max_frame_payload = max;
        self
    }

    /// Override the unknown-stream policy.
    pub fn with_unknown_stream_policy(mut self, policy: UnknownStreamPolicy) -> Self {
        self.unknown_stream_policy = policy;
        self
    }

    /// Override the default read timeout.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the default writer-token timeout.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Enable or disable keepalive probes.
    pub fn with_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Reject limits the mux cannot honor. `Mux::with_config` runs this too.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_payload == 0 {
            return Err(MuxError::InvalidConfig("max_frame_payload must be non-zero"));
        }
        if self.max_frame_payload > i64::MAX as usize {
            return Err(MuxError::InvalidConfig(
                "max_frame_payload exceeds the length field",
            ));
        }
        if self.keepalive_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(MuxError::InvalidConfig(
                "keepalive_interval must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = MuxConfig::default();
        assert_eq!(cfg.max_frame_payload, DEFAULT_MAX_PAYLOAD);
        assert_eq!(cfg.unknown_stream_policy, UnknownStreamPolicy::Discard);
        assert!(cfg.read_timeout.is_none());
        assert!(cfg.keepalive_interval.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builders_apply() {
        let cfg = MuxConfig::default()
            .with_max_frame_payload(64)
            .with_unknown_stream_policy(UnknownStreamPolicy::Lazy)
            .with_read_timeout(Some(Duration::from_secs(1)))
            .with_write_timeout(Some(Duration::from_secs(2)))
            .with_keepalive(Some(Duration::from_secs(3)));

        assert_eq!(cfg.max_frame_payload, 64);
        assert_eq!(cfg.unknown_stream_policy, UnknownStreamPolicy::Lazy);
        assert_eq!(cfg.read_timeout, Some(Duration::from_secs(1)));
        assert_eq!(cfg.write_timeout, Some(Duration::from_secs(2)));
        assert_eq!(cfg.keepalive_interval, Some(Duration::from_secs(3)));
    }

    #[test]
    fn rejects_unusable_values() {
        let zero_payload = MuxConfig::default().with_max_frame_payload(0);
        assert!(matches!(
            zero_payload.validate(),
            Err(MuxError::InvalidConfig(_))
        ));

        let zero_keepalive = MuxConfig::default().with_keepalive(Some(Duration::ZERO));
        assert!(matches!(
            zero_keepalive.validate(),
            Err(MuxError::InvalidConfig(_))
        ));
    }
}
