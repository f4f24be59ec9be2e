//! Signaling client configuration

use std::time::Duration;

/// Signaling client configuration options
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Rendezvous service URL
    pub url: String,

    /// Our device id; doubles as the room we announce
    pub device_id: String,

    /// Wait before retrying a failed or dropped connection
    pub reconnect_delay: Duration,

    /// Re-announce the room at this interval until it is acknowledged
    pub room_retry_interval: Duration,

    /// Capacity of the queue carrying session replies to the channel
    pub outbox_capacity: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:10900/ws".to_string(),
            device_id: "123".to_string(),
            reconnect_delay: Duration::from_secs(2),
            room_retry_interval: Duration::from_secs(3),
            outbox_capacity: 256,
        }
    }
}

impl SignalingConfig {
    /// Create a new config for the given service URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set device id
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    /// Set reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set room retry interval
    pub fn room_retry_interval(mut self, interval: Duration) -> Self {
        self.room_retry_interval = interval;
        self
    }

    /// Set outbox capacity
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SignalingConfig::default();

        assert_eq!(config.device_id, "123");
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.room_retry_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_builder() {
        let config = SignalingConfig::with_url("ws://rendezvous:9000")
            .device_id("cam-1")
            .reconnect_delay(Duration::from_millis(500));

        assert_eq!(config.url, "ws://rendezvous:9000");
        assert_eq!(config.device_id, "cam-1");
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
    }
}
