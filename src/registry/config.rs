//! Registry configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::WebRtcConfig;

/// Session registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory capture files are written to
    pub output_dir: PathBuf,

    /// Capture file name prefix; the peer id and `.ivf` follow it
    pub output_prefix: String,

    /// File served to subscribe-from-file sessions
    pub playback_path: PathBuf,

    /// ICE server URLs handed to the negotiation agent
    pub ice_servers: Vec<String>,

    /// Interval between keyframe requests on receiving tracks
    pub keepalive_interval: Duration,

    /// Relay track broadcast queue capacity
    pub relay_capacity: usize,

    /// Per-session command and transport event queue capacity
    pub session_queue_capacity: usize,

    /// End the process once a publishing session ends
    pub exit_on_capture_end: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            output_prefix: "output-".to_string(),
            playback_path: PathBuf::from("test.ivf"),
            ice_servers: Vec::new(),
            keepalive_interval: Duration::from_secs(3),
            relay_capacity: 512,
            session_queue_capacity: 64,
            exit_on_capture_end: false,
        }
    }
}

impl RegistryConfig {
    /// Set the capture output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the capture file prefix
    pub fn output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    /// Set the playback file
    pub fn playback_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.playback_path = path.into();
        self
    }

    /// Set ICE server URLs
    pub fn ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Set keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set relay broadcast capacity
    pub fn relay_capacity(mut self, capacity: usize) -> Self {
        self.relay_capacity = capacity;
        self
    }

    /// End the process when a publishing session ends
    pub fn exit_on_capture_end(mut self, enabled: bool) -> Self {
        self.exit_on_capture_end = enabled;
        self
    }

    /// Capture file for `peer_id`
    pub fn capture_path(&self, peer_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.ivf", self.output_prefix, sanitize(peer_id)))
    }

    /// Negotiation agent configuration derived from these options
    pub fn webrtc_config(&self) -> WebRtcConfig {
        WebRtcConfig::new().ice_servers(self.ice_servers.clone())
    }

    pub fn playback(&self) -> &Path {
        &self.playback_path
    }
}

/// Percent-escape path separators so distinct peer ids never share a file
/// and none escapes the output directory
fn sanitize(peer_id: &str) -> String {
    let mut out = String::with_capacity(peer_id.len());
    for c in peer_id.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '\0' => out.push_str("%00"),
            c => out.push(c),
        }
    }
    out
}
