use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Connection and encoding parameters of the relay
#[derive(Clone, Serialize)]
pub struct RelayConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub password: String,
    pub mount: String,
    pub name: String,
    pub description: String,
    pub genre: String,
    /// kbit/s
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u8,
    /// Cap of the pending ring while disconnected (bytes)
    pub max_buffer_size: usize,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// Delay after which a still-running encoder is considered connected
    pub connect_grace: Duration,
    pub ffmpeg_path: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 8001,
            password: "hackme".to_string(),
            mount: "/radio.mp3".to_string(),
            name: "MRadio".to_string(),
            description: "MRadio Stream".to_string(),
            genre: "Various".to_string(),
            bitrate: 128,
            sample_rate: 44_100,
            channels: 2,
            max_buffer_size: 1024 * 1024,
            max_reconnect_attempts: 10,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(30),
            connect_grace: Duration::from_millis(2000),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"***")
            .field("mount", &self.mount)
            .field("name", &self.name)
            .field("bitrate", &self.bitrate)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

impl RelayConfig {
    /// Source-client ingest URL, including credentials
    pub fn icecast_url(&self) -> String {
        let mount = if self.mount.starts_with('/') {
            self.mount.clone()
        } else {
            format!("/{}", self.mount)
        };
        format!(
            "icecast://source:{}@{}:{}{}",
            self.password, self.host, self.port, mount
        )
    }

    /// Same URL with the password masked, for logs
    pub fn display_url(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.mount)
    }

    /// Delay before reconnect attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_delay
            .saturating_mul(attempt)
            .min(self.max_reconnect_delay)
    }
}
