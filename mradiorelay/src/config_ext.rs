//! Relay settings read from the `relay` section of mradioconfig
//!
//! The source password may be stored sealed (`encrypted:...`); it is
//! revealed here through `mradioconfig::encryption`.

use crate::RelayConfig;
use anyhow::Result;
use mradioconfig::{encryption, Config};
use serde_yaml::Value;
use std::time::Duration;

/// Extension trait for `mradioconfig::Config`
pub trait RelayConfigExt {
    /// Relay configuration, defaults filling the missing keys
    fn get_relay_config(&self) -> Result<RelayConfig>;

    fn set_relay_enabled(&self, enabled: bool) -> Result<()>;

    /// Seals and stores the source password
    fn set_relay_password(&self, password: &str) -> Result<()>;
}

fn string_at(config: &Config, key: &str, default: &str) -> String {
    match config.get_value(&["relay", key]) {
        Ok(Value::String(s)) => s,
        Ok(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn u64_at(config: &Config, key: &str, default: u64) -> u64 {
    match config.get_value(&["relay", key]) {
        Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Ok(Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

impl RelayConfigExt for Config {
    fn get_relay_config(&self) -> Result<RelayConfig> {
        let defaults = RelayConfig::default();

        let enabled = matches!(self.get_value(&["relay", "enabled"]), Ok(Value::Bool(true)));
        let password = encryption::reveal(&string_at(self, "password", &defaults.password))?;

        Ok(RelayConfig {
            enabled,
            host: string_at(self, "host", &defaults.host),
            port: u16::try_from(u64_at(self, "port", defaults.port as u64))
                .unwrap_or(defaults.port),
            password,
            mount: string_at(self, "mount", &defaults.mount),
            name: string_at(self, "name", &defaults.name),
            description: string_at(self, "description", &defaults.description),
            genre: string_at(self, "genre", &defaults.genre),
            bitrate: u64_at(self, "bitrate", defaults.bitrate as u64) as u32,
            sample_rate: u64_at(self, "sample_rate", defaults.sample_rate as u64) as u32,
            channels: u8::try_from(u64_at(self, "channels", defaults.channels as u64))
                .unwrap_or(defaults.channels),
            max_buffer_size: u64_at(self, "max_buffer_size", defaults.max_buffer_size as u64)
                as usize,
            max_reconnect_attempts: u64_at(
                self,
                "max_reconnect_attempts",
                defaults.max_reconnect_attempts as u64,
            ) as u32,
            reconnect_delay: Duration::from_secs(u64_at(self, "reconnect_delay_secs", 5)),
            max_reconnect_delay: Duration::from_secs(u64_at(self, "max_reconnect_delay_secs", 30)),
            connect_grace: Duration::from_millis(u64_at(self, "connect_grace_ms", 2000)),
            ffmpeg_path: self.get_ffmpeg_path()?,
        })
    }

    fn set_relay_enabled(&self, enabled: bool) -> Result<()> {
        self.set_value(&["relay", "enabled"], Value::Bool(enabled))
    }

    fn set_relay_password(&self, password: &str) -> Result<()> {
        let stored = encryption::seal(password)?;
        self.set_value(&["relay", "password"], Value::String(stored))
    }
}
