use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "monitor.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub references_path: String,
    pub ok_path: String,
    pub reconnect_delay_ms: u64,
    pub probe_timeout_ms: u64,
    /// Bound on a single websocket handshake.
    pub open_timeout_ms: u64,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4000".into(),
            references_path: "/api/references".into(),
            ok_path: "/api/ok".into(),
            reconnect_delay_ms: 1000,
            probe_timeout_ms: 5000,
            open_timeout_ms: 5000,
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    references_path: Option<String>,
    ok_path: Option<String>,
    reconnect_delay_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    open_timeout_ms: Option<u64>,
    event_capacity: Option<usize>,
}

impl Settings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Parsed `server_url`, restricted to http and https.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(self.server_url.trim())
            .map_err(|err| ClientError::invalid_url(&self.server_url, err))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ClientError::invalid_url(
                &self.server_url,
                format!("unsupported scheme {scheme}, expected http or https"),
            )),
        }
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url()?
            .join(path)
            .map_err(|err| ClientError::invalid_url(&self.server_url, err))
    }

    pub fn references_url(&self) -> Result<Url> {
        self.endpoint(&self.references_path)
    }

    pub fn ok_url(&self) -> Result<Url> {
        self.endpoint(&self.ok_path)
    }

    fn apply_file(&mut self, raw: &str) -> Result<()> {
        let file: FileSettings =
            toml::from_str(raw).map_err(|err| ClientError::Config(err.to_string()))?;
        if let Some(v) = file.server_url {
            self.server_url = v;
        }
        if let Some(v) = file.references_path {
            self.references_path = v;
        }
        if let Some(v) = file.ok_path {
            self.ok_path = v;
        }
        if let Some(v) = file.reconnect_delay_ms {
            self.reconnect_delay_ms = v;
        }
        if let Some(v) = file.probe_timeout_ms {
            self.probe_timeout_ms = v;
        }
        if let Some(v) = file.open_timeout_ms {
            self.open_timeout_ms = v;
        }
        if let Some(v) = file.event_capacity {
            self.event_capacity = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("APP__SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = lookup("APP__REFERENCES_PATH") {
            self.references_path = v;
        }
        if let Some(v) = lookup("APP__OK_PATH") {
            self.ok_path = v;
        }
        if let Some(v) = lookup("APP__RECONNECT_DELAY_MS") {
            self.reconnect_delay_ms = parse_number("APP__RECONNECT_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("APP__PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse_number("APP__PROBE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("APP__OPEN_TIMEOUT_MS") {
            self.open_timeout_ms = parse_number("APP__OPEN_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("APP__EVENT_CAPACITY") {
            self.event_capacity = parse_number("APP__EVENT_CAPACITY", &v)?;
        }
        Ok(())
    }

    fn validate(self) -> Result<Self> {
        if self.event_capacity == 0 {
            return Err(ClientError::Config("event_capacity must be positive".into()));
        }
        if self.open_timeout_ms == 0 {
            return Err(ClientError::Config("open_timeout_ms must be positive".into()));
        }
        self.base_url()?;
        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| ClientError::Config(format!("{key}={raw}: {err}")))
}

/// Defaults, then `monitor.toml` in the working directory, then `APP__*`
/// environment variables.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let mut settings = Settings::default();
    match fs::read_to_string(path) {
        Ok(raw) => settings.apply_file(&raw)?,
        Err(err) => debug!(path = %path.display(), %err, "no settings file"),
    }
    settings.apply_env(lookup)?;
    settings.validate()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
