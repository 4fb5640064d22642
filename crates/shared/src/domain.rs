use std::time::Duration;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

pub const MAX_PROGRESS: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnableStatus {
    Running,
    Stopped,
}

impl RunnableStatus {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// CSS-like class name a renderer attaches to the status toggle.
    pub fn toggle_class(self) -> &'static str {
        match self {
            Self::Running => "on",
            Self::Stopped => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnableInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: RunnableStatus,
    #[serde(
        default,
        alias = "ui_homepage",
        skip_serializing_if = "Option::is_none"
    )]
    pub web_homepage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub name: String,
    #[serde(default, alias = "runnables", skip_serializing_if = "Vec::is_empty")]
    pub abilities: Vec<RunnableInfo>,
}

/// Snapshot of a multi-step job as pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDescriptor {
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, deserialize_with = "clamped_progress")]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressDescriptor {
    pub fn new(steps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            current_step: None,
            progress: 0,
            error: None,
        }
    }

    pub fn at(mut self, step: impl Into<String>, progress: u8) -> Self {
        self.current_step = Some(step.into());
        self.progress = progress.min(MAX_PROGRESS);
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|error| !error.is_empty())
    }

    pub fn current_index(&self) -> Option<usize> {
        let current = self.current_step.as_deref()?;
        self.steps.iter().position(|step| step == current)
    }
}

fn clamped_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Err(D::Error::custom("progress is not a number"));
    }
    // Floored so only a reported 100 counts as complete.
    Ok(raw.clamp(0.0, f64::from(MAX_PROGRESS)).floor() as u8)
}

/// Document served by the references endpoint at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    #[serde(alias = "connection")]
    pub websocket: WebsocketReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsocketReference {
    #[serde(alias = "address")]
    pub addr: String,
    /// Keepalive period, encoded as nanoseconds on the wire.
    #[serde(alias = "keepalive_interval", with = "duration_nanos")]
    pub ping_period: Duration,
}

mod duration_nanos {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
