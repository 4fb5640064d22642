use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{RunnableStatus, WorkerInfo},
    error::ProtocolError,
};

pub mod names {
    pub const CMD_ABILITY_START: &str = "cmd.ability.start";
    pub const CMD_ABILITY_STOP: &str = "cmd.ability.stop";
    pub const CMD_UI_PING: &str = "cmd.ui.ping";
    pub const EVENT_ABILITY_CRASHED: &str = "event.ability.crashed";
    pub const EVENT_ABILITY_STARTED: &str = "event.ability.started";
    pub const EVENT_ABILITY_STOPPED: &str = "event.ability.stopped";
    pub const EVENT_UI_WELCOME: &str = "event.ui.welcome";
    pub const EVENT_WORKER_DISCONNECTED: &str = "event.worker.disconnected";
    pub const EVENT_WORKER_REGISTERED: &str = "event.worker.registered";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    #[serde(alias = "runnable")]
    Ability,
    All,
    Index,
    Ui,
    #[serde(alias = "parent")]
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type")]
    pub kind: IdentityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "parent", skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl Identity {
    fn of(kind: IdentityType) -> Self {
        Self {
            kind,
            name: None,
            worker: None,
        }
    }

    /// Anonymous UI identity used until the server assigns a name.
    pub fn ui() -> Self {
        Self::of(IdentityType::Ui)
    }

    pub fn named_ui(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::ui()
        }
    }

    pub fn index() -> Self {
        Self::of(IdentityType::Index)
    }

    pub fn worker(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of(IdentityType::Worker)
        }
    }

    pub fn runnable(worker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: IdentityType::Ability,
            name: Some(name.into()),
            worker: Some(worker.into()),
        }
    }
}

/// Addressed, named message exchanged over the streaming connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Identity>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload).map_err(|source| ProtocolError::Payload {
            name: self.name.clone(),
            source,
        })
    }
}

/// Message queued by the client before its sender identity is stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub to: Option<Identity>,
    pub name: String,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            to: None,
            name: name.into(),
            payload: Value::Null,
        }
    }

    pub fn to(mut self, identity: Identity) -> Self {
        self.to = Some(identity);
        self
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, ProtocolError> {
        self.payload = serde_json::to_value(payload).map_err(ProtocolError::Encode)?;
        Ok(self)
    }

    pub fn ping() -> Self {
        Self::new(names::CMD_UI_PING).to(Identity::index())
    }

    /// Command flipping a runnable away from `current`.
    pub fn toggle_runnable(
        worker: impl Into<String>,
        name: impl Into<String>,
        current: RunnableStatus,
    ) -> Self {
        let command = match current {
            RunnableStatus::Running => names::CMD_ABILITY_STOP,
            RunnableStatus::Stopped => names::CMD_ABILITY_START,
        };
        Self::new(command).to(Identity::runnable(worker, name))
    }

    pub fn stamp(self, from: Identity) -> Envelope {
        Envelope {
            from,
            to: self.to,
            name: self.name,
            payload: self.payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeUi {
    pub name: String,
    #[serde(default)]
    pub workers: Vec<WorkerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnableRef {
    pub worker: String,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameRef {
    Plain(String),
    Named { name: String },
}

impl NameRef {
    fn into_name(self) -> String {
        match self {
            Self::Plain(name) | Self::Named { name } => name,
        }
    }
}

/// Typed view over the message names the core itself consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    UiWelcome(WelcomeUi),
    WorkerRegistered(WorkerInfo),
    WorkerDisconnected { worker: String },
    RunnableStarted(RunnableRef),
    RunnableStopped(RunnableRef),
    RunnableCrashed(RunnableRef),
    Other,
}

impl InboundMessage {
    pub fn parse(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let message = match envelope.name.as_str() {
            names::EVENT_UI_WELCOME => Self::UiWelcome(envelope.payload_as()?),
            names::EVENT_WORKER_REGISTERED => Self::WorkerRegistered(envelope.payload_as()?),
            names::EVENT_WORKER_DISCONNECTED => Self::WorkerDisconnected {
                worker: envelope.payload_as::<NameRef>()?.into_name(),
            },
            names::EVENT_ABILITY_STARTED => Self::RunnableStarted(runnable_ref(envelope)?),
            names::EVENT_ABILITY_STOPPED => Self::RunnableStopped(runnable_ref(envelope)?),
            names::EVENT_ABILITY_CRASHED => Self::RunnableCrashed(runnable_ref(envelope)?),
            _ => Self::Other,
        };
        Ok(message)
    }
}

fn runnable_ref(envelope: &Envelope) -> Result<RunnableRef, ProtocolError> {
    let name = match &envelope.from.name {
        Some(name) => name.clone(),
        None => envelope.payload_as::<NameRef>()?.into_name(),
    };
    let worker = envelope.from.worker.clone().ok_or_else(|| ProtocolError::Payload {
        name: envelope.name.clone(),
        source: serde::de::Error::custom("sender identity carries no worker"),
    })?;
    Ok(RunnableRef { worker, name })
}
