//! Client core for watching the workers of an index server.
//!
//! A [`ClientBuilder`] collects page handlers and progress trackers, fetches
//! the server's references and spawns one session task. The task keeps the
//! streaming connection alive, mirrors the worker registry and publishes
//! everything it learns as [`ClientEvent`]s. [`ClientHandle`] is the only way
//! back in.

use std::collections::HashMap;

use shared::{
    domain::{ProgressDescriptor, References},
    error::ApiError,
    protocol::{Envelope, Identity, InboundMessage, OutboundMessage},
};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub mod config;
pub mod connection;
pub mod error;
pub mod progress;
pub mod registry;
pub mod router;
pub mod transport;

pub use config::{load_settings, Settings};
pub use error::{ClientError, Result};
pub use progress::{ProgressTracker, ProgressUpdate, ProgressView, StepState};
pub use registry::{Registry, RegistryChange, Runnable, Worker};
pub use router::{MessageRouter, Outbox};
pub use transport::{HealthProbe, HttpHealthProbe, TransportCommand, TransportObserver};

use transport::{websocket_url, Transport};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    /// The connection dropped. Sent once per connected session.
    Offline,
    Welcome {
        name: String,
    },
    Registry(RegistryChange),
    /// Registry contents after a batch of changes.
    Snapshot(Registry),
    Progress {
        name: String,
        view: ProgressView,
        update: ProgressUpdate,
    },
    JobFailed {
        name: String,
        error: String,
    },
}

/// State owned by the session task.
pub(crate) struct Session {
    registry: Registry,
    router: MessageRouter,
    trackers: HashMap<String, ProgressTracker>,
    events: broadcast::Sender<ClientEvent>,
}

impl Session {
    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn identity(&self) -> &Identity {
        self.router.identity()
    }

    fn publish_changes(&self, changes: Vec<RegistryChange>) {
        if changes.is_empty() {
            return;
        }
        for change in changes {
            let _ = self.events.send(ClientEvent::Registry(change));
        }
        let _ = self.events.send(ClientEvent::Snapshot(self.registry.clone()));
    }

    fn process(&mut self, envelope: &Envelope, outbox: &mut Outbox) {
        let message = match InboundMessage::parse(envelope) {
            Ok(message) => message,
            Err(err) => {
                warn!(name = %envelope.name, %err, "dropping message with bad payload");
                return;
            }
        };

        if let InboundMessage::UiWelcome(welcome) = &message {
            self.router.adopt_identity(&welcome.name);
            let _ = self.events.send(ClientEvent::Welcome {
                name: welcome.name.clone(),
            });
        }
        let changes = self.registry.apply(&message);
        self.publish_changes(changes);

        if let Some(tracker) = self.trackers.get_mut(&envelope.name) {
            match envelope.payload_as::<ProgressDescriptor>() {
                Ok(descriptor) => {
                    let update = tracker.update(&descriptor);
                    if let Some(view) = tracker.view() {
                        let _ = self.events.send(ClientEvent::Progress {
                            name: envelope.name.clone(),
                            view: view.clone(),
                            update,
                        });
                    }
                }
                Err(err) => warn!(name = %envelope.name, %err, "dropping progress update"),
            }
        }

        self.router.dispatch(envelope, outbox);
    }
}

impl TransportObserver for Session {
    fn on_open(&mut self, _outgoing: &mut Vec<Envelope>) {
        let _ = self.events.send(ClientEvent::Connected);
    }

    fn on_message(&mut self, envelope: Envelope, outgoing: &mut Vec<Envelope>) {
        let mut outbox = Outbox::new();
        self.process(&envelope, &mut outbox);
        outgoing.extend(
            outbox
                .take()
                .into_iter()
                .map(|message| self.router.stamp(message)),
        );
    }

    fn on_offline(&mut self) {
        let _ = self.events.send(ClientEvent::Offline);
        let changes = self.registry.reset();
        self.publish_changes(changes);
    }

    fn keepalive_envelope(&self) -> Envelope {
        self.router.stamp(OutboundMessage::ping())
    }

    fn stamp(&self, message: OutboundMessage) -> Envelope {
        self.router.stamp(message)
    }
}

pub struct ClientBuilder {
    settings: Settings,
    http: reqwest::Client,
    router: MessageRouter,
    trackers: HashMap<String, ProgressTracker>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientBuilder {
    pub fn new(settings: Settings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            settings,
            http: reqwest::Client::new(),
            router: MessageRouter::new(),
            trackers: HashMap::new(),
            events,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs `handler` for every envelope named `name`, after the core has
    /// applied it to the registry and progress trackers.
    pub fn on(
        mut self,
        name: impl Into<String>,
        handler: impl FnMut(&Envelope, &mut Outbox) + Send + 'static,
    ) -> Self {
        self.router.route(name, handler);
        self
    }

    /// Feeds envelopes named `name` to a progress tracker.
    pub fn track_progress(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let events = self.events.clone();
        let job = name.clone();
        let tracker = ProgressTracker::with_error_callback(move |error| {
            warn!(job = %job, error, "job failed");
            let _ = events.send(ClientEvent::JobFailed {
                name: job.clone(),
                error: error.to_string(),
            });
        });
        self.trackers.insert(name, tracker);
        self
    }

    /// Subscribing before connecting guarantees no event is missed.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn fetch_references(&self) -> Result<References> {
        let url = self.settings.references_url()?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(body) => body.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Fetches the references and starts the session task.
    pub async fn connect(self) -> Result<ClientHandle> {
        let references = self.fetch_references().await?;
        self.start(references)
    }

    /// Starts the session task on the current tokio runtime.
    pub fn start(self, references: References) -> Result<ClientHandle> {
        let probe = HttpHealthProbe::new(
            self.http.clone(),
            self.settings.ok_url()?,
            self.settings.probe_timeout(),
        );
        self.start_with_probe(references, probe)
    }

    pub fn start_with_probe<P: HealthProbe + 'static>(
        self,
        references: References,
        probe: P,
    ) -> Result<ClientHandle> {
        let ws_url = websocket_url(&self.settings.base_url()?, &references.websocket.addr)?;
        info!(
            url = %ws_url,
            ping_period = ?references.websocket.ping_period,
            "starting client session"
        );
        let transport = Transport::new(
            ws_url,
            references.websocket.ping_period,
            self.settings.reconnect_delay(),
            probe,
        )
        .with_open_timeout(self.settings.open_timeout());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let mut session = self.into_session();
        tokio::spawn(async move {
            transport.run(&mut session, command_rx).await;
        });
        Ok(ClientHandle { commands, events })
    }

    fn into_session(self) -> Session {
        Session {
            registry: Registry::new(),
            router: self.router,
            trackers: self.trackers,
            events: self.events,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<TransportCommand>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientHandle {
    fn command(&self, command: TransportCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Closed)
    }

    /// Stamps `message` with the session identity and writes it. Messages
    /// sent while disconnected are dropped.
    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.command(TransportCommand::Send(message))
    }

    /// Drops the current connection. The session reconnects on its own.
    pub fn close(&self) -> Result<()> {
        self.command(TransportCommand::Close)
    }

    /// Stops the session for good without reporting the connection as lost.
    pub fn shutdown(&self) -> Result<()> {
        self.command(TransportCommand::Shutdown)
    }

    /// Runs a descriptor obtained out of band through the tracker for `name`.
    pub fn seed_progress(
        &self,
        name: impl Into<String>,
        descriptor: &ProgressDescriptor,
    ) -> Result<()> {
        let envelope = OutboundMessage::new(name)
            .with_payload(descriptor)?
            .stamp(Identity::index());
        self.command(TransportCommand::Inject(envelope))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Resolves once the session task has stopped.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }
}

#[cfg(test)]
#[path = "tests/mock_index.rs"]
mod mock_index;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
