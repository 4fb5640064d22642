//! Tokio driver for [`ConnectionMachine`]: owns the socket and the timers and
//! turns machine effects into IO.

use std::{collections::VecDeque, pin::Pin, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::{Envelope, OutboundMessage};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{interval_at, sleep, timeout, Instant, Interval, MissedTickBehavior, Sleep},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    connection::{ConnectionEffect, ConnectionInput, ConnectionMachine, ConnectionState},
    error::{ClientError, Result},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<()>;
}

/// Probes the server with a GET on its ok endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(http: reqwest::Client, url: Url, timeout: Duration) -> Self {
        Self { http, url, timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<()> {
        self.http
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Callbacks the transport invokes from its loop. Envelopes pushed to
/// `outgoing` are written once the callback returns.
pub trait TransportObserver: Send {
    fn on_open(&mut self, outgoing: &mut Vec<Envelope>);
    fn on_message(&mut self, envelope: Envelope, outgoing: &mut Vec<Envelope>);
    /// Called once per connected session, on the first close after an open.
    fn on_offline(&mut self);
    fn keepalive_envelope(&self) -> Envelope;
    fn stamp(&self, message: OutboundMessage) -> Envelope;
}

#[derive(Debug)]
pub enum TransportCommand {
    Send(OutboundMessage),
    /// Processed as if it had been received from the server.
    Inject(Envelope),
    Close,
    Shutdown,
}

/// Resolves the streaming address advertised by the server against the
/// server's base url, mapping http(s) to ws(s).
pub fn websocket_url(base: &Url, addr: &str) -> Result<Url> {
    if addr.trim().is_empty() {
        return Err(ClientError::invalid_url(addr, "empty websocket address"));
    }
    let mut url = base
        .join(addr.trim())
        .map_err(|err| ClientError::invalid_url(addr, err))?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::invalid_url(
                addr,
                format!("unsupported websocket scheme {other}"),
            ))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::invalid_url(addr, "cannot switch to websocket scheme"))?;
    Ok(url)
}

#[derive(Default)]
struct Link {
    socket: Option<Socket>,
    keepalive: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

enum Stimulus {
    Frame(Option<Result<Message, tungstenite::Error>>),
    Keepalive,
    Reconnect,
    Command(Option<TransportCommand>),
}

pub struct Transport<P> {
    ws_url: Url,
    probe: P,
    open_timeout: Duration,
    machine: ConnectionMachine,
}

impl<P: HealthProbe> Transport<P> {
    pub fn new(ws_url: Url, keepalive: Duration, reconnect_delay: Duration, probe: P) -> Self {
        Self {
            ws_url,
            probe,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            machine: ConnectionMachine::new(keepalive, reconnect_delay),
        }
    }

    /// Bounds each probe and each websocket handshake. The loop serves no
    /// commands while either is in flight.
    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Connects and keeps reconnecting until a shutdown is requested or every
    /// command sender is dropped.
    pub async fn run<O: TransportObserver>(
        mut self,
        observer: &mut O,
        mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    ) {
        let mut link = Link::default();
        let mut inputs = VecDeque::from([ConnectionInput::Start]);

        loop {
            while let Some(input) = inputs.pop_front() {
                for effect in self.machine.handle(input) {
                    if let Some(next) = self.execute(effect, &mut link, observer).await {
                        inputs.push_back(next);
                    }
                }
            }
            if self.machine.is_halted() {
                info!(url = %self.ws_url, "transport halted");
                return;
            }

            let stimulus = tokio::select! {
                frame = next_frame(&mut link.socket) => Stimulus::Frame(frame),
                _ = next_tick(&mut link.keepalive) => Stimulus::Keepalive,
                _ = reconnect_elapsed(&mut link.reconnect) => Stimulus::Reconnect,
                command = commands.recv() => Stimulus::Command(command),
            };

            let input = match stimulus {
                Stimulus::Frame(frame) => self.on_frame(frame, &mut link, observer).await,
                Stimulus::Keepalive => Some(ConnectionInput::KeepaliveElapsed),
                Stimulus::Reconnect => {
                    link.reconnect = None;
                    Some(ConnectionInput::ReconnectElapsed)
                }
                Stimulus::Command(None) => {
                    debug!("command channel closed");
                    Some(ConnectionInput::ShutdownRequested)
                }
                Stimulus::Command(Some(command)) => {
                    self.on_command(command, &mut link, observer).await
                }
            };
            inputs.extend(input);
        }
    }

    async fn execute<O: TransportObserver>(
        &mut self,
        effect: ConnectionEffect,
        link: &mut Link,
        observer: &mut O,
    ) -> Option<ConnectionInput> {
        match effect {
            ConnectionEffect::Probe => {
                match timeout(self.open_timeout, self.probe.probe()).await {
                    Ok(Ok(())) => Some(ConnectionInput::ProbeSucceeded),
                    Ok(Err(err)) => {
                        debug!(%err, "health probe failed");
                        Some(ConnectionInput::ProbeFailed)
                    }
                    Err(_) => {
                        debug!(timeout = ?self.open_timeout, "health probe timed out");
                        Some(ConnectionInput::ProbeFailed)
                    }
                }
            }
            ConnectionEffect::Open => {
                match timeout(self.open_timeout, connect_async(self.ws_url.as_str())).await {
                    Ok(Ok((socket, _))) => {
                        link.socket = Some(socket);
                        Some(ConnectionInput::Opened)
                    }
                    Ok(Err(err)) => {
                        warn!(url = %self.ws_url, %err, "failed to open websocket");
                        Some(ConnectionInput::OpenFailed)
                    }
                    Err(_) => {
                        warn!(
                            url = %self.ws_url,
                            timeout = ?self.open_timeout,
                            "websocket handshake timed out"
                        );
                        Some(ConnectionInput::OpenFailed)
                    }
                }
            }
            ConnectionEffect::StartKeepalive(period) => {
                link.keepalive = keepalive_timer(period);
                None
            }
            ConnectionEffect::StopKeepalive => {
                link.keepalive = None;
                None
            }
            ConnectionEffect::SendPing => {
                let ping = observer.keepalive_envelope();
                debug!("sending keepalive");
                self.write_all(link, vec![ping]).await
            }
            ConnectionEffect::NotifyOpen => {
                let mut outgoing = Vec::new();
                observer.on_open(&mut outgoing);
                self.write_all(link, outgoing).await
            }
            ConnectionEffect::NotifyOffline => {
                observer.on_offline();
                None
            }
            ConnectionEffect::ScheduleReconnect(delay) => {
                debug!(?delay, "reconnect scheduled");
                link.reconnect = Some(Box::pin(sleep(delay)));
                None
            }
            ConnectionEffect::CancelReconnect => {
                link.reconnect = None;
                None
            }
            ConnectionEffect::CloseSocket => {
                if let Some(mut socket) = link.socket.take() {
                    if let Err(err) = socket.close(None).await {
                        debug!(%err, "websocket close handshake failed");
                    }
                }
                Some(ConnectionInput::Closed)
            }
            ConnectionEffect::Halt => None,
        }
    }

    async fn on_frame<O: TransportObserver>(
        &mut self,
        frame: Option<Result<Message, tungstenite::Error>>,
        link: &mut Link,
        observer: &mut O,
    ) -> Option<ConnectionInput> {
        match frame {
            Some(Ok(Message::Text(text))) => match Envelope::decode(&text) {
                Ok(envelope) => {
                    let mut outgoing = Vec::new();
                    observer.on_message(envelope, &mut outgoing);
                    self.write_all(link, outgoing).await
                }
                Err(err) => {
                    warn!(%err, "dropping malformed frame");
                    None
                }
            },
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "server closed websocket");
                link.socket = None;
                Some(ConnectionInput::Closed)
            }
            Some(Ok(_)) => None,
            Some(Err(err)) => {
                warn!(%err, "websocket read failed");
                link.socket = None;
                Some(ConnectionInput::Closed)
            }
            None => {
                info!("websocket stream ended");
                link.socket = None;
                Some(ConnectionInput::Closed)
            }
        }
    }

    async fn on_command<O: TransportObserver>(
        &mut self,
        command: TransportCommand,
        link: &mut Link,
        observer: &mut O,
    ) -> Option<ConnectionInput> {
        match command {
            TransportCommand::Send(message) => {
                let envelope = observer.stamp(message);
                self.write_all(link, vec![envelope]).await
            }
            TransportCommand::Inject(envelope) => {
                let mut outgoing = Vec::new();
                observer.on_message(envelope, &mut outgoing);
                self.write_all(link, outgoing).await
            }
            TransportCommand::Close => Some(ConnectionInput::CloseRequested),
            TransportCommand::Shutdown => Some(ConnectionInput::ShutdownRequested),
        }
    }

    /// Writes envelopes in order. Returns `Closed` when a write fails.
    async fn write_all(
        &mut self,
        link: &mut Link,
        envelopes: Vec<Envelope>,
    ) -> Option<ConnectionInput> {
        for envelope in envelopes {
            let connected = self.machine.state() == ConnectionState::Connected;
            let Some(socket) = link.socket.as_mut().filter(|_| connected) else {
                warn!(name = %envelope.name, "not connected, dropping outgoing message");
                continue;
            };
            let text = match envelope.encode() {
                Ok(text) => text,
                Err(err) => {
                    warn!(name = %envelope.name, %err, "dropping unencodable message");
                    continue;
                }
            };
            if let Err(err) = socket.send(Message::Text(text)).await {
                warn!(name = %envelope.name, %err, "websocket write failed");
                link.socket = None;
                return Some(ConnectionInput::Closed);
            }
        }
        None
    }
}

fn keepalive_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        warn!("keepalive period is zero, keepalive disabled");
        return None;
    }
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn reconnect_elapsed(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
