//! Connection lifecycle state machine.
//!
//! The machine performs no IO: the transport driver feeds it inputs as
//! stimuli arrive and executes the effects it returns, in order.

use std::time::Duration;

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    HealthChecking,
    Connecting,
    Connected,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInput {
    Start,
    ProbeSucceeded,
    ProbeFailed,
    Opened,
    OpenFailed,
    /// The socket went away: write failure, explicit close or server close.
    Closed,
    KeepaliveElapsed,
    ReconnectElapsed,
    CloseRequested,
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEffect {
    Probe,
    Open,
    StartKeepalive(Duration),
    StopKeepalive,
    SendPing,
    NotifyOpen,
    NotifyOffline,
    ScheduleReconnect(Duration),
    CancelReconnect,
    CloseSocket,
    Halt,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    keepalive_interval: Duration,
    reconnect_delay: Duration,
    notify_offline: bool,
    keepalive_running: bool,
    reconnect_pending: bool,
    halted: bool,
}

impl ConnectionMachine {
    pub fn new(keepalive_interval: Duration, reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            keepalive_interval,
            reconnect_delay,
            notify_offline: false,
            keepalive_running: false,
            reconnect_pending: false,
            halted: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn should_notify_offline(&self) -> bool {
        self.notify_offline
    }

    pub fn handle(&mut self, input: ConnectionInput) -> Vec<ConnectionEffect> {
        use ConnectionInput as In;
        use ConnectionState as St;

        if self.halted {
            return Vec::new();
        }

        match (self.state, input) {
            (_, In::ShutdownRequested) => self.shutdown(),
            (_, In::Closed) => self.on_closed(),
            (St::Disconnected, In::Start | In::ReconnectElapsed) => {
                self.reconnect_pending = false;
                self.state = St::HealthChecking;
                vec![ConnectionEffect::Probe]
            }
            (St::HealthChecking, In::ProbeSucceeded) => {
                self.state = St::Connecting;
                vec![ConnectionEffect::Open]
            }
            (St::HealthChecking, In::ProbeFailed) | (St::Connecting, In::OpenFailed) => {
                self.state = St::Disconnected;
                self.schedule_reconnect().into_iter().collect()
            }
            (St::Connecting, In::Opened) => {
                info!("connection opened");
                self.state = St::Connected;
                self.notify_offline = true;
                self.keepalive_running = true;
                let mut effects = Vec::with_capacity(3);
                if std::mem::take(&mut self.reconnect_pending) {
                    effects.push(ConnectionEffect::CancelReconnect);
                }
                effects.push(ConnectionEffect::StartKeepalive(self.keepalive_interval));
                effects.push(ConnectionEffect::NotifyOpen);
                effects
            }
            (St::Connected, In::KeepaliveElapsed) => vec![ConnectionEffect::SendPing],
            (St::Connected, In::CloseRequested) => {
                self.state = St::Closing;
                vec![ConnectionEffect::CloseSocket]
            }
            (state, input) => {
                debug!(?state, ?input, "connection input ignored");
                Vec::new()
            }
        }
    }

    fn on_closed(&mut self) -> Vec<ConnectionEffect> {
        self.state = ConnectionState::Disconnected;
        let mut effects = Vec::with_capacity(3);
        if std::mem::take(&mut self.keepalive_running) {
            effects.push(ConnectionEffect::StopKeepalive);
        }
        if std::mem::take(&mut self.notify_offline) {
            info!("connection lost");
            effects.push(ConnectionEffect::NotifyOffline);
        }
        effects.extend(self.schedule_reconnect());
        effects
    }

    fn schedule_reconnect(&mut self) -> Option<ConnectionEffect> {
        if self.reconnect_pending {
            return None;
        }
        self.reconnect_pending = true;
        Some(ConnectionEffect::ScheduleReconnect(self.reconnect_delay))
    }

    fn shutdown(&mut self) -> Vec<ConnectionEffect> {
        let had_socket = matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Closing
        );
        self.halted = true;
        self.notify_offline = false;
        self.state = ConnectionState::Disconnected;

        let mut effects = Vec::with_capacity(4);
        if std::mem::take(&mut self.keepalive_running) {
            effects.push(ConnectionEffect::StopKeepalive);
        }
        if std::mem::take(&mut self.reconnect_pending) {
            effects.push(ConnectionEffect::CancelReconnect);
        }
        if had_socket {
            effects.push(ConnectionEffect::CloseSocket);
        }
        effects.push(ConnectionEffect::Halt);
        effects
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
