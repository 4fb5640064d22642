//! Name-based dispatch of inbound envelopes and sender stamping of outbound ones.

use std::fmt;

use shared::protocol::{Envelope, Identity, OutboundMessage};
use tracing::{debug, info};

/// Messages queued by handlers while an envelope is being processed.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OutboundMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: OutboundMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.messages)
    }
}

pub type Handler = Box<dyn FnMut(&Envelope, &mut Outbox) + Send>;

struct Route {
    name: String,
    handler: Handler,
}

pub struct MessageRouter {
    identity: Identity,
    routes: Vec<Route>,
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("identity", &self.identity)
            .field(
                "routes",
                &self.routes.iter().map(|route| &route.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            identity: Identity::ui(),
            routes: Vec::new(),
        }
    }

    /// Subscribes `handler` to envelopes named `name`. Handlers for the same
    /// name run in registration order.
    pub fn route(
        &mut self,
        name: impl Into<String>,
        handler: impl FnMut(&Envelope, &mut Outbox) + Send + 'static,
    ) {
        self.routes.push(Route {
            name: name.into(),
            handler: Box::new(handler),
        });
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Takes on the name the server assigned in its welcome.
    pub fn adopt_identity(&mut self, name: &str) {
        info!(name, "adopting assigned identity");
        self.identity = Identity::named_ui(name);
    }

    pub fn subscribes_to(&self, name: &str) -> bool {
        self.routes.iter().any(|route| route.name == name)
    }

    /// Runs every handler subscribed to the envelope's name and returns how
    /// many ran. Unknown names are not an error.
    pub fn dispatch(&mut self, envelope: &Envelope, outbox: &mut Outbox) -> usize {
        let mut invoked = 0;
        for route in self
            .routes
            .iter_mut()
            .filter(|route| route.name == envelope.name)
        {
            (route.handler)(envelope, outbox);
            invoked += 1;
        }
        if invoked == 0 {
            debug!(name = %envelope.name, "no handler for message");
        }
        invoked
    }

    pub fn stamp(&self, message: OutboundMessage) -> Envelope {
        message.stamp(self.identity.clone())
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
