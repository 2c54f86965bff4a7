//! # Handshake Engine
//!
//! Runs one [`HandshakeMachine`] per connection inside its own task. HELLOs,
//! connection loss and every send completion are posted to the task's queue,
//! so the machine is only ever touched by that task.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::algorithms::{Action, HandshakeEvent, HandshakeMachine};
use crate::domain::{
    CapabilitySet, HandshakeOutcome, HelloMessage, ProtocolVersion, TransportError,
};
use crate::ports::{
    ConnectionAdapter, ConnectionRateLimiter, ErrorHandler, HandshakeListener, HandshakeManager,
    PendingReply,
};

/// Collaborators of one handshake.
#[derive(Clone)]
pub struct HandshakeDependencies {
    /// Transport of the connection
    pub adapter: Arc<dyn ConnectionAdapter>,
    /// Receives the outcome
    pub listener: Arc<dyn HandshakeListener>,
    /// Diagnostics sink
    pub error_handler: Arc<dyn ErrorHandler>,
    /// Process-wide admission control
    pub rate_limiter: Arc<dyn ConnectionRateLimiter>,
}

/// Cloneable handle feeding a running engine.
#[derive(Clone)]
pub struct HandshakeHandle {
    events: mpsc::UnboundedSender<HandshakeEvent>,
    version: watch::Receiver<Option<ProtocolVersion>>,
}

impl HandshakeHandle {
    /// Settled version, once negotiation has converged.
    pub fn version(&self) -> Option<ProtocolVersion> {
        *self.version.borrow()
    }

    fn post(&self, event: HandshakeEvent) {
        if self.events.send(event).is_err() {
            trace!("Handshake engine already finished, dropping event");
        }
    }
}

impl HandshakeManager for HandshakeHandle {
    fn shake(&self, received: Option<HelloMessage>) {
        self.post(HandshakeEvent::Hello(received));
    }

    fn connection_lost(&self) {
        self.post(HandshakeEvent::ConnectionLost);
    }
}

/// Per-connection handshake task.
pub struct HandshakeEngine {
    machine: HandshakeMachine,
    deps: HandshakeDependencies,
    remote: String,
    events: mpsc::UnboundedReceiver<HandshakeEvent>,
    // Weak so the queue closes once every handle and pending send is gone
    completions: mpsc::WeakUnboundedSender<HandshakeEvent>,
    version: watch::Sender<Option<ProtocolVersion>>,
}

impl HandshakeEngine {
    /// Build an engine and the handle that drives it.
    pub fn new(
        capabilities: Arc<CapabilitySet>,
        use_version_bitmap: bool,
        deps: HandshakeDependencies,
    ) -> (Self, HandshakeHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (version_tx, version_rx) = watch::channel(None);
        let machine =
            HandshakeMachine::new(capabilities, use_version_bitmap, deps.rate_limiter.clone());
        let remote = deps.adapter.remote_address();

        let engine = Self {
            machine,
            deps,
            remote,
            events: rx,
            completions: tx.downgrade(),
            version: version_tx,
        };
        let handle = HandshakeHandle {
            events: tx,
            version: version_rx,
        };
        (engine, handle)
    }

    /// Build an engine and run it on the current runtime.
    pub fn spawn(
        capabilities: Arc<CapabilitySet>,
        use_version_bitmap: bool,
        deps: HandshakeDependencies,
    ) -> (HandshakeHandle, JoinHandle<HandshakeOutcome>) {
        let (engine, handle) = Self::new(capabilities, use_version_bitmap, deps);
        (handle, tokio::spawn(engine.run()))
    }

    /// Process events until the handshake reaches a terminal state.
    ///
    /// A closed queue counts as connection loss.
    pub async fn run(mut self) -> HandshakeOutcome {
        loop {
            let event = self
                .events
                .recv()
                .await
                .unwrap_or(HandshakeEvent::ConnectionLost);

            for action in self.machine.handle(event) {
                self.execute(action).await;
            }
            self.publish_version();

            if let Some(outcome) = self.machine.outcome() {
                debug!(remote = %self.remote, success = outcome.is_success(), "Handshake finished");
                return outcome.clone();
            }
        }
    }

    fn publish_version(&self) {
        let settled = self.machine.state().settled_version();
        if settled.is_some() && *self.version.borrow() != settled {
            self.version.send_replace(settled);
        }
    }

    async fn execute(&self, action: Action) {
        match action {
            Action::SendHello { input, then } => {
                debug!(remote = %self.remote, version = %input.version, xid = %input.xid, "Sending hello");
                let xid = input.xid;
                let pending = self.deps.adapter.hello(input);
                self.complete_with(pending, move |result| HandshakeEvent::HelloSent {
                    xid,
                    result,
                    then,
                });
            }
            Action::RequestFeatures(input) => {
                debug!(remote = %self.remote, version = %input.version, xid = %input.xid, "Requesting features");
                let pending = self.deps.adapter.get_features(input);
                self.complete_with(pending, move |result| HandshakeEvent::FeaturesReceived {
                    xid: input.xid,
                    result,
                });
            }
            Action::ReportError(error) => self.deps.error_handler.handle(&error),
            Action::NotifySuccess { features, version } => {
                self.deps
                    .listener
                    .on_handshake_successful(features, version)
                    .await;
            }
            Action::NotifyFailure => self.deps.listener.on_handshake_failure().await,
        }
    }

    /// Post the reply of `pending` back to this engine once it completes.
    fn complete_with<T, F>(&self, pending: PendingReply<T>, into_event: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<T, TransportError>) -> HandshakeEvent + Send + 'static,
    {
        let Some(sender) = self.completions.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let result = pending.await;
            // The engine may have finished meanwhile
            let _ = sender.send(into_event(result));
        });
    }
}
