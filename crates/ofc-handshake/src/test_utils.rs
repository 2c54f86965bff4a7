//! Test utilities for the handshake.
//!
//! Doubles for every outbound port, for deterministic tests.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use ofc_handshake::test_utils::FixedRateLimiter;
//! use ofc_handshake::ConnectionRateLimiter;
//!
//! let limiter = FixedRateLimiter::deny();
//! assert!(!limiter.try_acquire());
//! assert_eq!(limiter.attempts(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use crate::domain::{
    BarrierInput, ConnectionStatus, DeviceConnectError, FeatureSet, GetFeaturesInput,
    HandshakeError, HelloInput, ProtocolVersion, TransportError,
};
use crate::ports::{
    ConnectionAdapter, ConnectionContext, ConnectionRateLimiter, DeviceConnectedHandler,
    ErrorHandler, HandshakeListener, PendingReply,
};

// =============================================================================
// CONNECTION ADAPTER
// =============================================================================

/// How the mock answers a request.
#[derive(Clone, Debug)]
pub enum Reply<T> {
    /// Complete at once with this result.
    Immediate(Result<T, TransportError>),
    /// Hold the request until the test completes it.
    Deferred,
}

type Responder<T> = oneshot::Sender<Result<T, TransportError>>;

struct MockState {
    hellos: Vec<HelloInput>,
    features_requests: Vec<GetFeaturesInput>,
    barriers: Vec<BarrierInput>,
    hello_reply: Result<(), TransportError>,
    features_reply: Reply<FeatureSet>,
    barrier_reply: Reply<()>,
    pending_features: Vec<Responder<FeatureSet>>,
    pending_barriers: Vec<Responder<()>>,
    disconnects: usize,
}

/// Transport double recording every message sent to the device.
///
/// Pending replies fail with `ConnectionClosed` on disconnect, and requests
/// issued after a disconnect fail at once.
pub struct MockConnectionAdapter {
    remote: String,
    state: Mutex<MockState>,
    activity: Notify,
}

impl MockConnectionAdapter {
    /// Adapter delivering every HELLO and answering features with datapath 1.
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            state: Mutex::new(MockState {
                hellos: Vec::new(),
                features_requests: Vec::new(),
                barriers: Vec::new(),
                hello_reply: Ok(()),
                features_reply: Reply::Immediate(Ok(FeatureSet::for_datapath(1))),
                barrier_reply: Reply::Immediate(Ok(())),
                pending_features: Vec::new(),
                pending_barriers: Vec::new(),
                disconnects: 0,
            }),
            activity: Notify::new(),
        }
    }

    /// Answer features requests with `features`.
    pub fn with_features(self, features: FeatureSet) -> Self {
        self.with_features_reply(Reply::Immediate(Ok(features)))
    }

    /// Answer features requests as scripted.
    pub fn with_features_reply(mut self, reply: Reply<FeatureSet>) -> Self {
        self.state.get_mut().features_reply = reply;
        self
    }

    /// Answer barriers as scripted.
    pub fn with_barrier_reply(mut self, reply: Reply<()>) -> Self {
        self.state.get_mut().barrier_reply = reply;
        self
    }

    /// Fail every HELLO send.
    pub fn with_hello_failure(mut self, error: TransportError) -> Self {
        self.state.get_mut().hello_reply = Err(error);
        self
    }

    /// HELLOs sent so far.
    pub fn hellos(&self) -> Vec<HelloInput> {
        self.state.lock().hellos.clone()
    }

    /// Features requests sent so far.
    pub fn features_requests(&self) -> Vec<GetFeaturesInput> {
        self.state.lock().features_requests.clone()
    }

    /// Barriers sent so far.
    pub fn barriers(&self) -> Vec<BarrierInput> {
        self.state.lock().barriers.clone()
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Whether `disconnect` was called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnect_count() > 0
    }

    /// Complete the oldest deferred features request.
    pub fn complete_features(&self, result: Result<FeatureSet, TransportError>) -> bool {
        let responder = {
            let mut state = self.state.lock();
            if state.pending_features.is_empty() {
                return false;
            }
            state.pending_features.remove(0)
        };
        responder.send(result).is_ok()
    }

    /// Complete the oldest deferred barrier.
    pub fn complete_barrier(&self, result: Result<(), TransportError>) -> bool {
        let responder = {
            let mut state = self.state.lock();
            if state.pending_barriers.is_empty() {
                return false;
            }
            state.pending_barriers.remove(0)
        };
        responder.send(result).is_ok()
    }

    /// Wait until at least `count` HELLOs were sent.
    pub async fn wait_for_hellos(&self, count: usize) {
        self.wait_until(|state| state.hellos.len() >= count).await;
    }

    /// Wait until at least `count` features requests were sent.
    pub async fn wait_for_features_requests(&self, count: usize) {
        self.wait_until(|state| state.features_requests.len() >= count)
            .await;
    }

    /// Wait until at least `count` barriers were sent.
    pub async fn wait_for_barriers(&self, count: usize) {
        self.wait_until(|state| state.barriers.len() >= count).await;
    }

    /// Wait until the connection was closed.
    pub async fn wait_for_disconnect(&self) {
        self.wait_until(|state| state.disconnects > 0).await;
    }

    async fn wait_until(&self, done: impl Fn(&MockState) -> bool) {
        loop {
            let notified = self.activity.notified();
            if done(&self.state.lock()) {
                return;
            }
            notified.await;
        }
    }

    fn reply<T: Send + 'static>(
        reply: &Reply<T>,
        pending: &mut Vec<Responder<T>>,
        disconnected: bool,
    ) -> PendingReply<T>
    where
        T: Clone,
    {
        if disconnected {
            return Box::pin(future::ready(Err(TransportError::ConnectionClosed)));
        }
        match reply {
            Reply::Immediate(result) => Box::pin(future::ready(result.clone())),
            Reply::Deferred => {
                let (tx, rx) = oneshot::channel();
                pending.push(tx);
                Box::pin(async move { rx.await.unwrap_or(Err(TransportError::ConnectionClosed)) })
            }
        }
    }
}

impl ConnectionAdapter for MockConnectionAdapter {
    fn hello(&self, input: HelloInput) -> PendingReply<()> {
        let result = {
            let mut state = self.state.lock();
            state.hellos.push(input);
            if state.disconnects > 0 {
                Err(TransportError::ConnectionClosed)
            } else {
                state.hello_reply.clone()
            }
        };
        self.activity.notify_waiters();
        Box::pin(future::ready(result))
    }

    fn get_features(&self, input: GetFeaturesInput) -> PendingReply<FeatureSet> {
        let pending = {
            let mut state = self.state.lock();
            state.features_requests.push(input);
            let disconnected = state.disconnects > 0;
            let MockState {
                features_reply,
                pending_features,
                ..
            } = &mut *state;
            Self::reply(features_reply, pending_features, disconnected)
        };
        self.activity.notify_waiters();
        pending
    }

    fn barrier(&self, input: BarrierInput) -> PendingReply<()> {
        let pending = {
            let mut state = self.state.lock();
            state.barriers.push(input);
            let disconnected = state.disconnects > 0;
            let MockState {
                barrier_reply,
                pending_barriers,
                ..
            } = &mut *state;
            Self::reply(barrier_reply, pending_barriers, disconnected)
        };
        self.activity.notify_waiters();
        pending
    }

    fn disconnect(&self) {
        {
            let mut state = self.state.lock();
            state.disconnects += 1;
            // Dropping the responders fails their futures
            state.pending_features.clear();
            state.pending_barriers.clear();
        }
        self.activity.notify_waiters();
    }

    fn remote_address(&self) -> String {
        self.remote.clone()
    }
}

// =============================================================================
// LISTENER AND ERROR HANDLER
// =============================================================================

/// Listener recording every notification.
#[derive(Default)]
pub struct RecordingListener {
    successes: Mutex<Vec<(FeatureSet, ProtocolVersion)>>,
    failures: AtomicUsize,
}

impl RecordingListener {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Success notifications received.
    pub fn successes(&self) -> Vec<(FeatureSet, ProtocolVersion)> {
        self.successes.lock().clone()
    }

    /// Failure notifications received.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandshakeListener for RecordingListener {
    async fn on_handshake_successful(&self, features: FeatureSet, version: ProtocolVersion) {
        self.successes.lock().push((features, version));
    }

    async fn on_handshake_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Error handler recording every reported error.
#[derive(Default)]
pub struct RecordingErrorHandler {
    errors: Mutex<Vec<HandshakeError>>,
}

impl RecordingErrorHandler {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors reported so far.
    pub fn errors(&self) -> Vec<HandshakeError> {
        self.errors.lock().clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn handle(&self, error: &HandshakeError) {
        self.errors.lock().push(error.clone());
    }
}

// =============================================================================
// ADMISSION AND DEVICE HANDLER
// =============================================================================

/// Rate limiter with a fixed answer.
#[derive(Debug)]
pub struct FixedRateLimiter {
    admit: bool,
    attempts: AtomicUsize,
}

impl FixedRateLimiter {
    /// Admit every device.
    pub fn allow() -> Self {
        Self {
            admit: true,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Deny every device.
    pub fn deny() -> Self {
        Self {
            admit: false,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of `try_acquire` calls.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ConnectionRateLimiter for FixedRateLimiter {
    fn try_acquire(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.admit
    }
}

/// Device-connected handler with a fixed answer.
pub struct StaticDeviceConnectedHandler {
    answer: Result<ConnectionStatus, DeviceConnectError>,
    calls: AtomicUsize,
}

impl StaticDeviceConnectedHandler {
    /// Accept every device.
    pub fn may_continue() -> Self {
        Self::returning(ConnectionStatus::MayContinue)
    }

    /// Answer with `status`.
    pub fn returning(status: ConnectionStatus) -> Self {
        Self {
            answer: Ok(status),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            answer: Err(DeviceConnectError(reason.into())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceConnectedHandler for StaticDeviceConnectedHandler {
    async fn device_connected(
        &self,
        _context: Arc<dyn ConnectionContext>,
    ) -> Result<ConnectionStatus, DeviceConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}
