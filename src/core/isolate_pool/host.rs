//! Isolated-context host collaborator and the reply route back to the
//! controller.

use crossbeam_channel::Sender;

use crate::core::HostError;

use super::WorkerId;

/// A raw message from a worker, tagged with the worker that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    /// Sending worker.
    pub worker: WorkerId,
    /// Framed message text.
    pub data: String,
}

/// Reply channel handed to each isolated context at spawn time.
///
/// Everything a context posts lands on the controller's single router,
/// tagged with the context's identity.
#[derive(Debug, Clone)]
pub struct MessageRoute {
    worker: WorkerId,
    tx: Sender<RoutedMessage>,
}

impl MessageRoute {
    /// Create a route for `worker`.
    #[must_use]
    pub const fn new(worker: WorkerId, tx: Sender<RoutedMessage>) -> Self {
        Self { worker, tx }
    }

    /// Identity of the worker owning this route.
    #[must_use]
    pub const fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Post a framed message to the controller. Returns `false` once the
    /// controller has gone away.
    pub fn post(&self, data: impl Into<String>) -> bool {
        self.tx
            .send(RoutedMessage {
                worker: self.worker,
                data: data.into(),
            })
            .is_ok()
    }
}

/// Starts, feeds and stops isolated execution contexts.
///
/// The controller never looks inside a handle. All communication is string
/// messages: `send` delivers a start message, replies come back through the
/// [`MessageRoute`] given to `spawn`.
pub trait IsolateHost: Send + 'static {
    /// Opaque per-context handle.
    type Handle: Send + 'static;

    /// Start a context loaded with the code for `worker_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] when the context cannot be started.
    fn spawn(&mut self, worker_type: &str, route: MessageRoute) -> Result<Self::Handle, HostError>;

    /// Deliver a message to a context.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] when the context no longer accepts messages.
    fn send(&mut self, handle: &Self::Handle, message: String) -> Result<(), HostError>;

    /// Stop a context.
    fn terminate(&mut self, handle: Self::Handle);
}
