//! Tokio cooperative tick source.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::{CooperativeScheduler, RepeatingCommand};

type CommandQueue = Arc<Mutex<VecDeque<Box<dyn RepeatingCommand>>>>;

/// Steps commands round-robin on a single tokio task, yielding to the runtime
/// between steps.
///
/// At most one driver task exists per stepper (clones included), so no two
/// steps ever run at the same time, even on a multi-threaded runtime.
#[derive(Clone)]
pub struct TokioStepper {
    handle: tokio::runtime::Handle,
    commands: CommandQueue,
    driving: Arc<AtomicBool>,
}

impl TokioStepper {
    /// Create a stepper on a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            commands: Arc::default(),
            driving: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a stepper on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        tokio::runtime::Handle::try_current().map(Self::new)
    }

    /// Commands waiting for a step.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.commands.lock().len()
    }

    fn start_driver(&self) {
        if self.driving.swap(true, Ordering::AcqRel) {
            return;
        }
        let commands = Arc::clone(&self.commands);
        let driving = Arc::clone(&self.driving);
        self.handle.spawn(drive(commands, driving));
    }
}

/// Driver loop. Exits when the queue is empty, re-checking after releasing
/// the flag so a command scheduled in between is not stranded.
async fn drive(commands: CommandQueue, driving: Arc<AtomicBool>) {
    let mut steps = 0_u64;
    loop {
        let next = commands.lock().pop_front();
        let Some(mut command) = next else {
            driving.store(false, Ordering::Release);
            let resumed = !commands.lock().is_empty() && !driving.swap(true, Ordering::AcqRel);
            if resumed {
                continue;
            }
            trace!(steps, "tokio stepper idle");
            return;
        };
        steps += 1;
        if command.execute() {
            commands.lock().push_back(command);
        }
        tokio::task::yield_now().await;
    }
}

impl CooperativeScheduler for TokioStepper {
    fn schedule_incremental(&self, command: Box<dyn RepeatingCommand>) {
        self.commands.lock().push_back(command);
        self.start_driver();
    }
}

impl std::fmt::Debug for TokioStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioStepper")
            .field("pending", &self.pending())
            .field("driving", &self.driving.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
