//! Caller-driven cooperative tick source.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::{CooperativeScheduler, RepeatingCommand};

/// Round-robin stepping loop driven by explicit `tick` calls.
///
/// Clones share the same command queue, so one clone can be handed to an
/// [`crate::core::IncrementalScheduler`] while another drives it. Commands may
/// schedule further commands while they execute.
#[derive(Clone, Default)]
pub struct StepLoop {
    commands: Arc<Mutex<VecDeque<Box<dyn RepeatingCommand>>>>,
}

impl StepLoop {
    /// Create an empty loop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands waiting for a step.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.commands.lock().len()
    }

    /// Step the command at the front once. A command asking to repeat goes
    /// to the back. Returns `false` when nothing was scheduled.
    pub fn tick(&self) -> bool {
        let Some(mut command) = self.commands.lock().pop_front() else {
            return false;
        };
        if command.execute() {
            self.commands.lock().push_back(command);
        }
        true
    }

    /// Tick until no command remains. Returns the number of steps taken.
    pub fn run_until_idle(&self) -> usize {
        let mut steps = 0;
        while self.tick() {
            steps += 1;
        }
        trace!(steps, "step loop idle");
        steps
    }
}

impl CooperativeScheduler for StepLoop {
    fn schedule_incremental(&self, command: Box<dyn RepeatingCommand>) {
        self.commands.lock().push_back(command);
    }
}

impl std::fmt::Debug for StepLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepLoop")
            .field("pending", &self.pending())
            .finish()
    }
}
