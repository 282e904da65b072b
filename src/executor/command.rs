//! Commands and command chains.

use super::context::ExecutionContext;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Type-erased command body.
pub type CommandFn = Box<dyn Fn(&ExecutionContext) + Send + Sync + 'static>;

/// Completion signalling, allocated only for waitable commands.
struct WaitHandle {
    state: Mutex<WaitState>,
    cond: Condvar,
}

struct WaitState {
    completed: bool,
    waiters: usize,
}

impl WaitHandle {
    fn new() -> Self {
        Self {
            state: Mutex::new(WaitState {
                completed: false,
                waiters: 0,
            }),
            cond: Condvar::new(),
        }
    }
}

/// A single unit of work.
///
/// Commands are shared between the submitter and the queue through an
/// `Arc`. A waitable command carries its own condition so that any number of
/// threads can [`join`](Self::join) it; a fire-and-forget command carries no
/// synchronization state at all.
pub struct Command {
    func: CommandFn,
    wait: Option<WaitHandle>,
    completed: AtomicBool,
    discarded: AtomicBool,
}

impl Command {
    /// Fire-and-forget command.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        Self::with_waitable(f, false)
    }

    /// Command that can be joined.
    pub fn waitable<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        Self::with_waitable(f, true)
    }

    pub fn with_waitable<F>(f: F, waitable: bool) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        Self {
            func: Box::new(f),
            wait: waitable.then(WaitHandle::new),
            completed: AtomicBool::new(false),
            discarded: AtomicBool::new(false),
        }
    }

    /// Run the body against `ctx`, then [`finish`](Self::finish).
    pub fn perform(&self, ctx: &ExecutionContext) {
        (self.func)(ctx);
        self.finish();
    }

    /// Mark the command completed and release its joiners.
    ///
    /// Only the first call has an effect.
    pub fn finish(&self) {
        match &self.wait {
            Some(wait) => {
                let mut state = wait.state.lock();
                if state.completed {
                    return;
                }
                state.completed = true;
                self.completed.store(true, Ordering::Release);
                wait.cond.notify_all();
            }
            None => self.completed.store(true, Ordering::Release),
        }
    }

    /// Finish without running the body.
    pub(crate) fn discard(&self) {
        if !self.is_completed() {
            self.discarded.store(true, Ordering::Release);
        }
        self.finish();
    }

    /// Block until the command has completed.
    pub fn join(&self) -> Result<()> {
        let wait = self.wait.as_ref().ok_or(Error::NotWaitable)?;
        let mut state = wait.state.lock();
        state.waiters += 1;
        while !state.completed {
            wait.cond.wait(&mut state);
        }
        state.waiters -= 1;
        Ok(())
    }

    /// Like [`join`](Self::join) but gives up after `timeout`.
    /// Returns whether the command completed.
    pub fn join_timeout(&self, timeout: Duration) -> Result<bool> {
        let wait = self.wait.as_ref().ok_or(Error::NotWaitable)?;
        let deadline = Instant::now() + timeout;
        let mut state = wait.state.lock();
        state.waiters += 1;
        while !state.completed {
            if wait.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.waiters -= 1;
        Ok(state.completed)
    }

    pub fn is_waitable(&self) -> bool {
        self.wait.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// True if the queue dropped this command before its body ran.
    pub fn was_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Threads currently blocked in `join`.
    pub fn waiters(&self) -> usize {
        self.wait.as_ref().map_or(0, |wait| wait.state.lock().waiters)
    }
}

impl From<Chain> for Command {
    fn from(chain: Chain) -> Self {
        Command::new(move |ctx: &ExecutionContext| chain.run(ctx))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("waitable", &self.is_waitable())
            .field("completed", &self.is_completed())
            .field("discarded", &self.was_discarded())
            .finish()
    }
}

/// Ordered steps executed back to back inside one command.
///
/// Steps all see the same context. The chain never skips a step on its own;
/// each step decides whether to bail out when the context is cancelled.
#[derive(Default)]
pub struct Chain {
    steps: Vec<CommandFn>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain starting from a single step.
    pub fn with<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        Self::new().add_command(f)
    }

    /// Append a step.
    pub fn add_command<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        self.steps.push(Box::new(f));
        self
    }

    pub fn push<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        self.steps.push(Box::new(f));
        self
    }

    pub fn run(&self, ctx: &ExecutionContext) {
        for step in &self.steps {
            step(ctx);
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Wrap the chain into a command.
    pub fn into_command(self, waitable: bool) -> Command {
        Command::with_waitable(move |ctx: &ExecutionContext| self.run(ctx), waitable)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("steps", &self.steps.len()).finish()
    }
}
