use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::routine::{Exit, Routine};
use crate::executor::{Command, ExecutionContext, PanicHandler};
use crate::queue::WorkQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Lifecycle phase of a [`CommandsQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed or cleared; no executor threads.
    Idle,
    Running,
    Cancelled,
    ShutDown,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Main-queue commands performed, indexed by executor.
    pub executed_per_worker: Vec<u64>,
    /// Commands dropped before their body ran.
    pub discarded: u64,
    pub panicked: usize,
}

/// Startup, shutdown and cancellation lists, frozen at start.
#[derive(Debug, Clone, Default)]
pub(crate) struct OneShotLists {
    pub init: Vec<Arc<Command>>,
    pub fin: Vec<Arc<Command>>,
    pub cancel: Vec<Arc<Command>>,
}

/// State shared between the queue handle and every executor thread.
pub(crate) struct Shared {
    pub queue: WorkQueue<Arc<Command>>,
    pub panic_handler: PanicHandler,
    active: Mutex<usize>,
    idle: Condvar,
    running: Mutex<usize>,
    exited: Condvar,
    executed: Box<[AtomicU64]>,
    discarded: AtomicU64,
}

impl Shared {
    pub fn new(executors: usize, panic_handler: PanicHandler) -> Self {
        Self {
            queue: WorkQueue::new(),
            panic_handler,
            active: Mutex::new(0),
            idle: Condvar::new(),
            running: Mutex::new(0),
            exited: Condvar::new(),
            executed: (0..executors).map(|_| AtomicU64::new(0)).collect(),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn submit(&self, cmd: Arc<Command>) -> Result<()> {
        // count under the queue lock so no executor can finish it first
        self.queue
            .push_with(cmd, || *self.active.lock() += 1)
            .map_err(|_| {
                if self.queue.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::ShutDown
                }
            })
    }

    pub fn finish_command(&self) {
        self.release(1);
    }

    /// Finish `cmds` without running them. Returns how many were dropped.
    pub fn discard(&self, cmds: Vec<Arc<Command>>) -> usize {
        let n = cmds.len();
        if n == 0 {
            return 0;
        }
        for cmd in &cmds {
            cmd.discard();
        }
        self.discarded.fetch_add(n as u64, Ordering::Relaxed);
        self.release(n);
        n
    }

    fn release(&self, n: usize) {
        let mut active = self.active.lock();
        debug_assert!(*active >= n, "active command count underflow");
        *active = active.saturating_sub(n);
        if *active == 0 {
            self.idle.notify_all();
        }
    }

    pub fn wait_idle(&self) {
        let mut active = self.active.lock();
        while *active != 0 {
            self.idle.wait(&mut active);
        }
    }

    pub fn active_commands(&self) -> usize {
        *self.active.lock()
    }

    fn executor_spawned(&self) {
        *self.running.lock() += 1;
    }

    fn executor_exited(&self) {
        let mut running = self.running.lock();
        *running -= 1;
        if *running == 0 {
            self.exited.notify_all();
        }
    }

    pub fn running_executors(&self) -> usize {
        *self.running.lock()
    }

    /// Block until every executor thread has left its routine.
    pub fn wait_exited(&self) {
        let mut running = self.running.lock();
        while *running != 0 {
            self.exited.wait(&mut running);
        }
    }

    pub fn record_executed(&self, executor: usize) {
        self.executed[executor].fetch_add(1, Ordering::Relaxed);
    }
}

struct Executor {
    context: Arc<ExecutionContext>,
    thread: JoinHandle<Exit>,
}

struct Lifecycle {
    phase: Phase,
    lists: OneShotLists,
    executors: Vec<Executor>,
    // outlives `executors` so a cancel can reach threads another call is joining
    contexts: Vec<Arc<ExecutionContext>>,
}

/// Fixed-size pool of executor threads fed from one shared work queue.
///
/// Commands go to the main queue with [`add_command`](Self::add_command) and
/// friends. Before [`start`](Self::start), commands may also be registered
/// to run once on every executor at startup, at graceful shutdown, or on
/// cancellation.
///
/// ```no_run
/// use commands_queue::prelude::*;
///
/// let queue = CommandsQueue::new(2).unwrap();
/// queue.start().unwrap();
///
/// let cmd = queue.add_waitable(|ctx| {
///     println!("running on executor {}", ctx.thread_index());
/// }).unwrap();
/// cmd.join().unwrap();
///
/// queue.join();
/// queue.shutdown();
/// ```
pub struct CommandsQueue {
    config: Config,
    executors_count: usize,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl CommandsQueue {
    /// Queue with `executors` threads and otherwise default config.
    pub fn new(executors: usize) -> Result<Self> {
        let config = Config::builder().num_threads(executors).build()?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;

        let executors_count = config.executors();
        if executors_count == 0 {
            return Err(Error::config("need at least 1 executor"));
        }

        let shared = Arc::new(Shared::new(
            executors_count,
            PanicHandler::new(config.panic_strategy),
        ));

        Ok(Self {
            config,
            executors_count,
            shared,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Idle,
                lists: OneShotLists::default(),
                executors: Vec::with_capacity(executors_count),
                contexts: Vec::with_capacity(executors_count),
            }),
        })
    }

    pub fn executors_count(&self) -> usize {
        self.executors_count
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enqueue a command on the main queue.
    ///
    /// Commands added before [`start`](Self::start) wait in the queue.
    /// Fails once the queue has been cancelled or shut down.
    pub fn add_command(&self, cmd: Arc<Command>) -> Result<()> {
        self.shared.submit(cmd)
    }

    /// Enqueue a fire-and-forget closure.
    pub fn add<F>(&self, f: F) -> Result<Arc<Command>>
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        let cmd = Arc::new(Command::new(f));
        self.add_command(cmd.clone())?;
        Ok(cmd)
    }

    /// Enqueue a closure whose completion can be joined.
    pub fn add_waitable<F>(&self, f: F) -> Result<Arc<Command>>
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        let cmd = Arc::new(Command::waitable(f));
        self.add_command(cmd.clone())?;
        Ok(cmd)
    }

    /// Register a command every executor runs before it pops any work.
    pub fn add_init_command(&self, cmd: Arc<Command>) -> Result<()> {
        self.push_one_shot(cmd, |lists| &mut lists.init)
    }

    /// Register a command every executor runs on graceful shutdown.
    pub fn add_fin_command(&self, cmd: Arc<Command>) -> Result<()> {
        self.push_one_shot(cmd, |lists| &mut lists.fin)
    }

    /// Register a command every executor runs once cancelled.
    pub fn add_cancel_command(&self, cmd: Arc<Command>) -> Result<()> {
        self.push_one_shot(cmd, |lists| &mut lists.cancel)
    }

    pub fn add_init<F>(&self, f: F) -> Result<Arc<Command>>
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        let cmd = Arc::new(Command::new(f));
        self.add_init_command(cmd.clone())?;
        Ok(cmd)
    }

    pub fn add_fin<F>(&self, f: F) -> Result<Arc<Command>>
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        let cmd = Arc::new(Command::new(f));
        self.add_fin_command(cmd.clone())?;
        Ok(cmd)
    }

    pub fn add_cancel<F>(&self, f: F) -> Result<Arc<Command>>
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        let cmd = Arc::new(Command::new(f));
        self.add_cancel_command(cmd.clone())?;
        Ok(cmd)
    }

    fn push_one_shot<F>(&self, cmd: Arc<Command>, select: F) -> Result<()>
    where
        F: FnOnce(&mut OneShotLists) -> &mut Vec<Arc<Command>>,
    {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase != Phase::Idle {
            return Err(Error::AlreadyStarted);
        }
        select(&mut lifecycle.lists).push(cmd);
        Ok(())
    }

    /// Spawn the executor threads.
    ///
    /// The one-shot lists are frozen here; every executor sees the same
    /// snapshot.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            Phase::Idle => {}
            Phase::Running => return Err(Error::AlreadyStarted),
            Phase::Cancelled => return Err(Error::Cancelled),
            Phase::ShutDown => return Err(Error::ShutDown),
        }

        let lists = Arc::new(lifecycle.lists.clone());
        let mut executors = Vec::with_capacity(self.executors_count);

        for idx in 0..self.executors_count {
            let context = Arc::new(ExecutionContext::new(idx));
            let routine = Routine::new(context.clone(), self.shared.clone(), lists.clone());
            let shared = self.shared.clone();

            let mut builder =
                thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, idx));
            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            shared.executor_spawned();
            let spawned = builder.spawn(move || {
                let exit = routine.run();
                shared.executor_exited();
                exit
            });

            match spawned {
                Ok(thread) => executors.push(Executor { context, thread }),
                Err(e) => {
                    self.shared.executor_exited();
                    warn!(executor = idx, error = %e, "failed to spawn executor, cancelling");
                    let contexts: Vec<_> = executors.iter().map(|ex| ex.context.clone()).collect();
                    lifecycle.phase = Phase::Cancelled;
                    drop(lifecycle);
                    self.cancel_contexts(&contexts);
                    self.join_executors(executors);
                    return Err(Error::Spawn(e));
                }
            }
        }

        lifecycle.contexts = executors.iter().map(|ex| ex.context.clone()).collect();
        lifecycle.executors = executors;
        lifecycle.phase = Phase::Running;
        debug!(executors = self.executors_count, "commands queue started");
        Ok(())
    }

    /// Cancel the whole pool.
    ///
    /// Every execution context is flagged, queued commands are discarded and
    /// blocked executors wake up, run the cancellation list and exit. Also
    /// escalates a [`shutdown`](Self::shutdown) that is still draining.
    /// Blocks until all executor threads have exited. Idempotent.
    pub fn cancel(&self) {
        let (executors, contexts) = {
            let mut lifecycle = self.lifecycle.lock();
            let phase = lifecycle.phase;
            match phase {
                Phase::Cancelled => {
                    drop(lifecycle);
                    self.shared.wait_exited();
                    return;
                }
                Phase::ShutDown if self.shared.running_executors() == 0 => return,
                _ => {}
            }
            lifecycle.phase = Phase::Cancelled;
            (
                std::mem::take(&mut lifecycle.executors),
                lifecycle.contexts.clone(),
            )
        };

        self.cancel_contexts(&contexts);
        self.join_executors(executors);
        debug!("commands queue cancelled");
    }

    /// Stop accepting commands, let executors drain the queue, run the
    /// shutdown list and exit. Blocks until all executor threads have exited.
    pub fn shutdown(&self) {
        let executors = {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(lifecycle.phase, Phase::Cancelled | Phase::ShutDown) {
                drop(lifecycle);
                self.shared.wait_exited();
                return;
            }
            lifecycle.phase = Phase::ShutDown;
            std::mem::take(&mut lifecycle.executors)
        };

        self.shared.queue.close();
        if executors.is_empty() {
            // nobody left to drain it
            self.shared.discard(self.shared.queue.clear());
        }
        self.join_executors(executors);
        debug!("commands queue shut down");
    }

    fn cancel_contexts(&self, contexts: &[Arc<ExecutionContext>]) {
        for context in contexts {
            context.cancel();
        }
        self.shared.queue.cancel();
        self.shared.discard(self.shared.queue.clear());
    }

    fn join_executors(&self, executors: Vec<Executor>) {
        for executor in executors {
            let idx = executor.context.thread_index();
            if executor.thread.join().is_err() {
                warn!(executor = idx, "executor thread panicked");
            }
        }
        // handles may belong to a concurrent cancel or shutdown
        self.shared.wait_exited();
    }

    /// Drop every queued command that has not started yet.
    ///
    /// Running commands are left to finish and the pool keeps accepting
    /// work. Returns how many commands were discarded.
    pub fn cancel_commands(&self) -> usize {
        let discarded = self.shared.discard(self.shared.queue.clear());
        debug!(discarded, "pending commands discarded");
        discarded
    }

    /// Block until every main-queue command has completed or been discarded.
    pub fn join(&self) {
        self.shared.wait_idle();
    }

    /// Return to the idle state: empty queue, empty one-shot lists.
    ///
    /// Fails with [`Error::Busy`] while executors are running.
    pub fn clear(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase == Phase::Running || self.shared.running_executors() > 0 {
            return Err(Error::Busy);
        }

        let pending = self.shared.queue.reset();
        self.shared.discard(pending);
        lifecycle.lists = OneShotLists::default();
        lifecycle.executors.clear();
        lifecycle.contexts.clear();
        lifecycle.phase = Phase::Idle;
        debug!("commands queue cleared");
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.lock().phase
    }

    pub fn is_started(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase() == Phase::Cancelled
    }

    /// Main-queue commands submitted but not yet completed.
    pub fn active_commands(&self) -> usize {
        self.shared.active_commands()
    }

    /// Main-queue commands not yet picked up by an executor.
    pub fn pending_commands(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            executed_per_worker: self
                .shared
                .executed
                .iter()
                .map(|n| n.load(Ordering::Relaxed))
                .collect(),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            panicked: self.shared.panic_handler.panic_count(),
        }
    }
}

impl Drop for CommandsQueue {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for CommandsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandsQueue")
            .field("executors", &self.executors_count)
            .field("phase", &self.phase())
            .field("active", &self.active_commands())
            .field("pending", &self.pending_commands())
            .finish()
    }
}
