// executor thread control loop
use super::command::Command;
use super::context::ExecutionContext;
use crate::engine::{OneShotLists, Shared};
use crate::queue::Pop;
use std::sync::Arc;
use tracing::{debug, trace};

/// How the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Cancelled,
    Drained,
}

/// One routine per executor thread, alive for the thread's lifetime.
///
/// Phases: run the startup list, pop and perform queued commands until the
/// queue is cancelled or drained after close, then run either the
/// cancellation list or the shutdown list.
pub(crate) struct Routine {
    context: Arc<ExecutionContext>,
    shared: Arc<Shared>,
    lists: Arc<OneShotLists>,
}

impl Routine {
    pub fn new(
        context: Arc<ExecutionContext>,
        shared: Arc<Shared>,
        lists: Arc<OneShotLists>,
    ) -> Self {
        Self {
            context,
            shared,
            lists,
        }
    }

    pub fn run(self) -> Exit {
        let idx = self.context.thread_index();
        debug!(executor = idx, "executor started");

        self.run_list(&self.lists.init);

        let exit = loop {
            match self.shared.queue.pop() {
                Pop::Item(cmd) => {
                    self.perform(&cmd);
                    self.shared.record_executed(idx);
                    self.shared.finish_command();
                }
                Pop::Cancelled => break Exit::Cancelled,
                Pop::Closed => break Exit::Drained,
            }
        };

        match exit {
            Exit::Cancelled => {
                self.context.cancel();
                self.run_list(&self.lists.cancel);
            }
            Exit::Drained => self.run_list(&self.lists.fin),
        }

        debug!(executor = idx, ?exit, "executor stopped");
        exit
    }

    fn run_list(&self, list: &[Arc<Command>]) {
        for cmd in list {
            self.perform(cmd);
        }
    }

    fn perform(&self, cmd: &Command) {
        trace!(executor = self.context.thread_index(), "performing command");
        let ctx = &*self.context;
        if self.shared.panic_handler.execute(|| cmd.perform(ctx)).is_err() {
            // keep joiners from hanging on a command that never reached finish()
            cmd.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{PanicHandler, PanicStrategy};
    use parking_lot::Mutex;

    fn shared(executors: usize) -> Arc<Shared> {
        Arc::new(Shared::new(
            executors,
            PanicHandler::new(PanicStrategy::Isolate),
        ))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<Command> {
        let log = log.clone();
        Arc::new(Command::new(move |_| log.lock().push(name)))
    }

    fn lists(log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<OneShotLists> {
        Arc::new(OneShotLists {
            init: vec![recorder(log, "init")],
            fin: vec![recorder(log, "fin")],
            cancel: vec![recorder(log, "cancel")],
        })
    }

    #[test]
    fn test_drained_routine_runs_fin_list() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = shared(1);
        shared.submit(recorder(&log, "work")).unwrap();
        shared.queue.close();

        let ctx = Arc::new(ExecutionContext::new(0));
        let exit = Routine::new(ctx.clone(), shared.clone(), lists(&log)).run();

        assert_eq!(exit, Exit::Drained);
        assert_eq!(*log.lock(), vec!["init", "work", "fin"]);
        assert!(!ctx.is_cancelled());
        assert_eq!(shared.active_commands(), 0);
    }

    #[test]
    fn test_cancelled_routine_runs_cancel_list() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = shared(1);
        shared.queue.cancel();

        let ctx = Arc::new(ExecutionContext::new(0));
        let exit = Routine::new(ctx.clone(), shared, lists(&log)).run();

        assert_eq!(exit, Exit::Cancelled);
        assert_eq!(*log.lock(), vec!["init", "cancel"]);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_panicking_command_still_finishes() {
        let shared = shared(1);
        let cmd = Arc::new(Command::waitable(|_| panic!("boom")));
        shared.submit(cmd.clone()).unwrap();
        shared.queue.close();

        let log = Arc::new(Mutex::new(Vec::new()));
        Routine::new(Arc::new(ExecutionContext::new(0)), shared.clone(), lists(&log)).run();

        assert!(cmd.is_completed());
        assert!(cmd.join().is_ok());
        assert_eq!(shared.panic_handler.panic_count(), 1);
        assert_eq!(shared.active_commands(), 0);
    }
}
