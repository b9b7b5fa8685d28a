//! Single-threaded I/O reactor driven from inside the scheduler's wait loop.
//!
//! Socket work runs as tasks on a current-thread tokio runtime that only
//! makes progress while the scheduler blocks in [`Reactor::run_one_until`] or
//! [`Reactor::poll`]. Receive tasks report back through one completion
//! channel; every completion becomes at most one queued event.

use std::io;
use std::time::Instant;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;

use crate::endpoint::Completion;

/// Outcome of one bounded reactor run.
pub(crate) enum Wakeup {
    Completion(Completion),
    SliceElapsed,
}

/// Cloneable access to the reactor for endpoints.
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    pub(crate) runtime: Handle,
    pub(crate) completions: mpsc::UnboundedSender<Completion>,
}

pub(crate) struct Reactor {
    runtime: Runtime,
    completion_sender: mpsc::UnboundedSender<Completion>,
    completion_receiver: mpsc::UnboundedReceiver<Completion>,
    stopped: bool,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .thread_name("rtbridge-reactor")
            .build()?;
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            completion_sender,
            completion_receiver,
            stopped: false,
        })
    }

    pub(crate) fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            runtime: self.runtime.handle().clone(),
            completions: self.completion_sender.clone(),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stops driving I/O. Outstanding operations stay parked, not awaited.
    pub(crate) fn stop(&mut self) {
        self.stopped = true;
    }

    pub(crate) fn reset(&mut self) {
        self.stopped = false;
    }

    /// Drives I/O until one completion is available or `deadline` passes.
    pub(crate) fn run_one_until(&mut self, deadline: Instant) -> Wakeup {
        let receiver = &mut self.completion_receiver;
        self.runtime.block_on(async {
            tokio::select! {
                biased;
                completion = receiver.recv() => match completion {
                    Some(completion) => Wakeup::Completion(completion),
                    None => Wakeup::SliceElapsed,
                },
                _ = tokio::time::sleep_until(deadline.into()) => Wakeup::SliceElapsed,
            }
        })
    }

    /// Runs ready work without blocking and returns every completion produced.
    pub(crate) fn poll(&mut self) -> Vec<Completion> {
        // First yield lets the driver wake ready receivers, the second lets them run
        self.runtime.block_on(async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        });

        let mut completions = Vec::new();
        while let Ok(completion) = self.completion_receiver.try_recv() {
            completions.push(completion);
        }
        completions
    }
}
