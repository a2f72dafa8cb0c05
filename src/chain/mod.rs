//! Chain builder and orchestrator.
//!
//! Builds one [`SequencerNode`] per task in launch order, spawns the task
//! that feeds it, and collects the outcome of the whole chain.
//!
//! ```text
//!   seeded(sink) ──▶ node 0 ──handoff──▶ node 1 ──handoff──▶ … ──▶ node N-1 ──▶ tail
//!                     ▲                   ▲                          ▲
//!                  task 0              task 1                    task N-1
//! ```
//!
//! All tasks run concurrently. Bytes reach the sink strictly in position order
//! because node *i+1* cannot receive the sink before node *i* forwards it.
//! The first failing task cancels the shared token, which wakes every waiting
//! node; the chain then reports that first failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::SequencerConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, run_task};
use crate::input::TaskSource;
use crate::sequencer::{HandoffReceiver, SequencerNode, handoff};
use crate::types::{Completed, Task};


/// What a spawned task reports back when it ends.
struct TaskOutcome {
    task: Task,
    result: Result<u64>,
}

/// An ordered chain of concurrently running tasks sharing one sink.
pub struct Chain<W, F: ?Sized> {
    fetcher: Arc<F>,
    handoff_wait: Duration,
    cancel: CancellationToken,
    tasks: JoinSet<TaskOutcome>,
    /// Which task each spawned future runs, for reporting panics.
    spawned: HashMap<task::Id, Task>,
    /// Slot the last launched node forwards into (or the seeded sink).
    tail: HandoffReceiver<W>,
    launched: usize,
}

impl<W, F> Chain<W, F>
where
    W: AsyncWrite + Unpin + Send + 'static,
    F: Fetcher + ?Sized + 'static,
{
    /// Create an empty chain that will write into `sink`.
    pub fn new(sink: W, fetcher: Arc<F>, config: &SequencerConfig) -> Self {
        Self::with_cancellation(sink, fetcher, config, CancellationToken::new())
    }

    /// Create an empty chain observing an externally owned cancellation token
    /// (e.g. one tied to process signals).
    pub fn with_cancellation(
        sink: W,
        fetcher: Arc<F>,
        config: &SequencerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            handoff_wait: config.handoff_wait(),
            cancel,
            tasks: JoinSet::new(),
            spawned: HashMap::new(),
            tail: handoff::seeded(sink),
            launched: 0,
        }
    }

    /// A handle to the chain's shared cancellation token
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort every task that is still running or waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Number of tasks launched so far
    pub fn len(&self) -> usize {
        self.launched
    }

    /// True if no task has been launched
    pub fn is_empty(&self) -> bool {
        self.launched == 0
    }

    /// Append a task at the next position and start it immediately.
    ///
    /// Returns the task's position.
    pub fn push(&mut self, url: impl Into<String>) -> usize {
        let index = self.launched;
        let task = Task::new(index, url);

        let (downstream, next_tail) = handoff::channel();
        let upstream = std::mem::replace(&mut self.tail, next_tail);
        let node = SequencerNode::new(
            index,
            upstream,
            downstream,
            self.cancel.clone(),
            self.handoff_wait,
        );

        tracing::debug!(index, url = %task.url, "launching task");
        let handle = self.tasks.spawn(drive(
            Arc::clone(&self.fetcher),
            task.clone(),
            node,
            self.cancel.clone(),
        ));
        self.spawned.insert(handle.id(), task);
        self.launched += 1;
        index
    }

    /// Launch one task per identifier read from `source`, as each line arrives.
    ///
    /// Stops at the end of the sequence or once the chain is cancelled. A read
    /// failure cancels the chain and is returned as [`Error::Input`].
    pub async fn extend_from<R>(&mut self, source: &mut TaskSource<R>) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut added = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(launched = self.launched, "chain cancelled, no longer reading tasks");
                    break;
                }
                next = source.next_task() => next,
            };

            match next {
                Ok(Some(url)) => {
                    self.push(url);
                    added += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read task list");
                    self.cancel.cancel();
                    return Err(e);
                }
            }
        }
        Ok(added)
    }

    /// Read every task from `source`, run the chain and wait for it to finish.
    pub async fn run<R>(mut self, source: &mut TaskSource<R>) -> Result<Completed<W>>
    where
        R: AsyncBufRead + Unpin,
    {
        if let Err(e) = self.extend_from(source).await {
            // Drain the cancelled tasks; the input failure is what gets reported.
            let _ = self.finish().await;
            return Err(e);
        }
        self.finish().await
    }

    /// Wait for every launched task, then finalize and return the sink.
    ///
    /// On failure returns the first root-cause error wrapped in
    /// [`Error::Task`]; cancellation fallout from the other positions is
    /// suppressed unless nothing else went wrong (external cancellation).
    pub async fn finish(mut self) -> Result<Completed<W>> {
        let mut failure: Option<Error> = None;
        let mut fallout: Option<Error> = None;
        let mut bytes_written = 0u64;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(TaskOutcome {
                    result: Ok(bytes), ..
                }) => bytes_written += bytes,
                Ok(TaskOutcome {
                    task,
                    result: Err(source),
                }) => {
                    self.cancel.cancel();
                    let err = Error::Task {
                        index: task.index,
                        url: task.url,
                        source: Box::new(source),
                    };
                    if err.is_cancellation() {
                        fallout.get_or_insert(err);
                    } else if failure.is_none() {
                        failure = Some(err);
                    } else {
                        tracing::debug!(error = %err, "suppressing failure after the first");
                    }
                }
                Err(join_error) => {
                    self.cancel.cancel();
                    let panicked = Error::TaskPanicked(join_error.to_string());
                    let err = match self.spawned.remove(&join_error.id()) {
                        Some(task) => Error::Task {
                            index: task.index,
                            url: task.url,
                            source: Box::new(panicked),
                        },
                        None => panicked,
                    };
                    tracing::error!(error = %err, "task panicked");
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure.or(fallout) {
            return Err(err);
        }

        let Some(mut sink) = self.tail.try_take() else {
            return Err(Error::ChainBroken);
        };
        sink.shutdown().await.map_err(Error::SinkWrite)?;

        tracing::info!(
            tasks = self.launched,
            bytes = bytes_written,
            "all tasks finished"
        );
        Ok(Completed {
            sink,
            tasks: self.launched,
            bytes_written,
        })
    }
}

/// Run one task to the end and close its node exactly once, whatever happened.
async fn drive<F, W>(
    fetcher: Arc<F>,
    task: Task,
    mut node: SequencerNode<W>,
    cancel: CancellationToken,
) -> TaskOutcome
where
    F: Fetcher + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let result = match run_task(fetcher.as_ref(), &task, &mut node).await {
        Ok(_) => node.close().await,
        Err(e) => {
            // Cancel before handing the sink on, so the successor sees the
            // cancellation rather than a turn to write.
            cancel.cancel();
            node.abandon();
            Err(e)
        }
    };

    // Every failed exit, a broken chain included, stops the other positions.
    if result.is_err() {
        cancel.cancel();
    }

    match &result {
        Ok(bytes) => {
            tracing::info!(index = task.index, url = %task.url, bytes, "finished task");
        }
        Err(e) if e.is_cancellation() => {
            tracing::debug!(index = task.index, url = %task.url, "task unwound after cancellation");
        }
        Err(e) => {
            tracing::warn!(
                index = task.index,
                url = %task.url,
                error = %e,
                code = e.error_code(),
                "task failed"
            );
        }
    }

    TaskOutcome { task, result }
}
