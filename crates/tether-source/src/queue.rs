//! Serial action queue with explicit retry.
//!
//! Exactly one action runs at a time, FIFO. A failed action stays at the
//! head with the queue suspended; the caller decides between [`retry`] and
//! [`skip`]. Waiters holding a failed action's completion receive the error,
//! and a retry builds a fresh completion.
//!
//! [`retry`]: ActionQueue::retry
//! [`skip`]: ActionQueue::skip

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use tether_core::{Error, Result};
use tokio::sync::oneshot;

/// The future an action task produces.
pub type ActionFuture<O> = BoxFuture<'static, Result<O>>;

/// A retriable unit of work. Invoked once per attempt.
pub type ActionTask<O> = Box<dyn FnMut() -> ActionFuture<O> + Send>;

struct Action<O> {
    /// Taken while the attempt runs, restored on failure for retry.
    task: Option<ActionTask<O>>,
    waiters: Vec<oneshot::Sender<Result<O>>>,
}

struct QueueState<O> {
    actions: VecDeque<Action<O>>,
    suspended: bool,
}

/// FIFO queue guaranteeing a single in-flight action.
pub struct ActionQueue<O> {
    name: String,
    state: Mutex<QueueState<O>>,
    gate: tokio::sync::Mutex<()>,
}

impl<O: Clone + Send + 'static> ActionQueue<O> {
    /// Create an empty queue, named for log context.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                actions: VecDeque::new(),
                suspended: false,
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Number of queued actions (including a suspended head).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().actions.len()
    }

    /// Whether the queue holds no actions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue is suspended at a failed head action.
    pub fn is_suspended(&self) -> bool {
        self.state.lock().unwrap().suspended
    }

    /// Enqueue an action and await its completion.
    ///
    /// The returned future resolves when the action first succeeds, or
    /// fails with the action's error. If the action fails and is later
    /// skipped, pending completions fail with a queue error.
    pub async fn push(&self, task: ActionTask<O>) -> Result<O> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            let (tx, rx) = oneshot::channel();
            state.actions.push_back(Action {
                task: Some(task),
                waiters: vec![tx],
            });
            rx
        };
        self.process().await;
        Self::await_completion(rx).await
    }

    /// Re-run the failed head action and await its completion.
    ///
    /// Only valid while the queue is suspended at a failure.
    pub async fn retry(&self) -> Result<O> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            if !state.suspended {
                return Err(Error::Queue(format!("{}: nothing to retry", self.name)));
            }
            let head = state
                .actions
                .front_mut()
                .ok_or_else(|| Error::Queue(format!("{}: nothing to retry", self.name)))?;
            let (tx, rx) = oneshot::channel();
            head.waiters.push(tx);
            state.suspended = false;
            rx
        };
        self.process().await;
        Self::await_completion(rx).await
    }

    /// Drop the failed head action and resume processing the rest.
    ///
    /// A no-op unless the queue is suspended at a failure.
    pub async fn skip(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.suspended {
                return;
            }
            state.actions.pop_front();
            state.suspended = false;
        }
        self.process().await;
    }

    async fn await_completion(rx: oneshot::Receiver<Result<O>>) -> Result<O> {
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Queue("action dropped before completion".into())),
        }
    }

    /// Run queued actions until the queue is empty or suspends at a
    /// failure. Only one caller processes at a time; others fall through
    /// and await their completions.
    async fn process(&self) {
        let _gate = self.gate.lock().await;
        loop {
            let mut task = {
                let mut state = self.state.lock().unwrap();
                if state.suspended {
                    return;
                }
                match state.actions.front_mut() {
                    None => return,
                    Some(action) => match action.task.take() {
                        Some(task) => task,
                        None => return,
                    },
                }
            };

            let result = task().await;

            let mut state = self.state.lock().unwrap();
            match result {
                Ok(output) => {
                    if let Some(action) = state.actions.pop_front() {
                        for waiter in action.waiters {
                            let _ = waiter.send(Ok(output.clone()));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(queue = %self.name, error = %err, "action failed; queue suspended");
                    if let Some(head) = state.actions.front_mut() {
                        head.task = Some(task);
                        for waiter in head.waiters.drain(..) {
                            let _ = waiter.send(Err(err.clone()));
                        }
                    }
                    state.suspended = true;
                    return;
                }
            }
        }
    }
}
