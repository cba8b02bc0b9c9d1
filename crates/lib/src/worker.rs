//! Background turn worker.
//!
//! Each submitted turn runs as its own task on the given runtime and hands the finished
//! assistant `Turn` back over a single-result channel. Progress (tool in use / idle) is
//! published on a watch channel front-ends can subscribe to.
//!
//! Precondition: at most one turn per session is outstanding at a time. `AppState` refuses a
//! second submission while one is pending; other callers must hold the same discipline.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::agent::{run_turn, Progress, ToolExecutor, TurnRequest};
use crate::llm::ChatBackend;
use crate::session::Turn;

/// A turn ready to run, tagged with the session it was submitted from.
#[derive(Debug, Clone)]
pub struct TurnJob {
    pub session: usize,
    pub request: TurnRequest,
}

/// Handle to an outstanding turn.
pub struct PendingTurn {
    pub session: usize,
    rx: oneshot::Receiver<Turn>,
}

impl PendingTurn {
    /// Non-blocking poll for UI loops. Returns the turn once it is ready.
    pub fn try_take(&mut self) -> Option<Turn> {
        match self.rx.try_recv() {
            Ok(turn) => Some(turn),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(worker_gone()),
        }
    }

    pub async fn wait(self) -> Turn {
        self.rx.await.unwrap_or_else(|_| worker_gone())
    }
}

fn worker_gone() -> Turn {
    log::error!("worker: turn task ended without a reply");
    Turn::assistant("Error: turn worker stopped before replying", None)
}

pub struct TurnWorker {
    backend: Arc<dyn ChatBackend>,
    tools: Arc<dyn ToolExecutor>,
    handle: Handle,
    progress: Arc<watch::Sender<Progress>>,
}

impl TurnWorker {
    pub fn new(backend: Arc<dyn ChatBackend>, tools: Arc<dyn ToolExecutor>, handle: Handle) -> Self {
        let (tx, _) = watch::channel(Progress::Idle);
        Self {
            backend,
            tools,
            handle,
            progress: Arc::new(tx),
        }
    }

    /// Subscribe to progress updates.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Start the turn in the background.
    pub fn submit(&self, job: TurnJob) -> PendingTurn {
        let (tx, rx) = oneshot::channel();
        self.progress.send_replace(Progress::Idle);
        let backend = Arc::clone(&self.backend);
        let tools = Arc::clone(&self.tools);
        let progress = Arc::clone(&self.progress);
        log::debug!("worker: submitting turn for chat {}", job.session);
        self.handle.spawn(async move {
            let notify = move |p: Progress| {
                progress.send_replace(p);
            };
            let turn = run_turn(backend.as_ref(), tools.as_ref(), job.request, &notify).await;
            if tx.send(turn).is_err() {
                log::debug!("worker: reply dropped, receiver gone");
            }
        });
        PendingTurn {
            session: job.session,
            rx,
        }
    }
}
