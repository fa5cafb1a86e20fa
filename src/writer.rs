//! Single writer thread.
//!
//! The medium tolerates exactly one mutating context. [`Writer`] moves a
//! [`Database`] onto a dedicated thread and lets any number of callers hand
//! it operations, each caller blocking until its own result comes back.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};

use crate::database::Database;
use crate::error::{Error, Result};
use crate::medium::Medium;
use crate::types::Response;

/// Operations queued ahead of the writer before callers block on submit
const QUEUE_CAPACITY: usize = 64;

type Job<M> = Box<dyn FnOnce(&mut Database<M>) -> Response + Send>;

enum Command<M> {
    Run {
        job: Job<M>,
        responder: SyncSender<Response>,
    },
    Shutdown,
}

/// Handle on the writer thread owning one database
///
/// Dropping the handle drains the queue, flushes the medium and joins the
/// thread.
pub struct Writer<M> {
    command_tx: SyncSender<Command<M>>,
    join: Option<JoinHandle<()>>,
    /// Bound on each caller's wait
    timeout: Duration,
}

impl<M: Medium + 'static> Writer<M> {
    /// Move `db` onto a new writer thread
    pub fn spawn(db: Database<M>) -> Result<Self> {
        let timeout = db.options().handoff_timeout;
        let (command_tx, command_rx) = mpsc::sync_channel(QUEUE_CAPACITY);

        let join = thread::Builder::new()
            .name("blockdb-writer".into())
            .spawn(move || worker_loop(db, command_rx))?;

        Ok(Writer {
            command_tx,
            join: Some(join),
            timeout,
        })
    }

    /// Run `op` on the writer thread and wait for its result
    ///
    /// A panic inside `op` becomes a 500 response. If no answer arrives
    /// within the handoff timeout the caller gets a 503; the operation itself
    /// may still complete later.
    pub fn call<F>(&self, op: F) -> Response
    where
        F: FnOnce(&mut Database<M>) -> Response + Send + 'static,
    {
        // room for one answer so a late reply never blocks the writer
        let (responder, response_rx) = mpsc::sync_channel(1);
        let command = Command::Run {
            job: Box::new(op),
            responder,
        };
        if self.command_tx.send(command).is_err() {
            return Response::from(Error::WorkerClosed);
        }

        match response_rx.recv_timeout(self.timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Writer did not answer within {:?}", self.timeout);
                Response::from(Error::HandoffTimeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Response::from(Error::WorkerClosed),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<M> Drop for Writer<M> {
    fn drop(&mut self) {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop<M: Medium>(mut db: Database<M>, command_rx: Receiver<Command<M>>) {
    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Run { job, responder } => {
                let response = panic::catch_unwind(AssertUnwindSafe(|| job(&mut db)))
                    .unwrap_or_else(|payload| {
                        let reason = panic_message(payload.as_ref());
                        error!("Operation panicked on the writer thread: {}", reason);
                        Response::from(Error::WorkerPanicked(reason))
                    });
                if responder.send(response).is_err() {
                    debug!("Caller stopped waiting before the writer answered");
                }
            }
            Command::Shutdown => break,
        }
    }

    if let Err(err) = db.flush() {
        error!("Failed to flush medium on writer shutdown: {}", err);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
