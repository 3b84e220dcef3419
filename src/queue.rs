//! Bounded hand-off of render jobs from the producer to the workers.

use crate::shared_types::{Message, RenderJob};
use crossbeam::channel::{Receiver, SendError, Sender, bounded};

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("work queue disconnected, all workers are gone")]
pub struct Disconnected;

impl<T> From<SendError<T>> for Disconnected {
    fn from(_: SendError<T>) -> Self {
        Self
    }
}

/// Producer side. Pushing blocks while the queue is full and fails once every
/// receiver is gone.
#[derive(Clone, Debug)]
pub struct WorkQueue {
    tx: Sender<Message>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> (Self, WorkReceiver) {
        let (tx, rx) = bounded(capacity.max(1));

        (Self { tx }, WorkReceiver { rx })
    }

    pub fn push(&self, job: RenderJob) -> Result<(), Disconnected> {
        Ok(self.tx.send(Message::Render(job))?)
    }

    /// Sends one shutdown signal per worker. Everything pushed before is
    /// delivered first.
    pub fn shutdown(&self, workers: usize) -> Result<(), Disconnected> {
        for _ in 0..workers {
            self.tx.send(Message::Shutdown)?;
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

/// Consumer side, cloned once per worker.
#[derive(Clone, Debug)]
pub struct WorkReceiver {
    rx: Receiver<Message>,
}

impl WorkReceiver {
    /// Blocks until a message arrives. A closed channel reads as shutdown.
    pub fn pop(&self) -> Message {
        self.rx.recv().unwrap_or(Message::Shutdown)
    }
}
