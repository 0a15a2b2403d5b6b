use std::fmt;

use tokio::sync::{mpsc, oneshot};

use crate::signal::Signal;

/// A signal in flight, optionally carrying the reply channel of a pending
/// request/response exchange.
#[derive(Debug)]
pub struct Envelope {
    pub signal: Signal,
    pub reply_to: Option<oneshot::Sender<Signal>>,
}

impl Envelope {
    pub fn tell(signal: Signal) -> Self {
        Self {
            signal,
            reply_to: None,
        }
    }

    pub fn ask(signal: Signal, reply_to: oneshot::Sender<Signal>) -> Self {
        Self {
            signal,
            reply_to: Some(reply_to),
        }
    }
}

/// Addressable endpoint backed by an unbounded mailbox.
///
/// Sends are synchronous: two sends issued from the same control flow arrive
/// in issue order, and issuing an ask does not reorder relative to a plain
/// tell issued immediately after it. Callers that must not let a dependent
/// command race ahead of a request's effect rely on this.
#[derive(Clone)]
pub struct Recipient {
    name: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Recipient {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire-and-forget send. Returns false if the mailbox is gone.
    pub fn tell(&self, signal: Signal) -> bool {
        self.tx.send(Envelope::tell(signal)).is_ok()
    }

    /// Sends a signal together with its reply channel. Returns false if the
    /// mailbox is gone.
    pub fn send_with_reply(&self, signal: Signal, reply_to: oneshot::Sender<Signal>) -> bool {
        self.tx.send(Envelope::ask(signal, reply_to)).is_ok()
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient").field("name", &self.name).finish()
    }
}
