//! Control channel between callers and a job's execution task.
//!
//! Callers never touch a job's status directly. They send a [`Signal`] and
//! wait, with a bounded timeout, for the task to acknowledge it. The task
//! answers with the status it moved to, or with its current status when the
//! signal is not legal from there.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::state::JobStatus;

/// Control messages understood by an execution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Halt,
    Resume,
    Stop,
}

impl Signal {
    /// Status the task moves to when it accepts this signal.
    pub fn target(&self) -> JobStatus {
        match self {
            Self::Halt => JobStatus::Halted,
            Self::Resume => JobStatus::Running,
            Self::Stop => JobStatus::Stopped,
        }
    }
}

/// `Ok(new status)` when accepted, `Err(current status)` when rejected.
pub type SignalReply = Result<JobStatus, JobStatus>;

/// A signal in flight, together with the channel its reply goes back on.
#[derive(Debug)]
pub struct ControlMessage {
    pub signal: Signal,
    pub reply: oneshot::Sender<SignalReply>,
}

impl ControlMessage {
    /// Answer the caller. A caller that gave up waiting is ignored.
    pub fn respond(self, reply: SignalReply) {
        let _ = self.reply.send(reply);
    }
}

/// Why a signal could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The task has exited and no longer reads its channel.
    Closed,
    /// The channel stayed full, or the task did not reply, within the timeout.
    TimedOut,
}

/// Create a control channel with the given capacity.
pub fn channel(capacity: usize, timeout: Duration) -> (SignalSender, mpsc::Receiver<ControlMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SignalSender { tx, timeout }, rx)
}

/// Caller side of a job's control channel.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<ControlMessage>,
    timeout: Duration,
}

impl SignalSender {
    /// Send a signal and wait for the task's reply.
    ///
    /// Both the send and the reply are bounded by the configured timeout, so a
    /// caller is never stuck behind a task that is gone or wedged.
    pub async fn deliver(&self, signal: Signal) -> Result<SignalReply, DeliveryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = ControlMessage {
            signal,
            reply: reply_tx,
        };

        match timeout(self.timeout, self.tx.send(message)).await {
            Err(_) => return Err(DeliveryError::TimedOut),
            Ok(Err(_)) => return Err(DeliveryError::Closed),
            Ok(Ok(())) => {}
        }

        match timeout(self.timeout, reply_rx).await {
            Err(_) => Err(DeliveryError::TimedOut),
            // Task dropped the message while exiting.
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
