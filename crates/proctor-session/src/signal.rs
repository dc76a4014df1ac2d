//! Internal signals delivered back to the session controller.
//!
//! Background tasks never touch session state directly. The countdown ticker
//! and the answer persister send these signals over an unbounded channel and
//! the event loop hands them to [`ExamSession::handle_signal`], which keeps
//! every state change on a single logical thread.
//!
//! [`ExamSession::handle_signal`]: crate::ExamSession::handle_signal

use tokio::sync::mpsc;

use crate::error::ProctorError;

/// A signal produced by a background task of the session.
///
/// Every signal carries the session epoch it was produced in; the controller
/// drops signals from an earlier epoch (for example after a reset).
#[derive(Debug)]
pub enum SessionSignal {
    /// One countdown period elapsed.
    Tick {
        /// Epoch of the session that scheduled the tick.
        epoch: u64,
    },
    /// A persist call for one answer finished.
    Persisted {
        /// Epoch of the session that dispatched the call.
        epoch: u64,
        /// Question the answer belongs to.
        question_id: String,
        /// Revision of the answer that was sent.
        revision: u64,
        /// Outcome of the call.
        result: Result<(), ProctorError>,
    },
}

impl SessionSignal {
    /// Returns the epoch the signal was produced in.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        match self {
            Self::Tick { epoch } | Self::Persisted { epoch, .. } => *epoch,
        }
    }
}

/// Sending half of the signal channel.
pub type SignalSender = mpsc::UnboundedSender<SessionSignal>;

/// Receiving half of the signal channel, owned by the event loop.
pub type SignalReceiver = mpsc::UnboundedReceiver<SessionSignal>;
