//! Presenter collaborator.
//!
//! The engine never renders anything itself; it hands views and status
//! messages to a [`Presenter`] supplied by the UI layer.

use async_trait::async_trait;

use crate::discovery::types::{Card, View};

/// Status line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Informational message.
    Info(String),
    /// Something failed; the pipeline keeps running.
    Error(String),
}

impl Status {
    /// Message text.
    pub fn message(&self) -> &str {
        match self {
            Status::Info(message) | Status::Error(message) => message,
        }
    }

    /// Whether this reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }
}

/// Receiver of everything the pipeline wants displayed.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Display a card, the empty state, or a whole batch.
    fn present(&self, view: View);

    /// Swap one grid slot; `None` means the slot is removed.
    fn replace_card(&self, _position: usize, _card: Option<&Card>) {}

    /// Show a status message.
    fn status(&self, _status: Status) {}

    /// Resolve once the exit transition of `source_id` has finished.
    ///
    /// The pipeline bounds this wait with a fallback timeout.
    async fn exit_transition(&self, _source_id: &str) {}
}

/// Presenter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&self, _view: View) {}
}
