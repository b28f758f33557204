//! Presentation outputs
//!
//! The controller reports what the user should see through a
//! [`PresentationSink`]. Sinks must not block: they are called on the
//! navigation thread while an event is being processed.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Receiver of controller outputs
pub trait PresentationSink: Send {
    /// Replace the prompt describing the current mode
    fn set_prompt(&self, text: &str);

    /// Show a transient message (final results, recoverable failures)
    fn notify(&self, text: &str);

    /// Report a failure that ends the controller
    fn report_fatal(&self, cause: &str);
}

/// A single controller output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum PresentationOutput {
    Prompt(String),
    Notification(String),
    Fatal(String),
}

/// Sink that forwards outputs over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<PresentationOutput>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<PresentationOutput>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, output: PresentationOutput) {
        if let Err(e) = self.tx.send(output) {
            tracing::debug!("Presentation receiver closed, dropping {:?}", e.into_inner());
        }
    }
}

impl PresentationSink for ChannelSink {
    fn set_prompt(&self, text: &str) {
        self.forward(PresentationOutput::Prompt(text.to_string()));
    }

    fn notify(&self, text: &str) {
        self.forward(PresentationOutput::Notification(text.to_string()));
    }

    fn report_fatal(&self, cause: &str) {
        self.forward(PresentationOutput::Fatal(cause.to_string()));
    }
}
