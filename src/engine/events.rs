//! Recognition events and their hand-off channel
//!
//! Engines emit events from their own thread. The sender side is cloneable and
//! never blocks; the navigation runtime owns the receiver.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event emitted by the recognition engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// Voice activity began
    SpeechStarted,
    /// Voice activity ended (terminal for grammar searches)
    SpeechEnded,
    /// In-progress transcription
    PartialHypothesis(String),
    /// Final transcription of an utterance
    FinalHypothesis(String),
    /// The activation's time budget ran out (terminal)
    Timeout,
    /// Engine-side failure (terminal)
    Error(String),
}

impl EngineEvent {
    /// Whether this event ends an activation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SpeechEnded | Self::Timeout | Self::Error(_))
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpeechStarted => f.write_str("speech-started"),
            Self::SpeechEnded => f.write_str("speech-ended"),
            Self::PartialHypothesis(text) => write!(f, "partial {}", text),
            Self::FinalHypothesis(text) => write!(f, "final {}", text),
            Self::Timeout => f.write_str("timeout"),
            Self::Error(cause) => write!(f, "error {}", cause),
        }
    }
}

/// Failure to parse the text form of an event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEventError {
    #[error("Empty event")]
    Empty,

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Event '{0}' requires text")]
    MissingText(&'static str),
}

impl FromStr for EngineEvent {
    type Err = ParseEventError;

    /// Parses `speech-started`, `speech-ended`, `partial <text>`,
    /// `final <text>`, `timeout` or `error <cause>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseEventError::Empty);
        }

        let (kind, rest) = match s.split_once(char::is_whitespace) {
            Some((kind, rest)) => (kind, rest.trim()),
            None => (s, ""),
        };

        let with_text = |name: &'static str, build: fn(String) -> EngineEvent| {
            if rest.is_empty() {
                Err(ParseEventError::MissingText(name))
            } else {
                Ok(build(rest.to_string()))
            }
        };

        match kind.to_ascii_lowercase().as_str() {
            "speech-started" | "start" => Ok(Self::SpeechStarted),
            "speech-ended" | "end" => Ok(Self::SpeechEnded),
            "partial" => with_text("partial", Self::PartialHypothesis),
            "final" => with_text("final", Self::FinalHypothesis),
            "timeout" => Ok(Self::Timeout),
            "error" => with_text("error", Self::Error),
            other => Err(ParseEventError::UnknownKind(other.to_string())),
        }
    }
}

/// Cloneable handle engines use to deliver events
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    tx: Sender<EngineEvent>,
}

impl EngineEventSender {
    /// Delivers an event. Returns false once the receiving runtime is gone.
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Dropping engine event, receiver closed: {:?}", e.into_inner());
                false
            }
        }
    }
}

/// Receiving side of the engine event channel
pub type EngineEventReceiver = Receiver<EngineEvent>;

/// Creates the unbounded engine event channel
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    let (tx, rx) = unbounded();
    (EngineEventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_events() {
        assert_eq!("speech-started".parse::<EngineEvent>(), Ok(EngineEvent::SpeechStarted));
        assert_eq!("speech-ended".parse::<EngineEvent>(), Ok(EngineEvent::SpeechEnded));
        assert_eq!("end".parse::<EngineEvent>(), Ok(EngineEvent::SpeechEnded));
        assert_eq!("  timeout ".parse::<EngineEvent>(), Ok(EngineEvent::Timeout));
    }

    #[test]
    fn test_parse_events_with_text() {
        assert_eq!(
            "final search".parse::<EngineEvent>(),
            Ok(EngineEvent::FinalHypothesis("search".to_string()))
        );
        assert_eq!(
            "partial one two  three".parse::<EngineEvent>(),
            Ok(EngineEvent::PartialHypothesis("one two  three".to_string()))
        );
        assert_eq!(
            "ERROR microphone lost".parse::<EngineEvent>(),
            Ok(EngineEvent::Error("microphone lost".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<EngineEvent>(), Err(ParseEventError::Empty));
        assert_eq!(
            "final".parse::<EngineEvent>(),
            Err(ParseEventError::MissingText("final"))
        );
        assert_eq!(
            "shout hello".parse::<EngineEvent>(),
            Err(ParseEventError::UnknownKind("shout".to_string()))
        );
    }

    #[test]
    fn test_display_parses_back() {
        let events = [
            EngineEvent::SpeechStarted,
            EngineEvent::PartialHypothesis("поиск".to_string()),
            EngineEvent::Error("decoder crashed".to_string()),
        ];
        for event in events {
            assert_eq!(event.to_string().parse::<EngineEvent>(), Ok(event));
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(EngineEvent::SpeechEnded.is_terminal());
        assert!(EngineEvent::Timeout.is_terminal());
        assert!(EngineEvent::Error("x".to_string()).is_terminal());
        assert!(!EngineEvent::SpeechStarted.is_terminal());
        assert!(!EngineEvent::FinalHypothesis("x".to_string()).is_terminal());
    }

    #[test]
    fn test_event_serialisation() {
        let event = EngineEvent::FinalHypothesis("search".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"final-hypothesis","text":"search"}"#);

        let json = serde_json::to_string(&EngineEvent::Timeout).unwrap();
        assert_eq!(json, r#"{"type":"timeout"}"#);
    }

    #[test]
    fn test_sender_reports_closed_receiver() {
        let (tx, rx) = event_channel();
        assert!(tx.send(EngineEvent::SpeechStarted));
        assert_eq!(rx.try_recv(), Ok(EngineEvent::SpeechStarted));

        drop(rx);
        assert!(!tx.send(EngineEvent::Timeout));
    }
}
