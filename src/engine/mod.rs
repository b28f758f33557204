//! Recognition engine facade
//!
//! The navigation controller never talks to a decoder directly. It registers
//! profiles, activates one at a time and stops it through [`RecognitionEngine`],
//! and receives [`EngineEvent`]s back through the event channel.
//!
//! A concrete adapter must emit exactly one terminal event (`speech-ended`,
//! `timeout` or `error`) per activation. Activating a profile implicitly stops
//! whatever an earlier activation started.

mod events;
mod simulated;

pub use events::{
    event_channel, EngineEvent, EngineEventReceiver, EngineEventSender, ParseEventError,
};
pub use simulated::{EngineCall, SimulatedEngine, SimulatedEngineHandle};

use crate::profiles::{ProfileDefinition, ProfileId};
use std::time::Duration;

/// Errors returned by engine commands
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Profile '{0}' is already registered with the engine")]
    AlreadyRegistered(ProfileId),

    #[error("Engine does not know profile '{0}'")]
    UnknownProfile(ProfileId),

    #[error("Engine is busy")]
    EngineBusy,

    #[error("Engine backend error: {0}")]
    Backend(String),
}

/// Commands accepted by a speech recognition engine
pub trait RecognitionEngine: Send {
    /// Makes a profile known to the engine. Registering an id twice fails.
    fn register_profile(
        &mut self,
        id: &ProfileId,
        definition: &ProfileDefinition,
    ) -> Result<(), EngineError>;

    /// Starts listening with a registered profile, optionally time-bound
    fn activate(&mut self, id: &ProfileId, timeout: Option<Duration>) -> Result<(), EngineError>;

    /// Stops the active search; a no-op when nothing is listening
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Frees decoder resources at teardown
    fn release(&mut self) {}
}

impl<E: RecognitionEngine + ?Sized> RecognitionEngine for Box<E> {
    fn register_profile(
        &mut self,
        id: &ProfileId,
        definition: &ProfileDefinition,
    ) -> Result<(), EngineError> {
        (**self).register_profile(id, definition)
    }

    fn activate(&mut self, id: &ProfileId, timeout: Option<Duration>) -> Result<(), EngineError> {
        (**self).activate(id, timeout)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        (**self).stop()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
