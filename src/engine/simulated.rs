//! In-process engine adapter
//!
//! `SimulatedEngine` behaves like a decoder that hears nothing on its own:
//! events are injected through its [`SimulatedEngineHandle`]. It keeps the
//! same bookkeeping a real adapter has (registered profiles, the active
//! search, activation timeouts) and records every command it receives.

use super::{EngineError, EngineEvent, EngineEventSender, RecognitionEngine};
use crate::profiles::{ProfileDefinition, ProfileId};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A command received by the simulated engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EngineCall {
    Register { profile: ProfileId },
    Activate {
        profile: ProfileId,
        timeout: Option<Duration>,
    },
    Stop,
    Release,
}

#[derive(Default)]
struct Shared {
    calls: Vec<EngineCall>,
    registered: BTreeMap<ProfileId, ProfileDefinition>,
    active: Option<ProfileId>,
    /// Bumped whenever the current activation ends; stale timers compare against it
    generation: u64,
    /// Dropping the sender wakes the pending timer thread
    timer_cancel: Option<Sender<()>>,
    fail_register: Option<EngineError>,
    fail_activate: Option<EngineError>,
    fail_stop: Option<EngineError>,
    released: bool,
}

impl Shared {
    fn end_activation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.timer_cancel = None;
        self.active = None;
    }
}

/// Engine adapter driven by injected events
pub struct SimulatedEngine {
    shared: Arc<Mutex<Shared>>,
    events: EngineEventSender,
}

impl SimulatedEngine {
    pub fn new(events: EngineEventSender) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            events,
        }
    }

    /// Handle for inspecting the engine and injecting events after it has been
    /// moved into a controller
    pub fn handle(&self) -> SimulatedEngineHandle {
        SimulatedEngineHandle {
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        }
    }

    fn arm_timer(&self, shared: &mut Shared, profile: ProfileId, timeout: Duration) {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        shared.timer_cancel = Some(cancel_tx);
        let generation = shared.generation;
        let state = Arc::clone(&self.shared);
        let events = self.events.clone();

        std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
                let mut shared = state.lock();
                if shared.generation != generation {
                    return;
                }
                shared.end_activation();
                // Sent under the lock so no later activation can interleave
                tracing::debug!("Simulated activation of '{}' timed out", profile);
                events.send(EngineEvent::Timeout);
            }
        });
    }
}

impl RecognitionEngine for SimulatedEngine {
    fn register_profile(
        &mut self,
        id: &ProfileId,
        definition: &ProfileDefinition,
    ) -> Result<(), EngineError> {
        let mut shared = self.shared.lock();
        shared.calls.push(EngineCall::Register {
            profile: id.clone(),
        });

        if let Some(err) = shared.fail_register.take() {
            return Err(err);
        }
        if shared.registered.contains_key(id) {
            return Err(EngineError::AlreadyRegistered(id.clone()));
        }

        shared.registered.insert(id.clone(), definition.clone());
        Ok(())
    }

    fn activate(&mut self, id: &ProfileId, timeout: Option<Duration>) -> Result<(), EngineError> {
        let mut shared = self.shared.lock();
        shared.calls.push(EngineCall::Activate {
            profile: id.clone(),
            timeout,
        });

        if let Some(err) = shared.fail_activate.take() {
            return Err(err);
        }
        if !shared.registered.contains_key(id) {
            return Err(EngineError::UnknownProfile(id.clone()));
        }

        shared.end_activation();
        shared.active = Some(id.clone());
        if let Some(timeout) = timeout {
            self.arm_timer(&mut shared, id.clone(), timeout);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let mut shared = self.shared.lock();
        shared.calls.push(EngineCall::Stop);

        if let Some(err) = shared.fail_stop.take() {
            return Err(err);
        }
        shared.end_activation();
        Ok(())
    }

    fn release(&mut self) {
        let mut shared = self.shared.lock();
        shared.calls.push(EngineCall::Release);
        shared.end_activation();
        shared.released = true;
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.shared.lock().end_activation();
    }
}

/// Observer and event injector for a [`SimulatedEngine`]
#[derive(Clone)]
pub struct SimulatedEngineHandle {
    shared: Arc<Mutex<Shared>>,
    events: EngineEventSender,
}

impl SimulatedEngineHandle {
    /// Delivers an event as if the decoder produced it.
    ///
    /// A terminal event ends the current activation and cancels its timer.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let mut shared = self.shared.lock();
        if event.is_terminal() {
            shared.end_activation();
        }
        self.events.send(event)
    }

    /// Every command received so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared.lock().calls.clone()
    }

    /// Forgets the recorded commands
    pub fn clear_calls(&self) {
        self.shared.lock().calls.clear();
    }

    /// Profile currently listening, if any
    pub fn active_profile(&self) -> Option<ProfileId> {
        self.shared.lock().active.clone()
    }

    /// Ids registered with the engine, sorted
    pub fn registered(&self) -> Vec<ProfileId> {
        self.shared.lock().registered.keys().cloned().collect()
    }

    /// Definition a profile was registered with
    pub fn registered_definition(&self, id: &ProfileId) -> Option<ProfileDefinition> {
        self.shared.lock().registered.get(id).cloned()
    }

    pub fn is_released(&self) -> bool {
        self.shared.lock().released
    }

    /// Makes the next `register_profile` call fail with `err`
    pub fn fail_next_register(&self, err: EngineError) {
        self.shared.lock().fail_register = Some(err);
    }

    /// Makes the next `activate` call fail with `err`
    pub fn fail_next_activate(&self, err: EngineError) {
        self.shared.lock().fail_activate = Some(err);
    }

    /// Makes the next `stop` call fail with `err`
    pub fn fail_next_stop(&self, err: EngineError) {
        self.shared.lock().fail_stop = Some(err);
    }
}
