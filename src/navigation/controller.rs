//! Voice navigation controller
//!
//! Owns the controller state and is the only component that issues engine
//! commands and presentation outputs. All methods run on one thread; the
//! runtime feeds it one message at a time.

use super::state::{Decision, Lifecycle, PhraseMatching, TransitionReason, TransitionTable};
use crate::assets::ProvisioningError;
use crate::engine::{EngineError, EngineEvent, RecognitionEngine};
use crate::output::PresentationSink;
use crate::profiles::{ProfileId, ProfileRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Errors raised by the controller
#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("Invalid navigation setup: {0}")]
    Registry(#[from] RegistryError),

    #[error("Asset provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("Failed to register profile '{profile}': {source}")]
    Registration {
        profile: ProfileId,
        #[source]
        source: EngineError,
    },

    #[error("Failed to activate profile '{profile}': {source}")]
    Activation {
        profile: ProfileId,
        #[source]
        source: EngineError,
    },
}

/// Behaviour switches for the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub phrase_matching: PhraseMatching,
    /// Surface every non-empty final hypothesis through `notify`
    pub notify_final_results: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            phrase_matching: PhraseMatching::Exact,
            notify_final_results: true,
        }
    }
}

/// A completed profile switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: Option<ProfileId>,
    pub to: ProfileId,
    pub reason: TransitionReason,
    pub timeout: Option<Duration>,
}

/// What handling one event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The active profile changed (or idle was re-armed)
    Transitioned(TransitionOutcome),
    /// Nothing to do
    Unchanged,
    /// Hypothesis matched no rule
    Unmatched,
    /// An engine error was shown in the prompt
    ErrorShown,
    /// Stop or activate failed; the previous profile is still recorded as active
    ActivationFailed(String),
    /// The controller is not ready; the event was dropped
    NotReady,
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NavigationStatus {
    pub lifecycle: Lifecycle,
    /// Lifecycle description for display
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<ProfileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Drives a recognition engine through the profile transition table
pub struct VoiceNavigationController<E: RecognitionEngine, S: PresentationSink> {
    registry: ProfileRegistry,
    table: TransitionTable,
    /// Rendered once at construction
    prompts: HashMap<ProfileId, String>,
    options: ControllerOptions,
    engine: E,
    sink: S,
    lifecycle: Lifecycle,
    active_profile: Option<ProfileId>,
    prompt: Option<String>,
    degraded: bool,
    last_error: Option<String>,
    /// Set once the first engine command has been issued
    engine_in_use: bool,
}

impl<E: RecognitionEngine, S: PresentationSink> VoiceNavigationController<E, S> {
    /// Validates the registry against the table and renders every prompt.
    ///
    /// No engine command is issued until assets are provisioned.
    pub fn new(
        registry: ProfileRegistry,
        table: TransitionTable,
        engine: E,
        sink: S,
        options: ControllerOptions,
    ) -> Result<Self, RegistryError> {
        registry.validate(&table, options.phrase_matching)?;
        let prompts = registry.render_prompts(&table)?;

        for rule in table.shadowed_rules(options.phrase_matching) {
            tracing::warn!(
                "Transition '{}' --{}--> '{}' is shadowed by an earlier rule",
                rule.from,
                rule.phrase,
                rule.to
            );
        }

        Ok(Self {
            registry,
            table,
            prompts,
            options,
            engine,
            sink,
            lifecycle: Lifecycle::Uninitialized,
            active_profile: None,
            prompt: None,
            degraded: false,
            last_error: None,
            engine_in_use: false,
        })
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn active_profile(&self) -> Option<&ProfileId> {
        self.active_profile.as_ref()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn status(&self) -> NavigationStatus {
        NavigationStatus {
            lifecycle: self.lifecycle.clone(),
            description: self.lifecycle.description().to_string(),
            active_profile: self.active_profile.clone(),
            prompt: self.prompt.clone(),
            degraded: self.degraded,
            last_error: self.last_error.clone(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Consumes the provisioning result
    pub fn on_provisioned(
        &mut self,
        result: Result<std::path::PathBuf, ProvisioningError>,
    ) -> Result<(), NavigationError> {
        if self.lifecycle != Lifecycle::Uninitialized {
            tracing::warn!(
                "Ignoring provisioning result in lifecycle state {:?}",
                self.lifecycle
            );
            return Ok(());
        }

        match result {
            Ok(asset_dir) => self.initialize(&asset_dir).map(|_| ()),
            Err(e) => Err(self.fail(NavigationError::Provisioning(e))),
        }
    }

    /// Registers every profile with the engine and activates the idle profile.
    ///
    /// Returns the initial activation, or `None` if the controller was already
    /// past `Uninitialized`.
    pub fn initialize(
        &mut self,
        asset_dir: &Path,
    ) -> Result<Option<TransitionOutcome>, NavigationError> {
        if self.lifecycle != Lifecycle::Uninitialized {
            tracing::warn!("Controller already initialised ({:?})", self.lifecycle);
            return Ok(None);
        }

        self.lifecycle = Lifecycle::Initializing;
        self.engine_in_use = true;
        tracing::info!(
            "Initialising navigation with assets in {}",
            asset_dir.display()
        );

        let engine = &mut self.engine;
        let registered = self.registry.iter().try_for_each(|entry| {
            let definition = entry.definition.resolved_against(asset_dir);
            engine
                .register_profile(&entry.id, &definition)
                .map_err(|source| NavigationError::Registration {
                    profile: entry.id.clone(),
                    source,
                })?;
            tracing::debug!("Registered profile '{}'", entry.id);
            Ok(())
        });
        if let Err(err) = registered {
            return Err(self.fail(err));
        }

        let idle = self.table.idle().clone();
        let timeout = self.registry.definition(&idle)?.timeout();
        if let Err(source) = self.engine.activate(&idle, timeout) {
            let err = NavigationError::Activation {
                profile: idle,
                source,
            };
            return Err(self.fail(err));
        }

        let reason = TransitionReason::Initialized;
        let from = self.enter(idle.clone(), &reason);
        self.lifecycle = Lifecycle::Ready;
        tracing::info!("Navigation ready, listening with '{}'", idle);
        Ok(Some(TransitionOutcome {
            from,
            to: idle,
            reason,
            timeout,
        }))
    }

    /// Stops and releases the engine. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::ShuttingDown {
            return;
        }
        if !matches!(self.lifecycle, Lifecycle::Failed(_)) {
            self.lifecycle = Lifecycle::ShuttingDown;
        }

        if self.engine_in_use {
            if let Err(e) = self.engine.stop() {
                tracing::warn!("Engine stop failed during shutdown: {}", e);
            }
            self.engine.release();
            self.engine_in_use = false;
            tracing::info!("Navigation shut down");
        } else {
            tracing::debug!("Navigation shut down before the engine was used");
        }
    }

    fn fail(&mut self, err: NavigationError) -> NavigationError {
        let cause = err.to_string();
        tracing::error!("{}", cause);
        self.lifecycle = Lifecycle::Failed(cause.clone());
        self.last_error = Some(cause.clone());
        self.sink.report_fatal(&cause);
        err
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    /// Processes one engine event to completion
    pub fn handle_event(&mut self, event: EngineEvent) -> EventOutcome {
        if self.lifecycle != Lifecycle::Ready {
            tracing::debug!("Ignoring {} while {:?}", event, self.lifecycle);
            return EventOutcome::NotReady;
        }
        let Some(active) = self.active_profile.clone() else {
            return EventOutcome::NotReady;
        };

        if let EngineEvent::FinalHypothesis(text) = &event {
            if self.options.notify_final_results && !text.trim().is_empty() {
                self.sink.notify(text.trim());
            }
        }

        match self
            .table
            .decide(&active, &event, self.options.phrase_matching)
        {
            Decision::Switch { target, reason } => match self.switch_to(&target, reason) {
                Ok(outcome) => EventOutcome::Transitioned(outcome),
                Err(e) => EventOutcome::ActivationFailed(e.to_string()),
            },
            Decision::Stay => {
                tracing::debug!("'{}' stays active after {}", active, event);
                EventOutcome::Unchanged
            }
            Decision::Unmatched => {
                tracing::debug!("No transition from '{}' for {}", active, event);
                EventOutcome::Unmatched
            }
            Decision::Ignore => {
                tracing::debug!("Ignoring {} in '{}'", event, active);
                EventOutcome::Unchanged
            }
            Decision::ShowError(cause) => {
                tracing::warn!("Recognizer error in '{}': {}", active, cause);
                let text = format!("Recognizer error: {}", cause);
                self.sink.set_prompt(&text);
                self.prompt = Some(text);
                self.last_error = Some(cause);
                EventOutcome::ErrorShown
            }
        }
    }

    /// Stop, activate, then record the new profile and show its prompt
    fn switch_to(
        &mut self,
        target: &ProfileId,
        reason: TransitionReason,
    ) -> Result<TransitionOutcome, NavigationError> {
        let timeout = self.registry.definition(target)?.timeout();

        if let Err(source) = self.engine.stop() {
            return Err(self.degrade(target, source));
        }
        if let Err(source) = self.engine.activate(target, timeout) {
            return Err(self.degrade(target, source));
        }

        let from = self.enter(target.clone(), &reason);
        Ok(TransitionOutcome {
            from,
            to: target.clone(),
            reason,
            timeout,
        })
    }

    /// Records `target` as active and shows its prompt; returns the previous profile
    fn enter(&mut self, target: ProfileId, reason: &TransitionReason) -> Option<ProfileId> {
        let prompt = self.prompts.get(&target).cloned().unwrap_or_default();
        self.sink.set_prompt(&prompt);
        self.prompt = Some(prompt);
        self.degraded = false;

        tracing::info!(
            "Navigation transition: {:?} -> '{}' ({:?})",
            self.active_profile.as_ref().map(ProfileId::as_str),
            target,
            reason
        );
        self.active_profile.replace(target)
    }

    fn degrade(&mut self, target: &ProfileId, source: EngineError) -> NavigationError {
        let err = NavigationError::Activation {
            profile: target.clone(),
            source,
        };
        let cause = err.to_string();
        tracing::warn!("{}", cause);
        self.degraded = true;
        self.last_error = Some(cause.clone());
        self.sink.notify(&cause);
        err
    }
}

impl<E: RecognitionEngine, S: PresentationSink> Drop for VoiceNavigationController<E, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
