//! Voice navigation
//!
//! Moves the recognizer between search profiles in response to what the user
//! says. One keyword-spotting profile is the idle mode; grammar profiles are
//! entered by speaking a rule phrase and left when speech ends or their
//! listening budget runs out.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌───────────────┐ assets ┌──────────────┐ idle active ┌───────┐ shutdown ┌──────────────┐
//! │ UNINITIALIZED │───────►│ INITIALIZING │────────────►│ READY │─────────►│ SHUTTING DOWN│
//! └───────────────┘        └──────────────┘             └───────┘          └──────────────┘
//!         │                        │
//!         │ provisioning failed    │ register/activate failed
//!         ▼                        ▼
//!     ┌────────┐              ┌────────┐
//!     │ FAILED │              │ FAILED │
//!     └────────┘              └────────┘
//! ```
//!
//! ## Default profiles
//!
//! ```text
//!                "search"              "numbers"
//! ┌──────────┐ ──────────► ┌──────┐ ──────────► ┌──────────────────┐
//! │  wakeup  │             │ menu │             │ digits (10 s)    │
//! └──────────┘ ◄────────── └──────┘             └──────────────────┘
//!      ▲      speech ended / timeout                    │
//!      └────────────────────────────────────────────────┘
//!                   speech ended / timeout
//! ```
//!
//! ## Threads
//!
//! The engine produces events on its own thread and provisioning runs on
//! another. [`NavigationRuntime`] owns the controller and serialises both
//! streams onto a single thread, so the controller itself needs no locking.

pub mod controller;
pub mod runtime;
pub mod state;

pub use controller::{
    ControllerOptions, EventOutcome, NavigationError, NavigationStatus, TransitionOutcome,
    VoiceNavigationController,
};
pub use runtime::NavigationRuntime;
pub use state::{
    Decision, Lifecycle, PhraseMatching, TransitionReason, TransitionRule, TransitionTable,
};
