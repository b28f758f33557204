//! voicenav - voice navigation over an offline speech recogniser
//!
//! A small set of listening modes (a wake phrase detector, a command grammar,
//! a digit grammar) is switched by speaking trigger phrases. The recogniser is
//! an external collaborator reached through [`engine::RecognitionEngine`];
//! [`navigation::VoiceNavigationController`] decides which profile is active
//! and what prompt the user sees.

pub mod assets;
pub mod config;
pub mod engine;
pub mod logging;
pub mod navigation;
pub mod output;
pub mod profiles;
