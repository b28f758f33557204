//! Search profiles
//!
//! The registry of named recognition configurations the engine can switch
//! between, and the prompt shown to the user while each one is active.

mod registry;
mod template;

pub use registry::{ProfileDefinition, ProfileEntry, ProfileId, ProfileRegistry, RegistryError};
pub use template::PromptTemplate;
