//! Profile registry
//!
//! Static lookup table from profile id to its definition and prompt template.
//! Built once at startup, validated against the transition table, then only read.

use super::template::PromptTemplate;
use crate::navigation::{PhraseMatching, TransitionTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of a search profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProfileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How the engine should listen while a profile is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileDefinition {
    /// Continuous detection of a single trigger phrase
    KeywordSpotting { phrase: String },
    /// Recognition constrained by a grammar resource
    Grammar {
        /// Grammar file; relative paths are resolved against the asset directory
        grammar: PathBuf,
        /// Listening budget per activation (None = until a terminal event)
        timeout: Option<Duration>,
    },
}

impl ProfileDefinition {
    pub fn keyword(phrase: impl Into<String>) -> Self {
        Self::KeywordSpotting {
            phrase: phrase.into(),
        }
    }

    pub fn grammar(grammar: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self::Grammar {
            grammar: grammar.into(),
            timeout,
        }
    }

    /// Activation timeout, if the profile is time-bound
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::KeywordSpotting { .. } => None,
            Self::Grammar { timeout, .. } => *timeout,
        }
    }

    /// Trigger phrase of a keyword-spotting profile
    pub fn phrase(&self) -> Option<&str> {
        match self {
            Self::KeywordSpotting { phrase } => Some(phrase),
            Self::Grammar { .. } => None,
        }
    }

    pub fn is_keyword_spotting(&self) -> bool {
        matches!(self, Self::KeywordSpotting { .. })
    }

    /// Returns a copy with a relative grammar path joined onto `asset_dir`
    pub fn resolved_against(&self, asset_dir: &Path) -> Self {
        match self {
            Self::Grammar { grammar, timeout } if grammar.is_relative() => Self::Grammar {
                grammar: asset_dir.join(grammar),
                timeout: *timeout,
            },
            other => other.clone(),
        }
    }
}

/// A registered profile
#[derive(Debug, Clone)]
pub struct ProfileEntry {
    pub id: ProfileId,
    pub definition: ProfileDefinition,
    pub prompt: PromptTemplate,
}

/// Errors raised while building or validating the registry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Profile '{0}' is already registered")]
    DuplicateProfile(ProfileId),

    #[error("Profile '{0}' is not registered")]
    UnknownProfile(ProfileId),

    #[error("Keyword profile '{0}' has an empty trigger phrase")]
    EmptyPhrase(ProfileId),

    #[error("Idle profile '{0}' must be a keyword-spotting profile")]
    IdleNotKeywordSpotting(ProfileId),

    #[error(
        "Rule '{from}' --{phrase}--> '{to}' never fires: '{from}' only hears '{keyword}'"
    )]
    UnreachableTransition {
        from: ProfileId,
        phrase: String,
        to: ProfileId,
        keyword: String,
    },

    #[error("Prompt for profile '{profile}' references unknown placeholder '{{{placeholder}}}'")]
    UnresolvedPlaceholder {
        profile: ProfileId,
        placeholder: String,
    },
}

/// Registry of search profiles, kept in registration order
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    entries: Vec<ProfileEntry>,
    index: HashMap<ProfileId, usize>,
    /// Literal placeholder bindings, e.g. `back` -> "go back"
    phrases: BTreeMap<String, String>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a profile
    #[must_use = "this returns a Result that should be handled"]
    pub fn register(
        &mut self,
        id: impl Into<ProfileId>,
        definition: ProfileDefinition,
        prompt: impl Into<PromptTemplate>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateProfile(id));
        }
        if let ProfileDefinition::KeywordSpotting { phrase } = &definition {
            if phrase.trim().is_empty() {
                return Err(RegistryError::EmptyPhrase(id));
            }
        }

        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(ProfileEntry {
            id,
            definition,
            prompt: prompt.into(),
        });
        Ok(())
    }

    /// Binds a literal phrase to a placeholder name usable in any prompt
    pub fn bind_phrase(&mut self, name: impl Into<String>, phrase: impl Into<String>) {
        self.phrases.insert(name.into(), phrase.into());
    }

    /// Checks that the table only references registered profiles, that every
    /// rule leaving a keyword profile uses that profile's trigger phrase, and
    /// that every prompt can be rendered
    pub fn validate(
        &self,
        table: &TransitionTable,
        matching: PhraseMatching,
    ) -> Result<(), RegistryError> {
        let idle = self.get(table.idle())?;
        if !idle.definition.is_keyword_spotting() {
            return Err(RegistryError::IdleNotKeywordSpotting(idle.id.clone()));
        }

        for rule in table.rules() {
            let from = self.get(&rule.from)?;
            self.get(&rule.to)?;

            // A keyword decoder only ever reports its own phrase
            if let Some(keyword) = from.definition.phrase() {
                if !matching.matches(keyword, &rule.phrase) {
                    return Err(RegistryError::UnreachableTransition {
                        from: rule.from.clone(),
                        phrase: rule.phrase.clone(),
                        to: rule.to.clone(),
                        keyword: keyword.to_string(),
                    });
                }
            }
        }

        self.render_prompts(table).map(|_| ())
    }

    /// Prompt template for a profile
    pub fn describe(&self, id: &ProfileId) -> Result<&PromptTemplate, RegistryError> {
        self.get(id).map(|entry| &entry.prompt)
    }

    /// Definition for a profile
    pub fn definition(&self, id: &ProfileId) -> Result<&ProfileDefinition, RegistryError> {
        self.get(id).map(|entry| &entry.definition)
    }

    pub fn get(&self, id: &ProfileId) -> Result<&ProfileEntry, RegistryError> {
        self.index
            .get(id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::UnknownProfile(id.clone()))
    }

    pub fn contains(&self, id: &ProfileId) -> bool {
        self.index.contains_key(id)
    }

    /// Profiles in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the prompt of every profile.
    ///
    /// A placeholder resolves to a bound literal phrase, else to the trigger
    /// phrase of the keyword profile with that id, else to the phrase of the
    /// first rule leading to the profile with that id.
    pub fn render_prompts(
        &self,
        table: &TransitionTable,
    ) -> Result<HashMap<ProfileId, String>, RegistryError> {
        let mut rendered = HashMap::with_capacity(self.entries.len());

        for entry in &self.entries {
            let text = entry
                .prompt
                .render(|name| self.resolve_placeholder(name, table))
                .map_err(|placeholder| RegistryError::UnresolvedPlaceholder {
                    profile: entry.id.clone(),
                    placeholder,
                })?;
            rendered.insert(entry.id.clone(), text);
        }

        Ok(rendered)
    }

    fn resolve_placeholder<'a>(
        &'a self,
        name: &str,
        table: &'a TransitionTable,
    ) -> Option<&'a str> {
        if let Some(phrase) = self.phrases.get(name) {
            return Some(phrase);
        }

        let id = ProfileId::from(name);
        if let Some(phrase) = self.get(&id).ok().and_then(|e| e.definition.phrase()) {
            return Some(phrase);
        }

        table
            .rules()
            .iter()
            .find(|rule| rule.to == id)
            .map(|rule| rule.phrase.as_str())
    }
}
