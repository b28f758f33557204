//! Configuration management for voicenav
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.voicenav/config.json` and describes the
//! search profiles, the transitions between them and where recognition assets
//! live.

use crate::navigation::{ControllerOptions, PhraseMatching, TransitionRule, TransitionTable};
use crate::profiles::{ProfileDefinition, ProfileId, ProfileRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config schema version
pub const CURRENT_VERSION: u32 = 1;

/// Errors from loading, saving or interpreting configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),

    #[error("Grammar profile '{0}' has no grammar file")]
    MissingGrammar(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Recognition asset locations
    pub assets: AssetsConfig,
    /// Profiles, prompts and transitions
    pub navigation: NavigationConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            assets: AssetsConfig::default(),
            navigation: NavigationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Recognition asset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Bundled assets to copy from (None = use `target_dir` as is)
    pub source_dir: Option<PathBuf>,
    /// Working copy the engine loads from
    pub target_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            target_dir: get_config_dir().join("assets"),
        }
    }
}

/// Kind of search profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// Single trigger phrase
    #[default]
    KeywordSpotting,
    /// Grammar-constrained recognition
    Grammar,
}

/// A search profile as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProfileConfig {
    pub id: String,
    pub kind: ProfileKind,
    /// Trigger phrase (keyword spotting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    /// Grammar file, relative to the asset directory (grammar)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grammar: Option<PathBuf>,
    /// Listening budget in milliseconds (grammar)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Prompt template with `{name}` placeholders
    pub prompt: String,
}

impl ProfileConfig {
    fn definition(&self) -> Result<ProfileDefinition, ConfigError> {
        match self.kind {
            ProfileKind::KeywordSpotting => Ok(ProfileDefinition::keyword(
                self.phrase.clone().unwrap_or_default(),
            )),
            ProfileKind::Grammar => {
                let grammar = self
                    .grammar
                    .clone()
                    .ok_or_else(|| ConfigError::MissingGrammar(self.id.clone()))?;
                Ok(ProfileDefinition::grammar(
                    grammar,
                    self.timeout_ms.map(Duration::from_millis),
                ))
            }
        }
    }
}

/// A transition as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransitionConfig {
    pub from: String,
    pub phrase: String,
    pub to: String,
}

/// Navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Keyword-spotting profile the controller returns to
    pub idle_profile: String,
    /// How hypotheses are compared with transition phrases
    pub phrase_matching: PhraseMatching,
    /// Show each final hypothesis as a notification
    pub notify_final_results: bool,
    pub profiles: Vec<ProfileConfig>,
    /// Checked in order; the first match wins
    pub transitions: Vec<TransitionConfig>,
    /// Literal placeholder bindings for prompts
    pub phrases: BTreeMap<String, String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            idle_profile: "wakeup".to_string(),
            phrase_matching: PhraseMatching::default(),
            notify_final_results: true,
            profiles: vec![
                ProfileConfig {
                    id: "wakeup".to_string(),
                    kind: ProfileKind::KeywordSpotting,
                    phrase: Some("search".to_string()),
                    prompt: "To start navigation say '{wakeup}'".to_string(),
                    ..Default::default()
                },
                ProfileConfig {
                    id: "menu".to_string(),
                    kind: ProfileKind::Grammar,
                    grammar: Some(PathBuf::from("menu.gram")),
                    prompt: "To enter numbers say '{digits}'".to_string(),
                    ..Default::default()
                },
                ProfileConfig {
                    id: "digits".to_string(),
                    kind: ProfileKind::Grammar,
                    grammar: Some(PathBuf::from("digits.gram")),
                    timeout_ms: Some(10_000),
                    prompt: "Say a number".to_string(),
                    ..Default::default()
                },
            ],
            transitions: vec![
                TransitionConfig {
                    from: "wakeup".to_string(),
                    phrase: "search".to_string(),
                    to: "menu".to_string(),
                },
                TransitionConfig {
                    from: "menu".to_string(),
                    phrase: "numbers".to_string(),
                    to: "digits".to_string(),
                },
            ],
            phrases: BTreeMap::new(),
        }
    }
}

impl NavigationConfig {
    /// Builds the validated profile registry and transition table
    pub fn build(&self) -> Result<(ProfileRegistry, TransitionTable), ConfigError> {
        let mut registry = ProfileRegistry::new();
        for profile in &self.profiles {
            registry.register(
                profile.id.as_str(),
                profile.definition()?,
                profile.prompt.as_str(),
            )?;
        }
        for (name, phrase) in &self.phrases {
            registry.bind_phrase(name.as_str(), phrase.as_str());
        }

        let mut table = TransitionTable::new(self.idle_profile.as_str());
        for transition in &self.transitions {
            table.push(TransitionRule {
                from: ProfileId::new(transition.from.as_str()),
                phrase: transition.phrase.clone(),
                to: ProfileId::new(transition.to.as_str()),
            });
        }

        registry.validate(&table, self.phrase_matching)?;
        Ok((registry, table))
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            phrase_matching: self.phrase_matching,
            notify_final_results: self.notify_final_results,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for `voicenav.log` (None = stdout only)
    pub log_dir: Option<PathBuf>,
    /// Default filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            filter: "info".to_string(),
        }
    }
}

/// Get the path to the config file (~/.voicenav/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.voicenav)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".voicenav")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from a file, migrating and re-saving older schemas.
///
/// A missing file yields the defaults.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to_path(&migrated, path)?;
    }

    Ok(migrated)
}

/// Save configuration as pretty JSON, creating parent directories
pub fn save_to_path(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Load configuration from `path` (or the default location), falling back to
/// defaults on any error
pub fn load_or_default(path: Option<&Path>) -> Config {
    let path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    load_from_path(&path).unwrap_or_else(|e| {
        tracing::error!("Failed to load config, using defaults: {}", e);
        Config::default()
    })
}

/// Migrate configuration from older schema versions
pub fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // Version 0 -> 1: schema introduced, fields already defaulted by serde
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        let config = Config::default();
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_navigation_defaults() {
        let navigation = NavigationConfig::default();
        assert_eq!(navigation.idle_profile, "wakeup");
        assert_eq!(navigation.phrase_matching, PhraseMatching::Exact);
        assert!(navigation.notify_final_results);
        assert_eq!(navigation.profiles.len(), 3);
        assert_eq!(navigation.transitions.len(), 2);
    }

    #[test]
    fn test_default_navigation_builds() {
        let (registry, table) = NavigationConfig::default().build().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(table.idle().as_str(), "wakeup");

        let digits = registry.definition(&ProfileId::from("digits")).unwrap();
        assert_eq!(digits.timeout(), Some(Duration::from_millis(10_000)));
        let menu = registry.definition(&ProfileId::from("menu")).unwrap();
        assert_eq!(menu.timeout(), None);
    }

    #[test]
    fn test_default_prompts_render() {
        let (registry, table) = NavigationConfig::default().build().unwrap();
        let prompts = registry.render_prompts(&table).unwrap();
        assert_eq!(
            prompts[&ProfileId::from("wakeup")],
            "To start navigation say 'search'"
        );
        assert_eq!(
            prompts[&ProfileId::from("menu")],
            "To enter numbers say 'numbers'"
        );
    }

    #[test]
    fn test_grammar_profile_without_file_fails() {
        let mut navigation = NavigationConfig::default();
        navigation.profiles[1].grammar = None;
        let result = navigation.build();
        assert!(matches!(result, Err(ConfigError::MissingGrammar(id)) if id == "menu"));
    }

    #[test]
    fn test_transition_to_unknown_profile_fails() {
        let mut navigation = NavigationConfig::default();
        navigation.transitions.push(TransitionConfig {
            from: "menu".to_string(),
            phrase: "weather".to_string(),
            to: "forecast".to_string(),
        });
        let result = navigation.build();
        assert!(matches!(
            result,
            Err(ConfigError::Registry(RegistryError::UnknownProfile(_)))
        ));
    }

    #[test]
    fn test_phrase_bindings_are_applied() {
        let mut navigation = NavigationConfig::default();
        navigation.profiles[2].prompt = "Say '{back}' to leave".to_string();
        navigation
            .phrases
            .insert("back".to_string(), "go back".to_string());

        let (registry, table) = navigation.build().unwrap();
        let prompts = registry.render_prompts(&table).unwrap();
        assert_eq!(prompts[&ProfileId::from("digits")], "Say 'go back' to leave");
    }

    #[test]
    fn test_partial_config_deserialisation() {
        // Config should use defaults for missing fields
        let json = r#"{"version": 1, "navigation": {"phrase_matching": "ignore_case"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.version, 1);
        assert_eq!(config.navigation.phrase_matching, PhraseMatching::IgnoreCase);
        assert_eq!(config.navigation.idle_profile, "wakeup"); // Default
        assert_eq!(config.logging.filter, "info"); // Default
    }

    #[test]
    fn test_profile_kind_serialisation() {
        assert_eq!(
            serde_json::to_string(&ProfileKind::KeywordSpotting).unwrap(),
            "\"keyword_spotting\""
        );
        assert_eq!(
            serde_json::from_str::<ProfileKind>("\"grammar\"").unwrap(),
            ProfileKind::Grammar
        );
    }

    #[test]
    fn test_migration_from_version_0() {
        let old_config = Config {
            version: 0,
            ..Default::default()
        };

        let migrated = migrate_config(old_config).unwrap();
        assert_eq!(migrated.version, CURRENT_VERSION);
    }

    #[test]
    fn test_future_version_is_rejected() {
        let future_config = Config {
            version: 999,
            ..Default::default()
        };

        let result = migrate_config(future_config);
        assert!(matches!(result, Err(ConfigError::UnknownVersion(999))));
    }

    #[test]
    fn test_config_path_format() {
        let path = get_config_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains(".voicenav"));
        assert!(path_str.ends_with("config.json"));
    }

    #[test]
    fn test_controller_options_follow_config() {
        let navigation = NavigationConfig {
            phrase_matching: PhraseMatching::IgnoreCase,
            notify_final_results: false,
            ..Default::default()
        };
        let options = navigation.controller_options();
        assert_eq!(options.phrase_matching, PhraseMatching::IgnoreCase);
        assert!(!options.notify_final_results);
    }
}
