//! Navigation state machine
//!
//! Defines the controller lifecycle, the transition table and the pure
//! `decide` function mapping (active profile, event) to a decision.

use crate::engine::EngineEvent;
use crate::profiles::ProfileId;
use serde::{Deserialize, Serialize};

/// Controller lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "cause", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Waiting for assets
    #[default]
    Uninitialized,
    /// Registering profiles and activating the idle profile
    Initializing,
    /// Processing engine events
    Ready,
    /// Torn down; no further engine calls
    ShuttingDown,
    /// Initialization failed; terminal
    Failed(String),
}

impl Lifecycle {
    /// Returns a human-readable description of the lifecycle state
    pub fn description(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "Waiting for recognition assets",
            Lifecycle::Initializing => "Preparing the recognizer",
            Lifecycle::Ready => "Listening",
            Lifecycle::ShuttingDown => "Shut down",
            Lifecycle::Failed(_) => "Recognizer failed to start",
        }
    }
}

/// How hypotheses are compared with rule phrases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhraseMatching {
    /// Trimmed, otherwise byte-equal
    #[default]
    Exact,
    /// Trimmed, Unicode lowercase comparison
    IgnoreCase,
}

impl PhraseMatching {
    pub fn matches(&self, hypothesis: &str, phrase: &str) -> bool {
        let hypothesis = hypothesis.trim();
        let phrase = phrase.trim();
        match self {
            PhraseMatching::Exact => hypothesis == phrase,
            PhraseMatching::IgnoreCase => hypothesis.to_lowercase() == phrase.to_lowercase(),
        }
    }
}

/// Switch from `from` to `to` when `phrase` is recognised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: ProfileId,
    pub phrase: String,
    pub to: ProfileId,
}

/// Phrase-driven transitions plus the idle profile everything returns to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    idle: ProfileId,
    rules: Vec<TransitionRule>,
}

impl TransitionTable {
    pub fn new(idle: impl Into<ProfileId>) -> Self {
        Self {
            idle: idle.into(),
            rules: Vec::new(),
        }
    }

    /// Appends a rule; earlier rules take precedence
    pub fn on_phrase(
        mut self,
        from: impl Into<ProfileId>,
        phrase: impl Into<String>,
        to: impl Into<ProfileId>,
    ) -> Self {
        self.push(TransitionRule {
            from: from.into(),
            phrase: phrase.into(),
            to: to.into(),
        });
        self
    }

    pub fn push(&mut self, rule: TransitionRule) {
        self.rules.push(rule);
    }

    pub fn idle(&self) -> &ProfileId {
        &self.idle
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// Rules that can never fire because an earlier rule has the same source
    /// and a phrase that matches theirs
    pub fn shadowed_rules(&self, matching: PhraseMatching) -> Vec<&TransitionRule> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(i, rule)| {
                self.rules[..*i].iter().any(|earlier| {
                    earlier.from == rule.from && matching.matches(&rule.phrase, &earlier.phrase)
                })
            })
            .map(|(_, rule)| rule)
            .collect()
    }

    /// First rule leaving `active` whose phrase matches `hypothesis`
    pub fn find(
        &self,
        active: &ProfileId,
        hypothesis: &str,
        matching: PhraseMatching,
    ) -> Option<&TransitionRule> {
        self.rules
            .iter()
            .find(|rule| &rule.from == active && matching.matches(hypothesis, &rule.phrase))
    }

    /// Decides how to react to `event` while `active` is listening
    pub fn decide(
        &self,
        active: &ProfileId,
        event: &EngineEvent,
        matching: PhraseMatching,
    ) -> Decision {
        match event {
            EngineEvent::PartialHypothesis(text) | EngineEvent::FinalHypothesis(text) => {
                match self.find(active, text, matching) {
                    Some(rule) if &rule.to == active => Decision::Stay,
                    Some(rule) => Decision::Switch {
                        target: rule.to.clone(),
                        reason: TransitionReason::Phrase(rule.phrase.clone()),
                    },
                    None => Decision::Unmatched,
                }
            }
            EngineEvent::SpeechEnded if active == &self.idle => Decision::Stay,
            EngineEvent::SpeechEnded => Decision::Switch {
                target: self.idle.clone(),
                reason: TransitionReason::SpeechEnded,
            },
            // Re-arms the idle profile when it is the one that timed out
            EngineEvent::Timeout => Decision::Switch {
                target: self.idle.clone(),
                reason: TransitionReason::Timeout,
            },
            EngineEvent::SpeechStarted => Decision::Ignore,
            EngineEvent::Error(cause) => Decision::ShowError(cause.clone()),
        }
    }
}

/// Reason for activating a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "phrase", rename_all = "snake_case")]
pub enum TransitionReason {
    /// Initial activation of the idle profile
    Initialized,
    /// A rule phrase was recognised
    Phrase(String),
    /// The speaker stopped talking
    SpeechEnded,
    /// The activation budget ran out
    Timeout,
}

/// Outcome of evaluating one event against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Stop and activate `target`
    Switch {
        target: ProfileId,
        reason: TransitionReason,
    },
    /// Already in the right profile
    Stay,
    /// Hypothesis matched no rule
    Unmatched,
    /// Event carries nothing to act on
    Ignore,
    /// Engine reported an error
    ShowError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_table() -> TransitionTable {
        TransitionTable::new("wakeup")
            .on_phrase("wakeup", "search", "menu")
            .on_phrase("menu", "numbers", "digits")
    }

    fn id(s: &str) -> ProfileId {
        ProfileId::from(s)
    }

    fn final_text(s: &str) -> EngineEvent {
        EngineEvent::FinalHypothesis(s.to_string())
    }

    #[test]
    fn test_wake_phrase_switches_to_menu() {
        let decision =
            demo_table().decide(&id("wakeup"), &final_text("search"), PhraseMatching::Exact);
        assert_eq!(
            decision,
            Decision::Switch {
                target: id("menu"),
                reason: TransitionReason::Phrase("search".to_string()),
            }
        );
    }

    #[test]
    fn test_partial_hypothesis_also_triggers() {
        let event = EngineEvent::PartialHypothesis("numbers".to_string());
        let decision = demo_table().decide(&id("menu"), &event, PhraseMatching::Exact);
        assert!(matches!(decision, Decision::Switch { target, .. } if target == id("digits")));
    }

    #[test]
    fn test_rule_only_applies_to_its_source() {
        let decision =
            demo_table().decide(&id("wakeup"), &final_text("numbers"), PhraseMatching::Exact);
        assert_eq!(decision, Decision::Unmatched);
    }

    #[test]
    fn test_exact_matching_trims_but_keeps_case() {
        let table = demo_table();
        assert!(matches!(
            table.decide(&id("wakeup"), &final_text("  search "), PhraseMatching::Exact),
            Decision::Switch { .. }
        ));
        assert_eq!(
            table.decide(&id("wakeup"), &final_text("Search"), PhraseMatching::Exact),
            Decision::Unmatched
        );
    }

    #[test]
    fn test_ignore_case_matching() {
        let table = TransitionTable::new("wakeup").on_phrase("wakeup", "поиск", "menu");
        assert!(matches!(
            table.decide(&id("wakeup"), &final_text("ПОИСК"), PhraseMatching::IgnoreCase),
            Decision::Switch { .. }
        ));
    }

    #[test]
    fn test_terminal_events_return_non_idle_profiles_to_idle() {
        let table = demo_table();
        for active in ["menu", "digits"] {
            for event in [EngineEvent::SpeechEnded, EngineEvent::Timeout] {
                let decision = table.decide(&id(active), &event, PhraseMatching::Exact);
                assert!(
                    matches!(&decision, Decision::Switch { target, .. } if target == &id("wakeup")),
                    "{} + {:?} gave {:?}",
                    active,
                    event,
                    decision
                );
            }
        }
    }

    #[test]
    fn test_speech_ended_in_idle_stays() {
        let decision =
            demo_table().decide(&id("wakeup"), &EngineEvent::SpeechEnded, PhraseMatching::Exact);
        assert_eq!(decision, Decision::Stay);
    }

    #[test]
    fn test_timeout_in_idle_rearms_idle() {
        let decision =
            demo_table().decide(&id("wakeup"), &EngineEvent::Timeout, PhraseMatching::Exact);
        assert_eq!(
            decision,
            Decision::Switch {
                target: id("wakeup"),
                reason: TransitionReason::Timeout,
            }
        );
    }

    #[test]
    fn test_rule_to_active_profile_is_a_stay() {
        let table = demo_table().on_phrase("menu", "menu", "menu");
        let decision = table.decide(&id("menu"), &final_text("menu"), PhraseMatching::Exact);
        assert_eq!(decision, Decision::Stay);
    }

    #[test]
    fn test_speech_started_and_error() {
        let table = demo_table();
        assert_eq!(
            table.decide(&id("menu"), &EngineEvent::SpeechStarted, PhraseMatching::Exact),
            Decision::Ignore
        );
        assert_eq!(
            table.decide(
                &id("menu"),
                &EngineEvent::Error("mic".to_string()),
                PhraseMatching::Exact
            ),
            Decision::ShowError("mic".to_string())
        );
    }

    #[test]
    fn test_first_rule_wins_and_later_ones_are_shadowed() {
        let table = demo_table().on_phrase("menu", "numbers", "wakeup");
        let decision = table.decide(&id("menu"), &final_text("numbers"), PhraseMatching::Exact);
        assert!(matches!(decision, Decision::Switch { target, .. } if target == id("digits")));

        let shadowed = table.shadowed_rules(PhraseMatching::Exact);
        assert_eq!(shadowed.len(), 1);
        assert_eq!(shadowed[0].to, id("wakeup"));
    }

    #[test]
    fn test_shadowing_depends_on_matching() {
        let table = demo_table().on_phrase("menu", "Numbers", "wakeup");
        assert!(table.shadowed_rules(PhraseMatching::Exact).is_empty());
        assert_eq!(table.shadowed_rules(PhraseMatching::IgnoreCase).len(), 1);
    }

    #[test]
    fn test_lifecycle_serialisation() {
        let json = serde_json::to_string(&Lifecycle::Failed("no assets".to_string())).unwrap();
        assert_eq!(json, r#"{"state":"failed","cause":"no assets"}"#);
        assert_eq!(
            serde_json::to_string(&Lifecycle::Ready).unwrap(),
            r#"{"state":"ready"}"#
        );
    }
}
