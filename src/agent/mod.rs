//! Agents, routing, and the agent registry.
//!
//! An **agent** turns a question into a program for its domain and formats
//! the program's raw output into an answer. Agents are supplied by the
//! caller; SolveCache only needs the [`Agent`] trait.
//!
//! The set of agent kinds is closed ([`AgentKind`]), so a registry lookup
//! can never miss: [`AgentSet::get`] matches every kind explicitly.
//!
//! ```text
//!   question ──► Router::route ──► AgentKind ──► AgentSet::get ──► &dyn Agent
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::snapshot::GeneratedCode;

// ============================================================================
// AgentKind
// ============================================================================

/// The closed set of agent kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Calendar queries ("what concerts do I have this week").
    Calendar,

    /// Todo list management.
    Todo,

    /// Weather forecasts.
    Weather,

    /// Everything else: date/time, small talk, fallbacks.
    Receptionist,
}

impl AgentKind {
    /// Every agent kind, in declaration order.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Calendar,
        AgentKind::Todo,
        AgentKind::Weather,
        AgentKind::Receptionist,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Todo => "todo",
            Self::Weather => "weather",
            Self::Receptionist => "receptionist",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Agent
// ============================================================================

/// What an agent produced for one generation request.
#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    /// The generated program.
    pub code: GeneratedCode,

    /// Prompt sent to the model, if the agent exposes it.
    pub prompt: Option<String>,

    /// Raw model response, if the agent exposes it.
    pub response: Option<String>,
}

impl Generation {
    /// Wraps code with no prompt/response detail.
    pub fn from_code(code: GeneratedCode) -> Self {
        Self {
            code,
            prompt: None,
            response: None,
        }
    }
}

/// A domain agent that writes code for questions.
///
/// Implementations must be `Send + Sync`; the consumer calls them from its
/// own thread.
pub trait Agent: Send + Sync {
    /// Which kind of agent this is.
    fn kind(&self) -> AgentKind;

    /// Generates code answering `question` using `model`.
    ///
    /// # Errors
    ///
    /// Should return [`GenerationError::CodeGenerationFailed`](crate::GenerationError::CodeGenerationFailed)
    /// when the model produced nothing usable; the escalator then moves on
    /// to the next model.
    fn generate_code(&self, question: &str, model: &str) -> Result<Generation>;

    /// Turns the raw program output into the answer shown to the user.
    ///
    /// The default trims surrounding whitespace.
    fn format_output(&self, question: &str, raw_output: &str) -> String {
        let _ = question;
        raw_output.trim().to_string()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Chooses the agent for a question that missed the cache.
pub trait Router: Send + Sync {
    /// Returns the agent kind for a normalized question.
    fn route(&self, question: &str) -> AgentKind;
}

/// Routes by whole-word keyword match, falling back to the receptionist.
#[derive(Clone, Debug)]
pub struct KeywordRouter {
    rules: Vec<(AgentKind, Vec<String>)>,
    fallback: AgentKind,
}

impl Default for KeywordRouter {
    fn default() -> Self {
        let rule = |kind, words: &[&str]| (kind, words.iter().map(|w| w.to_string()).collect());
        Self {
            rules: vec![
                rule(
                    AgentKind::Weather,
                    &["weather", "rain", "snow", "sunny", "forecast", "temperature", "umbrella"],
                ),
                rule(
                    AgentKind::Todo,
                    &["todo", "task", "tasks", "list", "remind", "reminder", "chores"],
                ),
                rule(
                    AgentKind::Calendar,
                    &[
                        "calendar", "event", "events", "meeting", "meetings", "appointment",
                        "concert", "concerts", "schedule", "birthday",
                    ],
                ),
            ],
            fallback: AgentKind::Receptionist,
        }
    }
}

impl KeywordRouter {
    /// Creates a router with no rules and the given fallback.
    pub fn new(fallback: AgentKind) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Adds a rule; earlier rules win ties.
    pub fn with_rule(mut self, kind: AgentKind, keywords: &[&str]) -> Self {
        self.rules
            .push((kind, keywords.iter().map(|k| k.to_lowercase()).collect()));
        self
    }
}

impl Router for KeywordRouter {
    fn route(&self, question: &str) -> AgentKind {
        let words: Vec<&str> = question.split_whitespace().collect();
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| words.contains(&k.as_str())))
            .map(|(kind, _)| *kind)
            .unwrap_or(self.fallback)
    }
}

// ============================================================================
// AgentSet
// ============================================================================

/// One agent per [`AgentKind`].
pub struct AgentSet {
    calendar: Box<dyn Agent>,
    todo: Box<dyn Agent>,
    weather: Box<dyn Agent>,
    receptionist: Box<dyn Agent>,
}

impl fmt::Debug for AgentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSet").finish_non_exhaustive()
    }
}

impl AgentSet {
    /// Creates a set from one agent per kind.
    pub fn new(
        calendar: Box<dyn Agent>,
        todo: Box<dyn Agent>,
        weather: Box<dyn Agent>,
        receptionist: Box<dyn Agent>,
    ) -> Self {
        Self {
            calendar,
            todo,
            weather,
            receptionist,
        }
    }

    /// Creates a set by calling `make` once per kind.
    pub fn from_fn(mut make: impl FnMut(AgentKind) -> Box<dyn Agent>) -> Self {
        Self::new(
            make(AgentKind::Calendar),
            make(AgentKind::Todo),
            make(AgentKind::Weather),
            make(AgentKind::Receptionist),
        )
    }

    /// Returns the agent for `kind`.
    pub fn get(&self, kind: AgentKind) -> &dyn Agent {
        match kind {
            AgentKind::Calendar => self.calendar.as_ref(),
            AgentKind::Todo => self.todo.as_ref(),
            AgentKind::Weather => self.weather.as_ref(),
            AgentKind::Receptionist => self.receptionist.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(AgentKind);

    impl Agent for Echo {
        fn kind(&self) -> AgentKind {
            self.0
        }

        fn generate_code(&self, question: &str, _model: &str) -> Result<Generation> {
            Ok(Generation::from_code(GeneratedCode::new(
                vec![format!("print('{}')", question)],
                "",
                "str",
            )))
        }
    }

    #[test]
    fn test_agent_kind_names() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert_eq!(serde_json::to_string(&AgentKind::Todo).unwrap(), "\"todo\"");
    }

    #[test]
    fn test_keyword_router_defaults() {
        let router = KeywordRouter::default();
        assert_eq!(router.route("what concerts do i have this week"), AgentKind::Calendar);
        assert_eq!(router.route("will it rain tomorrow"), AgentKind::Weather);
        assert_eq!(router.route("add milk to my todo list"), AgentKind::Todo);
        assert_eq!(router.route("what time is it"), AgentKind::Receptionist);
    }

    #[test]
    fn test_keyword_router_whole_words_only() {
        let router =
            KeywordRouter::new(AgentKind::Receptionist).with_rule(AgentKind::Weather, &["rain"]);
        assert_eq!(router.route("train times"), AgentKind::Receptionist);
        assert_eq!(router.route("rain today"), AgentKind::Weather);
    }

    #[test]
    fn test_agent_set_get_matches_kind() {
        let agents = AgentSet::from_fn(|kind| Box::new(Echo(kind)));
        for kind in AgentKind::ALL {
            assert_eq!(agents.get(kind).kind(), kind);
        }
    }

    #[test]
    fn test_default_format_output_trims() {
        let agent = Echo(AgentKind::Receptionist);
        assert_eq!(agent.format_output("q", "  42\n"), "42");
    }
}
