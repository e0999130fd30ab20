//! Parse a post-action reflection reply into a [`ReflectionOutcome`].

use std::fmt;
use std::sync::LazyLock;

use serde::Serialize;

use crate::core::sections::SectionExtractor;

const MARKERS: &[&str] = &["Decision", "Thought", "Documentation"];
const REQUIRED: &[&str] = &["Decision", "Thought"];
const NO_DOC_SENTINEL: &str = "n/a";

static EXTRACTOR: LazyLock<SectionExtractor> = LazyLock::new(|| {
    SectionExtractor::new(MARKERS, REQUIRED, true).expect("reflection section patterns are valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The action left the app; navigate back.
    Back,
    /// Nothing changed on screen.
    Ineffective,
    /// Something changed but the agent should move on.
    Continue,
    Success,
    /// The reply could not be parsed.
    Error,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Back => "BACK",
            Verdict::Ineffective => "INEFFECTIVE",
            Verdict::Continue => "CONTINUE",
            Verdict::Success => "SUCCESS",
            Verdict::Error => "ERROR",
        }
    }

    /// Verdicts after which the targeted element is not offered again.
    pub fn blacklists_target(self) -> bool {
        matches!(self, Verdict::Back | Verdict::Ineffective | Verdict::Continue)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflectionOutcome {
    pub verdict: Verdict,
    pub thought: String,
    /// `None` when absent, empty, or the `N/A` sentinel.
    pub documentation: Option<String>,
    /// Why parsing failed; set only for [`Verdict::Error`].
    pub error: Option<String>,
}

impl ReflectionOutcome {
    fn error(reason: String) -> Self {
        Self {
            verdict: Verdict::Error,
            thought: String::new(),
            documentation: None,
            error: Some(reason),
        }
    }
}

pub fn parse_reflection(text: &str) -> ReflectionOutcome {
    let sections = match EXTRACTOR.extract(text) {
        Ok(sections) => sections,
        Err(err) => return ReflectionOutcome::error(err.to_string()),
    };
    let decision = sections.get("Decision").unwrap_or_default().trim().to_uppercase();
    let verdict = match decision.as_str() {
        "BACK" => Verdict::Back,
        "INEFFECTIVE" => Verdict::Ineffective,
        "CONTINUE" => Verdict::Continue,
        "SUCCESS" => Verdict::Success,
        _ => return ReflectionOutcome::error(format!("unknown decision `{decision}`")),
    };
    let documentation = sections
        .get("Documentation")
        .map(str::trim)
        .filter(|doc| !doc.is_empty() && !doc.eq_ignore_ascii_case(NO_DOC_SENTINEL))
        .map(str::to_string);

    ReflectionOutcome {
        verdict,
        thought: sections.get("Thought").unwrap_or_default().to_string(),
        documentation,
        error: None,
    }
}
