//! Two-stage extraction of `Marker: value` sections from model replies.
//!
//! The strict stage expects every marker in its declared order. When that
//! fails, the lenient stage takes each marker's first occurrence and lets its
//! value run up to the next marker that begins a line. Both stages fill the
//! same [`Sections`] value, so callers never branch on which one matched.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionError {
    #[error("missing required section `{0}`")]
    Missing(&'static str),
}

/// Section values keyed by marker name, in marker declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    values: Vec<(&'static str, Option<String>)>,
}

impl Sections {
    /// Value for `marker`, if present. Lookups are case-insensitive.
    pub fn get(&self, marker: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(marker))
            .and_then(|(_, value)| value.as_deref())
    }
}

/// Compiled extractor for a fixed, ordered set of markers.
#[derive(Debug)]
pub struct SectionExtractor {
    markers: &'static [&'static str],
    required: &'static [&'static str],
    strict: Regex,
    marker: Regex,
    line_marker: Regex,
}

impl SectionExtractor {
    pub fn new(
        markers: &'static [&'static str],
        required: &'static [&'static str],
        case_insensitive: bool,
    ) -> Result<Self, regex::Error> {
        let mut strict_pattern = String::new();
        for (idx, name) in markers.iter().enumerate() {
            if idx > 0 {
                strict_pattern.push_str(r"\s*");
            }
            strict_pattern.push_str(&regex::escape(name));
            if idx + 1 == markers.len() {
                strict_pattern.push_str(r":\s*(.*)$");
            } else {
                strict_pattern.push_str(r":\s*(.*?)");
            }
        }
        let alternatives = markers
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");

        let build = |pattern: &str, multi_line: bool| {
            RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .dot_matches_new_line(true)
                .multi_line(multi_line)
                .build()
        };

        Ok(Self {
            markers,
            required,
            strict: build(&strict_pattern, false)?,
            marker: build(&format!(r"\b({alternatives}):"), false)?,
            line_marker: build(&format!(r"^[ \t]*({alternatives}):"), true)?,
        })
    }

    /// Extract every section, failing only when a required one is absent or empty.
    pub fn extract(&self, text: &str) -> Result<Sections, SectionError> {
        let sections = self
            .extract_strict(text)
            .unwrap_or_else(|| self.extract_lenient(text));
        for name in self.required {
            if sections.get(name).is_none_or(str::is_empty) {
                return Err(SectionError::Missing(name));
            }
        }
        Ok(sections)
    }

    fn extract_strict(&self, text: &str) -> Option<Sections> {
        let caps = self.strict.captures(text)?;
        let values = self
            .markers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let value = caps.get(idx + 1).map(|m| m.as_str().trim().to_string());
                (*name, value)
            })
            .collect();
        Some(Sections { values })
    }

    fn extract_lenient(&self, text: &str) -> Sections {
        let boundaries: Vec<usize> = self
            .line_marker
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.start()))
            .collect();

        let values = self
            .markers
            .iter()
            .map(|name| {
                let found = self.marker.captures_iter(text).find_map(|caps| {
                    let label = caps.get(1)?;
                    label.as_str().eq_ignore_ascii_case(name).then(|| caps.get(0))?
                });
                let value = found.map(|m| {
                    let start = m.end();
                    let end = boundaries
                        .iter()
                        .copied()
                        .find(|&b| b > m.start())
                        .unwrap_or(text.len());
                    text[start..end.max(start)].trim().to_string()
                });
                (*name, value)
            })
            .collect();
        Sections { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKERS: &[&str] = &["Observation", "Thought", "Action", "Summary"];
    const REQUIRED: &[&str] = &["Observation", "Thought", "Action"];

    fn extractor() -> SectionExtractor {
        SectionExtractor::new(MARKERS, REQUIRED, false).expect("compile")
    }

    #[test]
    fn strict_pass_reads_all_sections() {
        let text = "Observation: a list\nThought: tap it\nAction: tap(3)\nSummary: Tapped row";
        let sections = extractor().extract(text).expect("extract");
        assert_eq!(sections.get("Observation"), Some("a list"));
        assert_eq!(sections.get("Thought"), Some("tap it"));
        assert_eq!(sections.get("Action"), Some("tap(3)"));
        assert_eq!(sections.get("Summary"), Some("Tapped row"));
    }

    #[test]
    fn lenient_pass_handles_missing_trailing_section() {
        let text = "Observation: home screen\nThought: open settings\nAction: tap(2)";
        let sections = extractor().extract(text).expect("extract");
        assert_eq!(sections.get("Action"), Some("tap(2)"));
        assert_eq!(sections.get("Summary"), None);
    }

    #[test]
    fn lenient_pass_handles_reordered_sections() {
        let text = "Thought: scroll\nObservation: long feed\nSummary: Scrolled\nAction: swipe_screen(up, long)";
        let sections = extractor().extract(text).expect("extract");
        assert_eq!(sections.get("Observation"), Some("long feed"));
        assert_eq!(sections.get("Thought"), Some("scroll"));
        assert_eq!(sections.get("Action"), Some("swipe_screen(up, long)"));
        assert_eq!(sections.get("Summary"), Some("Scrolled"));
    }

    #[test]
    fn missing_required_section_is_reported() {
        let err = extractor()
            .extract("Observation: x\nSummary: y")
            .expect_err("should fail");
        assert_eq!(err, SectionError::Missing("Thought"));
    }

    #[test]
    fn empty_required_section_is_reported() {
        let err = extractor()
            .extract("Observation: x\nThought: y\nAction:\nSummary: z")
            .expect_err("should fail");
        assert_eq!(err, SectionError::Missing("Action"));
    }

    #[test]
    fn case_insensitive_extractor_matches_any_case() {
        const MARKS: &[&str] = &["Decision", "Thought", "Documentation"];
        let extractor = SectionExtractor::new(MARKS, &["Decision", "Thought"], true).expect("compile");
        let sections = extractor
            .extract("DECISION: back\nthought: wrong page")
            .expect("extract");
        assert_eq!(sections.get("Decision"), Some("back"));
        assert_eq!(sections.get("Thought"), Some("wrong page"));
        assert_eq!(sections.get("Documentation"), None);
    }
}
