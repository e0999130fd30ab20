//! Deterministic interpretation of the mode-classification reply.

use crate::core::state::AgentMode;

/// Map a classification reply to a mode.
///
/// - `TASK` / `EXPLORE` (any case, surrounding whitespace ignored) select that mode.
/// - Anything else is `None`; callers fall back to [`AgentMode::Task`].
pub fn classify_mode_reply(reply: &str) -> Option<AgentMode> {
    match reply.trim().to_uppercase().as_str() {
        "TASK" => Some(AgentMode::Task),
        "EXPLORE" => Some(AgentMode::Explore),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_exact_replies() {
        assert_eq!(classify_mode_reply("TASK"), Some(AgentMode::Task));
        assert_eq!(classify_mode_reply(" explore\n"), Some(AgentMode::Explore));
    }

    #[test]
    fn classify_rejects_chatty_replies() {
        assert_eq!(classify_mode_reply("I think EXPLORE"), None);
        assert_eq!(classify_mode_reply(""), None);
    }
}
