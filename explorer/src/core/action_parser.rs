//! Parse a model's decision reply into one [`ActionCommand`].
//!
//! Parsing never fails outright: anything that cannot be validated becomes
//! [`ActionCommand::Error`] carrying the reason.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::action::{
    ActionCommand, Direction, Distance, InteractionMode, KeyName, Subarea,
};
use crate::core::sections::SectionExtractor;

const MARKERS: &[&str] = &["Observation", "Thought", "Action", "Summary"];
const REQUIRED: &[&str] = &["Observation", "Thought", "Action"];

static EXTRACTOR: LazyLock<SectionExtractor> = LazyLock::new(|| {
    SectionExtractor::new(MARKERS, REQUIRED, false).expect("action section patterns are valid")
});
static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s*(?:\(\s*\))?$").expect("bare action pattern is valid"));
static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(\w+)\s*\((.*)\)").expect("call action pattern is valid"));
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digits pattern is valid"));

/// Decision reply split into its sections plus the validated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResponse {
    pub observation: String,
    pub thought: String,
    /// Raw `Action:` text as the model wrote it.
    pub raw_action: String,
    /// Empty when the model omitted `Summary:`.
    pub summary: String,
    pub command: ActionCommand,
}

/// Parse a full decision reply. `mode` decides whether `tap`/`long_press`
/// take an element label or a grid `(area, subarea)` pair.
pub fn parse_action_response(text: &str, mode: InteractionMode) -> ActionResponse {
    let sections = match EXTRACTOR.extract(text) {
        Ok(sections) => sections,
        Err(err) => {
            return ActionResponse {
                observation: String::new(),
                thought: String::new(),
                raw_action: String::new(),
                summary: String::new(),
                command: ActionCommand::error(err.to_string()),
            };
        }
    };
    let raw_action = sections.get("Action").unwrap_or_default().to_string();
    ActionResponse {
        observation: sections.get("Observation").unwrap_or_default().to_string(),
        thought: sections.get("Thought").unwrap_or_default().to_string(),
        summary: sections.get("Summary").unwrap_or_default().to_string(),
        command: parse_action(&raw_action, mode),
        raw_action,
    }
}

/// Parse just the action expression, e.g. `tap(3)` or `FINISH`.
pub fn parse_action(raw: &str, mode: InteractionMode) -> ActionCommand {
    let cleaned = raw.trim_matches(|c: char| c == '`' || c.is_whitespace());

    if let Some(caps) = BARE_RE.captures(cleaned) {
        let keyword = caps[1].to_uppercase();
        match keyword.as_str() {
            "FINISH" => return ActionCommand::Finish,
            "GRID" => return ActionCommand::EnterGrid,
            "EXIT_GRID" => return ActionCommand::ExitGrid,
            other => {
                if let Some(key) = KeyName::from_keyword(other) {
                    return ActionCommand::PressKey { key };
                }
            }
        }
    }

    let Some(caps) = CALL_RE.captures(cleaned) else {
        return ActionCommand::error(format!("unrecognized action format: {cleaned}"));
    };
    let name = caps[1].to_lowercase();
    let params = caps[2].trim();

    let parsed = match (name.as_str(), mode) {
        ("tap", InteractionMode::Element) => {
            first_number(params).map(|index| ActionCommand::Tap { index })
        }
        ("long_press", InteractionMode::Element) => {
            first_number(params).map(|index| ActionCommand::LongPress { index })
        }
        ("tap", InteractionMode::Grid) => {
            grid_point(params).map(|(area, subarea)| ActionCommand::GridTap { area, subarea })
        }
        ("long_press", InteractionMode::Grid) => grid_point(params)
            .map(|(area, subarea)| ActionCommand::GridLongPress { area, subarea }),
        ("swipe", InteractionMode::Grid) => grid_swipe(params),
        ("swipe_element", InteractionMode::Element) => swipe_element(params),
        ("swipe_element", InteractionMode::Grid) => {
            Err("swipe_element is unavailable in grid mode".to_string())
        }
        ("swipe_screen", _) => swipe_screen(params),
        ("type_global", _) => Ok(ActionCommand::TypeGlobal {
            text: strip_matching_quotes(params).to_string(),
        }),
        ("delete_multiple", _) => first_number(params).and_then(|count| {
            u32::try_from(count)
                .ok()
                .filter(|&c| c >= 1)
                .map(|count| ActionCommand::DeleteMultiple { count })
                .ok_or_else(|| format!("delete_multiple count must be >= 1, got {count}"))
        }),
        _ => Err(format!("unknown action `{name}` with params `{params}`")),
    };

    parsed.unwrap_or_else(ActionCommand::error)
}

fn first_number(params: &str) -> Result<usize, String> {
    let digits = DIGITS_RE
        .find(params)
        .ok_or_else(|| format!("no numeric argument in `{params}`"))?;
    digits
        .as_str()
        .parse::<usize>()
        .map_err(|err| format!("invalid number `{}`: {err}", digits.as_str()))
}

/// Split on `,` and strip spaces and quotes from each argument.
fn split_args(params: &str) -> Vec<String> {
    params
        .split(',')
        .map(|part| part.trim_matches(|c: char| c == ' ' || c == '\'' || c == '"').to_string())
        .collect()
}

fn expect_args(params: &str, count: usize, action: &str) -> Result<Vec<String>, String> {
    let args = split_args(params);
    if args.len() != count {
        return Err(format!(
            "{action} expects {count} arguments, got {} in `{params}`",
            args.len()
        ));
    }
    Ok(args)
}

fn direction_and_distance(direction: &str, distance: &str) -> Result<(Direction, Distance), String> {
    let direction_lower = direction.to_lowercase();
    let distance_lower = distance.to_lowercase();
    let direction = Direction::parse(&direction_lower)
        .ok_or_else(|| format!("invalid direction `{direction_lower}`"))?;
    let distance = Distance::parse(&distance_lower)
        .ok_or_else(|| format!("invalid distance `{distance_lower}`"))?;
    Ok((direction, distance))
}

fn swipe_element(params: &str) -> Result<ActionCommand, String> {
    let args = expect_args(params, 3, "swipe_element")?;
    let index = first_number(&args[0])?;
    let (direction, distance) = direction_and_distance(&args[1], &args[2])?;
    Ok(ActionCommand::SwipeElement {
        index,
        direction,
        distance,
    })
}

fn swipe_screen(params: &str) -> Result<ActionCommand, String> {
    let args = expect_args(params, 2, "swipe_screen")?;
    let (direction, distance) = direction_and_distance(&args[0], &args[1])?;
    Ok(ActionCommand::SwipeScreen {
        direction,
        distance,
    })
}

fn area_and_subarea(area: &str, subarea: &str) -> Result<(usize, Subarea), String> {
    let area = area
        .parse::<usize>()
        .map_err(|_| format!("grid area must be an integer, got `{area}`"))?;
    let subarea_lower = subarea.to_lowercase();
    let subarea =
        Subarea::parse(&subarea_lower).ok_or_else(|| format!("invalid subarea `{subarea_lower}`"))?;
    Ok((area, subarea))
}

fn grid_point(params: &str) -> Result<(usize, Subarea), String> {
    let args = expect_args(params, 2, "grid tap")?;
    area_and_subarea(&args[0], &args[1])
}

fn grid_swipe(params: &str) -> Result<ActionCommand, String> {
    let args = expect_args(params, 4, "swipe")?;
    let (start_area, start_subarea) = area_and_subarea(&args[0], &args[1])?;
    let (end_area, end_subarea) = area_and_subarea(&args[2], &args[3])?;
    Ok(ActionCommand::GridSwipe {
        start_area,
        start_subarea,
        end_area,
        end_subarea,
    })
}

/// Remove one pair of matching surrounding quotes, if present.
fn strip_matching_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2
            && let Some(inner) = raw.strip_prefix(quote).and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(action: &str) -> String {
        format!("Observation: a screen\nThought: do it\nAction: {action}\nSummary: did it")
    }

    fn element(action: &str) -> ActionCommand {
        parse_action_response(&reply(action), InteractionMode::Element).command
    }

    fn grid(action: &str) -> ActionCommand {
        parse_action_response(&reply(action), InteractionMode::Grid).command
    }

    #[test]
    fn tap_takes_first_number() {
        assert_eq!(element("tap(3)"), ActionCommand::Tap { index: 3 });
        assert_eq!(element("tap(element=12)"), ActionCommand::Tap { index: 12 });
        assert_eq!(element("`long_press(7)`"), ActionCommand::LongPress { index: 7 });
    }

    #[test]
    fn swipe_screen_accepts_quoted_arguments() {
        assert_eq!(
            element(r#"swipe_screen("up","medium")"#),
            ActionCommand::SwipeScreen {
                direction: Direction::Up,
                distance: Distance::Medium
            }
        );
        assert_eq!(
            element("swipe_screen(DOWN, long)"),
            ActionCommand::SwipeScreen {
                direction: Direction::Down,
                distance: Distance::Long
            }
        );
    }

    #[test]
    fn swipe_element_validates_enumerations() {
        assert_eq!(
            element(r#"swipe_element(2, "left", "short")"#),
            ActionCommand::SwipeElement {
                index: 2,
                direction: Direction::Left,
                distance: Distance::Short
            }
        );
        assert!(matches!(
            element(r#"swipe_element(2, "sideways", "short")"#),
            ActionCommand::Error { .. }
        ));
        assert!(matches!(element("swipe_element(2, up)"), ActionCommand::Error { .. }));
    }

    #[test]
    fn bare_keywords_are_case_insensitive() {
        assert_eq!(element("FINISH"), ActionCommand::Finish);
        assert_eq!(element("finish()"), ActionCommand::Finish);
        assert_eq!(
            element("press_back()"),
            ActionCommand::PressKey { key: KeyName::Back }
        );
        assert_eq!(
            element("VOLUME_UP"),
            ActionCommand::PressKey {
                key: KeyName::VolumeUp
            }
        );
        assert_eq!(element("grid()"), ActionCommand::EnterGrid);
        assert_eq!(grid("exit_grid()"), ActionCommand::ExitGrid);
    }

    #[test]
    fn type_global_strips_one_pair_of_quotes() {
        assert_eq!(
            element("type_global('hello world')"),
            ActionCommand::TypeGlobal {
                text: "hello world".to_string()
            }
        );
        assert_eq!(
            element(r#"type_global(""quoted"")"#),
            ActionCommand::TypeGlobal {
                text: "\"quoted\"".to_string()
            }
        );
        assert_eq!(
            element("type_global(it's, fine)"),
            ActionCommand::TypeGlobal {
                text: "it's, fine".to_string()
            }
        );
    }

    #[test]
    fn delete_multiple_requires_positive_count() {
        assert_eq!(
            element("delete_multiple(5)"),
            ActionCommand::DeleteMultiple { count: 5 }
        );
        assert!(matches!(element("delete_multiple(0)"), ActionCommand::Error { .. }));
        assert!(matches!(element("delete_multiple(x)"), ActionCommand::Error { .. }));
    }

    #[test]
    fn grid_mode_selects_grid_shapes() {
        assert_eq!(
            grid(r#"tap(10, "bottom_center")"#),
            ActionCommand::GridTap {
                area: 10,
                subarea: Subarea::BottomCenter
            }
        );
        assert_eq!(
            grid("long_press(7, top_left)"),
            ActionCommand::GridLongPress {
                area: 7,
                subarea: Subarea::TopLeft
            }
        );
        assert_eq!(
            grid(r#"swipe(21, "center", 25, "middle_right")"#),
            ActionCommand::GridSwipe {
                start_area: 21,
                start_subarea: Subarea::Center,
                end_area: 25,
                end_subarea: Subarea::MiddleRight
            }
        );
        assert!(matches!(grid("tap(10)"), ActionCommand::Error { .. }));
        assert!(matches!(grid("tap(x, center)"), ActionCommand::Error { .. }));
    }

    #[test]
    fn element_mode_takes_first_number_even_with_two_args() {
        assert_eq!(element("tap(10, center)"), ActionCommand::Tap { index: 10 });
    }

    #[test]
    fn unknown_actions_are_errors() {
        assert!(matches!(element("dance(3)"), ActionCommand::Error { .. }));
        assert!(matches!(element("tap()"), ActionCommand::Error { .. }));
        assert!(matches!(element("make it so"), ActionCommand::Error { .. }));
        assert!(matches!(element("swipe(1, center, 2, center)"), ActionCommand::Error { .. }));
    }

    #[test]
    fn missing_summary_still_parses() {
        let parsed = parse_action_response(
            "Observation: feed\nThought: scroll down\nAction: swipe_screen(up, short)",
            InteractionMode::Element,
        );
        assert_eq!(parsed.summary, "");
        assert_eq!(
            parsed.command,
            ActionCommand::SwipeScreen {
                direction: Direction::Up,
                distance: Distance::Short
            }
        );
    }

    #[test]
    fn missing_required_section_is_error() {
        let parsed = parse_action_response("Thought: hmm\nAction: tap(1)", InteractionMode::Element);
        assert!(matches!(parsed.command, ActionCommand::Error { .. }));
    }

    #[test]
    fn sections_are_carried_through() {
        let parsed = parse_action_response(&reply("tap(1)"), InteractionMode::Element);
        assert_eq!(parsed.observation, "a screen");
        assert_eq!(parsed.thought, "do it");
        assert_eq!(parsed.raw_action, "tap(1)");
        assert_eq!(parsed.summary, "did it");
    }
}
