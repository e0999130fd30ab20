//! The closed set of actions a model reply can resolve to.

use std::fmt;

use serde::Serialize;

/// Swipe direction. The finger moves toward this side of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Short,
    Medium,
    Long,
}

impl Distance {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "short" => Some(Distance::Short),
            "medium" => Some(Distance::Medium),
            "long" => Some(Distance::Long),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Distance::Short => "short",
            Distance::Medium => "medium",
            Distance::Long => "long",
        }
    }
}

/// Point inside a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subarea {
    Center,
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Subarea {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "center" => Some(Subarea::Center),
            "top_left" => Some(Subarea::TopLeft),
            "top_center" => Some(Subarea::TopCenter),
            "top_right" => Some(Subarea::TopRight),
            "middle_left" => Some(Subarea::MiddleLeft),
            "middle_right" => Some(Subarea::MiddleRight),
            "bottom_left" => Some(Subarea::BottomLeft),
            "bottom_center" => Some(Subarea::BottomCenter),
            "bottom_right" => Some(Subarea::BottomRight),
            _ => None,
        }
    }

    /// Position within the cell in quarters: `(column, row)`, each in `1..=3`.
    pub fn quarters(self) -> (i32, i32) {
        match self {
            Subarea::Center => (2, 2),
            Subarea::TopLeft => (1, 1),
            Subarea::TopCenter => (2, 1),
            Subarea::TopRight => (3, 1),
            Subarea::MiddleLeft => (1, 2),
            Subarea::MiddleRight => (3, 2),
            Subarea::BottomLeft => (1, 3),
            Subarea::BottomCenter => (2, 3),
            Subarea::BottomRight => (3, 3),
        }
    }
}

/// Keys and system buttons the model can press without a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyName {
    Back,
    Home,
    Enter,
    Delete,
    Tab,
    AppSwitch,
    OpenNotifications,
    CloseNotifications,
    VolumeUp,
    VolumeDown,
    MediaPlayPause,
    MediaNext,
    MediaPrevious,
    Mute,
    Power,
}

impl KeyName {
    /// Map a bare action keyword (already upper-cased) to a key.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let key = match keyword {
            "PRESS_BACK" => KeyName::Back,
            "PRESS_HOME" => KeyName::Home,
            "PRESS_ENTER" => KeyName::Enter,
            "PRESS_DELETE" => KeyName::Delete,
            "PRESS_TAB" => KeyName::Tab,
            "PRESS_APP_SWITCH" => KeyName::AppSwitch,
            "OPEN_NOTIFICATIONS" => KeyName::OpenNotifications,
            "CLOSE_NOTIFICATIONS" => KeyName::CloseNotifications,
            "VOLUME_UP" => KeyName::VolumeUp,
            "VOLUME_DOWN" => KeyName::VolumeDown,
            "MEDIA_PLAY_PAUSE" => KeyName::MediaPlayPause,
            "MEDIA_NEXT" => KeyName::MediaNext,
            "MEDIA_PREVIOUS" => KeyName::MediaPrevious,
            "PRESS_MUTE" => KeyName::Mute,
            "PRESS_POWER" => KeyName::Power,
            _ => return None,
        };
        Some(key)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyName::Back => "press_back",
            KeyName::Home => "press_home",
            KeyName::Enter => "press_enter",
            KeyName::Delete => "press_delete",
            KeyName::Tab => "press_tab",
            KeyName::AppSwitch => "press_app_switch",
            KeyName::OpenNotifications => "open_notifications",
            KeyName::CloseNotifications => "close_notifications",
            KeyName::VolumeUp => "volume_up",
            KeyName::VolumeDown => "volume_down",
            KeyName::MediaPlayPause => "media_play_pause",
            KeyName::MediaNext => "media_next",
            KeyName::MediaPrevious => "media_previous",
            KeyName::Mute => "press_mute",
            KeyName::Power => "press_power",
        }
    }
}

/// Which shape `tap`/`long_press` take: element labels or grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Element,
    Grid,
}

/// One validated action. Element indices and grid areas are 1-based labels
/// and have not yet been checked against the current screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionCommand {
    Tap {
        index: usize,
    },
    LongPress {
        index: usize,
    },
    TypeGlobal {
        text: String,
    },
    SwipeElement {
        index: usize,
        direction: Direction,
        distance: Distance,
    },
    SwipeScreen {
        direction: Direction,
        distance: Distance,
    },
    PressKey {
        key: KeyName,
    },
    DeleteMultiple {
        count: u32,
    },
    EnterGrid,
    ExitGrid,
    GridTap {
        area: usize,
        subarea: Subarea,
    },
    GridLongPress {
        area: usize,
        subarea: Subarea,
    },
    GridSwipe {
        start_area: usize,
        start_subarea: Subarea,
        end_area: usize,
        end_subarea: Subarea,
    },
    Finish,
    Error {
        reason: String,
    },
}

impl ActionCommand {
    pub fn error(reason: impl Into<String>) -> Self {
        ActionCommand::Error {
            reason: reason.into(),
        }
    }

    /// Stable action name used in prompts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ActionCommand::Tap { .. } => "tap",
            ActionCommand::LongPress { .. } => "long_press",
            ActionCommand::TypeGlobal { .. } => "type_global",
            ActionCommand::SwipeElement { .. } => "swipe_element",
            ActionCommand::SwipeScreen { .. } => "swipe_screen",
            ActionCommand::PressKey { key } => key.as_str(),
            ActionCommand::DeleteMultiple { .. } => "delete_multiple",
            ActionCommand::EnterGrid => "grid",
            ActionCommand::ExitGrid => "exit_grid",
            ActionCommand::GridTap { .. } => "tap_grid",
            ActionCommand::GridLongPress { .. } => "long_press_grid",
            ActionCommand::GridSwipe { .. } => "swipe_grid",
            ActionCommand::Finish => "FINISH",
            ActionCommand::Error { .. } => "ERROR",
        }
    }

    /// Element label targeted by this action, if any.
    pub fn target_index(&self) -> Option<usize> {
        match self {
            ActionCommand::Tap { index }
            | ActionCommand::LongPress { index }
            | ActionCommand::SwipeElement { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_grid_toggle(&self) -> bool {
        matches!(self, ActionCommand::EnterGrid | ActionCommand::ExitGrid)
    }
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCommand::Tap { index } | ActionCommand::LongPress { index } => {
                write!(f, "{}({index})", self.name())
            }
            ActionCommand::TypeGlobal { text } => write!(f, "type_global({text:?})"),
            ActionCommand::SwipeElement {
                index,
                direction,
                distance,
            } => write!(
                f,
                "swipe_element({index}, {}, {})",
                direction.as_str(),
                distance.as_str()
            ),
            ActionCommand::SwipeScreen {
                direction,
                distance,
            } => write!(
                f,
                "swipe_screen({}, {})",
                direction.as_str(),
                distance.as_str()
            ),
            ActionCommand::DeleteMultiple { count } => write!(f, "delete_multiple({count})"),
            ActionCommand::GridTap { area, subarea } | ActionCommand::GridLongPress { area, subarea } => {
                write!(f, "{}({area}, {subarea:?})", self.name())
            }
            ActionCommand::GridSwipe {
                start_area,
                start_subarea,
                end_area,
                end_subarea,
            } => write!(
                f,
                "swipe_grid({start_area}, {start_subarea:?}, {end_area}, {end_subarea:?})"
            ),
            ActionCommand::Error { reason } => write!(f, "ERROR({reason})"),
            ActionCommand::PressKey { .. }
            | ActionCommand::EnterGrid
            | ActionCommand::ExitGrid
            | ActionCommand::Finish => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_action_tag() {
        let json = serde_json::to_value(ActionCommand::SwipeScreen {
            direction: Direction::Up,
            distance: Distance::Medium,
        })
        .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"action": "swipe_screen", "direction": "up", "distance": "medium"})
        );
    }

    #[test]
    fn target_index_only_for_element_actions() {
        assert_eq!(ActionCommand::Tap { index: 4 }.target_index(), Some(4));
        assert_eq!(
            ActionCommand::GridTap {
                area: 4,
                subarea: Subarea::Center
            }
            .target_index(),
            None
        );
        assert_eq!(ActionCommand::Finish.target_index(), None);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(ActionCommand::Tap { index: 3 }.to_string(), "tap(3)");
        assert_eq!(
            ActionCommand::PressKey { key: KeyName::Back }.to_string(),
            "press_back"
        );
        assert_eq!(
            ActionCommand::TypeGlobal {
                text: "hi".to_string()
            }
            .to_string(),
            "type_global(\"hi\")"
        );
    }
}
