//! The single translation from [`ActionCommand`] to device calls.

use tracing::{debug, instrument};

use crate::core::action::{ActionCommand, InteractionMode, KeyName};
use crate::core::gesture::{GRID_SWIPE_MS, Grid, Swipe, element_swipe, screen_swipe};
use crate::core::state::AgentState;
use crate::core::types::{ElementList, Point, ScreenSize, UiElement};
use crate::error::RoundFailure;
use crate::io::device::{Device, keycode};

/// Screen facts and tunables the dispatcher needs besides the command.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext {
    pub screen: ScreenSize,
    pub grid: Grid,
    pub long_press_ms: u32,
}

impl DispatchContext {
    pub fn new(screen: ScreenSize, grid_cell_px: i32, long_press_ms: u32) -> Self {
        Self {
            screen,
            grid: Grid::for_screen(screen, grid_cell_px),
            long_press_ms,
        }
    }
}

/// Element the action was aimed at, with its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub label: usize,
    pub element: UiElement,
}

/// Execute `command` against `device`.
///
/// Element labels and grid areas are checked before any device call. Grid
/// toggles only flip the interaction mode. Returns the targeted element for
/// element-addressed actions.
#[instrument(skip_all, fields(action = command.name()))]
pub fn dispatch<D: Device>(
    device: &D,
    ctx: &DispatchContext,
    state: &mut AgentState,
    command: &ActionCommand,
    elements: &ElementList,
) -> Result<Option<Target>, RoundFailure> {
    match command {
        ActionCommand::Tap { index } => {
            let target = resolve(elements, *index)?;
            device.tap(target.element.center())?;
            Ok(Some(target))
        }
        ActionCommand::LongPress { index } => {
            let target = resolve(elements, *index)?;
            device.long_press(target.element.center(), ctx.long_press_ms)?;
            Ok(Some(target))
        }
        ActionCommand::SwipeElement {
            index,
            direction,
            distance,
        } => {
            let target = resolve(elements, *index)?;
            let swipe = element_swipe(target.element.center(), *direction, *distance, ctx.screen);
            device.swipe(&swipe)?;
            Ok(Some(target))
        }
        ActionCommand::TypeGlobal { text } => {
            device.type_text(text)?;
            Ok(None)
        }
        ActionCommand::SwipeScreen {
            direction,
            distance,
        } => {
            device.swipe(&screen_swipe(*direction, *distance, ctx.screen))?;
            Ok(None)
        }
        ActionCommand::PressKey { key } => {
            press(device, *key)?;
            Ok(None)
        }
        ActionCommand::DeleteMultiple { count } => {
            for _ in 0..*count {
                press(device, KeyName::Delete)?;
            }
            Ok(None)
        }
        ActionCommand::EnterGrid => {
            state.set_interaction(InteractionMode::Grid);
            Ok(None)
        }
        ActionCommand::ExitGrid => {
            state.set_interaction(InteractionMode::Element);
            Ok(None)
        }
        ActionCommand::GridTap { area, subarea } => {
            device.tap(grid_point(&ctx.grid, *area, *subarea)?)?;
            Ok(None)
        }
        ActionCommand::GridLongPress { area, subarea } => {
            let at = grid_point(&ctx.grid, *area, *subarea)?;
            device.long_press(at, ctx.long_press_ms)?;
            Ok(None)
        }
        ActionCommand::GridSwipe {
            start_area,
            start_subarea,
            end_area,
            end_subarea,
        } => {
            let swipe = Swipe {
                start: grid_point(&ctx.grid, *start_area, *start_subarea)?,
                end: grid_point(&ctx.grid, *end_area, *end_subarea)?,
                duration_ms: GRID_SWIPE_MS,
            };
            device.swipe(&swipe)?;
            Ok(None)
        }
        ActionCommand::Finish => Ok(None),
        ActionCommand::Error { reason } => Err(RoundFailure::Parse(reason.clone())),
    }
}

fn resolve(elements: &ElementList, label: usize) -> Result<Target, RoundFailure> {
    let element = elements.resolve(label).ok_or_else(|| {
        RoundFailure::InvalidActionArgument(format!(
            "element {label} is not on screen (labels 1..={})",
            elements.len()
        ))
    })?;
    debug!(label, uid = %element.uid, "resolved target");
    Ok(Target {
        label,
        element: element.clone(),
    })
}

fn grid_point(
    grid: &Grid,
    area: usize,
    subarea: crate::core::action::Subarea,
) -> Result<Point, RoundFailure> {
    grid.point(area, subarea).ok_or_else(|| {
        RoundFailure::InvalidActionArgument(format!(
            "grid area {area} is out of range (1..={})",
            grid.area_count()
        ))
    })
}

fn press<D: Device>(device: &D, key: KeyName) -> Result<(), RoundFailure> {
    match key {
        KeyName::OpenNotifications => device.expand_notifications()?,
        KeyName::CloseNotifications => device.collapse_notifications()?,
        other => {
            let code = keycode(other).ok_or_else(|| {
                RoundFailure::InvalidActionArgument(format!("no keycode for {}", other.as_str()))
            })?;
            device.press_keycode(code)?;
        }
    }
    Ok(())
}
