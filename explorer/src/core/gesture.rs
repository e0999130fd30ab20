//! Screen geometry for swipes and the grid overlay.

use crate::core::action::{Direction, Distance, Subarea};
use crate::core::types::{Point, ScreenSize};

/// Duration of a screen-wide swipe.
pub const SCREEN_SWIPE_MS: u32 = 300;
/// Duration of a grid-to-grid swipe.
pub const GRID_SWIPE_MS: u32 = 400;

/// A fully resolved swipe ready for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swipe {
    pub start: Point,
    pub end: Point,
    pub duration_ms: u32,
}

/// Swipe starting at an element's center. One unit is 1/20 of the screen height.
pub fn element_swipe(
    center: Point,
    direction: Direction,
    distance: Distance,
    screen: ScreenSize,
) -> Swipe {
    let unit = screen.height / 20;
    let (units, duration_ms) = match distance {
        Distance::Short => (1, 200),
        Distance::Medium => (2, 400),
        Distance::Long => (4, 800),
    };
    let offset = unit * units;
    let (dx, dy) = match direction {
        Direction::Up => (0, -offset),
        Direction::Down => (0, offset),
        Direction::Left => (-offset, 0),
        Direction::Right => (offset, 0),
    };
    Swipe {
        start: screen.clamp(center),
        end: screen.clamp(Point::new(center.x + dx, center.y + dy)),
        duration_ms,
    }
}

/// Swipe across the screen center covering a fraction of the screen.
pub fn screen_swipe(direction: Direction, distance: Distance, screen: ScreenSize) -> Swipe {
    let factor = match distance {
        Distance::Short => 0.25,
        Distance::Medium => 0.5,
        Distance::Long => 0.75,
    };
    let center = Point::new(screen.width / 2, screen.height / 2);
    let half_x = (f64::from(screen.width) * factor / 2.0) as i32;
    let half_y = (f64::from(screen.height) * factor / 2.0) as i32;
    let (start, end) = match direction {
        Direction::Up => (
            Point::new(center.x, center.y + half_y),
            Point::new(center.x, center.y - half_y),
        ),
        Direction::Down => (
            Point::new(center.x, center.y - half_y),
            Point::new(center.x, center.y + half_y),
        ),
        Direction::Left => (
            Point::new(center.x + half_x, center.y),
            Point::new(center.x - half_x, center.y),
        ),
        Direction::Right => (
            Point::new(center.x - half_x, center.y),
            Point::new(center.x + half_x, center.y),
        ),
    };
    Swipe {
        start: screen.clamp(start),
        end: screen.clamp(end),
        duration_ms: SCREEN_SWIPE_MS,
    }
}

/// Grid overlay dividing the screen into numbered cells (1-based, row-major).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub cols: i32,
    pub rows: i32,
    pub cell_width: i32,
    pub cell_height: i32,
}

impl Grid {
    /// Lay out cells of roughly `cell_px` pixels.
    ///
    /// Each axis prefers an exact divisor of the screen dimension within
    /// `[cell_px, 1.5 * cell_px]` so cells tile the screen evenly.
    pub fn for_screen(screen: ScreenSize, cell_px: i32) -> Self {
        let cell_px = cell_px.max(1);
        let unit_w = even_unit(screen.width, cell_px);
        let unit_h = even_unit(screen.height, cell_px);
        let cols = (screen.width / unit_w).max(1);
        let rows = (screen.height / unit_h).max(1);
        Self {
            cols,
            rows,
            cell_width: screen.width / cols,
            cell_height: screen.height / rows,
        }
    }

    pub fn area_count(&self) -> usize {
        usize::try_from(self.cols * self.rows).unwrap_or(0)
    }

    /// Top-left corner of a 1-based area, or `None` when out of range.
    pub fn cell_origin(&self, area: usize) -> Option<Point> {
        if area == 0 || area > self.area_count() {
            return None;
        }
        let idx = i32::try_from(area - 1).ok()?;
        let (row, col) = (idx / self.cols, idx % self.cols);
        Some(Point::new(col * self.cell_width, row * self.cell_height))
    }

    /// Device point for `subarea` inside `area`.
    pub fn point(&self, area: usize, subarea: Subarea) -> Option<Point> {
        let origin = self.cell_origin(area)?;
        let (qx, qy) = subarea.quarters();
        Some(Point::new(
            origin.x + self.cell_width * qx / 4,
            origin.y + self.cell_height * qy / 4,
        ))
    }
}

fn even_unit(length: i32, cell_px: i32) -> i32 {
    let upper = cell_px + cell_px / 2;
    (cell_px..=upper)
        .find(|unit| length > 0 && length % unit == 0)
        .unwrap_or(cell_px)
}
