//! Shared deterministic types for the explorer core.
//!
//! Elements are rebuilt from scratch every round; only their `uid` outlives a
//! round (blacklist, documentation store).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pixel rectangle parsed from a `[x1,y1][x2,y2]` bounds attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Parse `[x1,y1][x2,y2]` into exactly four integers.
    ///
    /// Returns `None` for any other shape, and for coordinates whose size or
    /// center does not fit in `i32`. Degenerate boxes are accepted here;
    /// callers decide whether a zero-area box is usable.
    pub fn parse(raw: &str) -> Option<Self> {
        let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
        let coords: Vec<i32> = inner
            .split("][")
            .flat_map(|pair| pair.split(','))
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .ok()?;
        let [left, top, right, bottom] = coords.as_slice() else {
            return None;
        };
        right.checked_sub(*left)?;
        bottom.checked_sub(*top)?;
        left.checked_add(*right)?;
        top.checked_add(*bottom)?;
        Some(Self::new(*left, *top, *right, *bottom))
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// `true` unless bottom-right lies strictly beyond top-left on both axes.
    pub fn is_degenerate(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Integer midpoint of the rectangle.
    pub fn center(&self) -> Point {
        Point {
            x: midpoint(self.left, self.right),
            y: midpoint(self.top, self.bottom),
        }
    }
}

/// The mean of two `i32`s always fits in `i32`.
fn midpoint(a: i32, b: i32) -> i32 {
    i32::try_from((i64::from(a) + i64::from(b)) / 2).unwrap_or(a)
}

/// Device pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Saturates at `i32::MAX`.
    pub fn manhattan(&self, other: &Point) -> i32 {
        let dx = (i64::from(self.x) - i64::from(other.x)).abs();
        let dy = (i64::from(self.y) - i64::from(other.y)).abs();
        i32::try_from(dx + dy).unwrap_or(i32::MAX)
    }
}

/// Device screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl ScreenSize {
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn clamp(&self, point: Point) -> Point {
        Point {
            x: point.x.clamp(0, (self.width - 1).max(0)),
            y: point.y.clamp(0, (self.height - 1).max(0)),
        }
    }
}

/// UI-tree attribute selecting which nodes a snapshot pass collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Clickable,
    Focusable,
}

impl Capability {
    pub fn attribute(self) -> &'static str {
        match self {
            Capability::Clickable => "clickable",
            Capability::Focusable => "focusable",
        }
    }

    pub fn tag(self) -> RoleTag {
        match self {
            Capability::Clickable => RoleTag::Clickable,
            Capability::Focusable => RoleTag::Focusable,
        }
    }
}

/// Base capability plus semantic hints attached to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTag {
    Clickable,
    Focusable,
    SearchBar,
    NavItem,
    NavBarContainer,
}

impl RoleTag {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleTag::Clickable => "clickable",
            RoleTag::Focusable => "focusable",
            RoleTag::SearchBar => "search_bar",
            RoleTag::NavItem => "nav_item",
            RoleTag::NavBarContainer => "nav_bar_container",
        }
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interactive element derived from a UI-tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiElement {
    pub uid: String,
    pub bounds: Bounds,
    /// Base capability first, then hints in derivation order.
    pub tags: Vec<RoleTag>,
}

impl UiElement {
    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    pub fn has_tag(&self, tag: RoleTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Ordered, de-duplicated elements for one round. Labels shown to the model
/// are 1-based positions in this list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementList {
    elements: Vec<UiElement>,
}

impl ElementList {
    pub fn new(elements: Vec<UiElement>) -> Self {
        Self { elements }
    }

    /// Resolve a 1-based label. `0` and labels past the end yield `None`.
    pub fn resolve(&self, label: usize) -> Option<&UiElement> {
        label.checked_sub(1).and_then(|idx| self.elements.get(idx))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UiElement> {
        self.elements.iter()
    }

    /// `(label, element)` pairs in display order.
    pub fn labeled(&self) -> impl Iterator<Item = (usize, &UiElement)> {
        self.elements.iter().enumerate().map(|(idx, e)| (idx + 1, e))
    }
}

impl<'a> IntoIterator for &'a ElementList {
    type Item = &'a UiElement;
    type IntoIter = std::slice::Iter<'a, UiElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
