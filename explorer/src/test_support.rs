//! Scripted device and model doubles plus hierarchy fixtures for tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};

use crate::core::gesture::Swipe;
use crate::core::types::{Point, ScreenSize};
use crate::io::device::{Device, DeviceError};
use crate::io::model::{Model, ModelError};

/// Fixture screen matching a common 1080x2400 phone.
pub const SCREEN: ScreenSize = ScreenSize {
    width: 1080,
    height: 2400,
};

/// Device interactions, in the order they were issued. Captures are tracked
/// separately (see [`ScriptedDevice::captures`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Tap(Point),
    LongPress(Point, u32),
    Swipe(Swipe),
    Key(u32),
    ExpandNotifications,
    CollapseNotifications,
    TypeText(String),
    Launch(String),
    Close(String),
}

/// In-memory device serving canned UI dumps.
///
/// Dumps are served from a queue; the last one stays on screen once the queue
/// runs down to it.
#[derive(Debug)]
pub struct ScriptedDevice {
    screen: ScreenSize,
    screens: RefCell<VecDeque<String>>,
    calls: RefCell<Vec<DeviceCall>>,
    captures: RefCell<Vec<String>>,
    failing_captures: Cell<u32>,
    fail_input: bool,
    fail_launch: bool,
    fail_close: bool,
    package_missing: bool,
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            screen: SCREEN,
            screens: RefCell::new(VecDeque::from([buttons_xml(&[("ok", [0, 0, 200, 100])])])),
            calls: RefCell::new(Vec::new()),
            captures: RefCell::new(Vec::new()),
            failing_captures: Cell::new(0),
            fail_input: false,
            fail_launch: false,
            fail_close: false,
            package_missing: false,
        }
    }

    pub fn with_screens<I, S>(mut self, screens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: VecDeque<String> = screens.into_iter().map(Into::into).collect();
        if !queue.is_empty() {
            self.screens = RefCell::new(queue);
        }
        self
    }

    pub fn with_screen_size(mut self, screen: ScreenSize) -> Self {
        self.screen = screen;
        self
    }

    /// Make every input command (tap, swipe, key, text) fail.
    pub fn failing_input(mut self) -> Self {
        self.fail_input = true;
        self
    }

    /// Make the next `count` screenshot captures fail.
    pub fn failing_captures(self, count: u32) -> Self {
        self.failing_captures.set(count);
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Report every package as not installed.
    pub fn without_package(mut self) -> Self {
        self.package_missing = true;
        self
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.borrow().clone()
    }

    /// Names passed to screenshot and dump captures, e.g. `"2_before"`, `"2"`.
    pub fn captures(&self) -> Vec<String> {
        self.captures.borrow().clone()
    }

    fn input(&self, call: DeviceCall) -> Result<(), DeviceError> {
        if self.fail_input {
            return Err(failed(&format!("{call:?}")));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }

    fn current_screen(&self) -> String {
        let mut screens = self.screens.borrow_mut();
        if screens.len() > 1 {
            screens.pop_front().unwrap_or_default()
        } else {
            screens.front().cloned().unwrap_or_default()
        }
    }
}

impl Device for ScriptedDevice {
    fn screen_size(&self) -> Result<ScreenSize, DeviceError> {
        Ok(self.screen)
    }

    fn capture_screenshot(&self, name: &str, dir: &Path) -> Result<PathBuf, DeviceError> {
        self.captures.borrow_mut().push(format!("{name}.png"));
        let remaining = self.failing_captures.get();
        if remaining > 0 {
            self.failing_captures.set(remaining - 1);
            return Err(failed("screencap"));
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.png"));
        write_png(&path, 108, 240).map_err(|err| failed(&err.to_string()))?;
        Ok(path)
    }

    fn dump_ui_tree(&self, name: &str, dir: &Path) -> Result<PathBuf, DeviceError> {
        self.captures.borrow_mut().push(format!("{name}.xml"));
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.xml"));
        fs::write(&path, self.current_screen())?;
        Ok(path)
    }

    fn tap(&self, at: Point) -> Result<(), DeviceError> {
        self.input(DeviceCall::Tap(at))
    }

    fn long_press(&self, at: Point, duration_ms: u32) -> Result<(), DeviceError> {
        self.input(DeviceCall::LongPress(at, duration_ms))
    }

    fn swipe(&self, swipe: &Swipe) -> Result<(), DeviceError> {
        self.input(DeviceCall::Swipe(*swipe))
    }

    fn press_keycode(&self, keycode: u32) -> Result<(), DeviceError> {
        self.input(DeviceCall::Key(keycode))
    }

    fn expand_notifications(&self) -> Result<(), DeviceError> {
        self.input(DeviceCall::ExpandNotifications)
    }

    fn collapse_notifications(&self) -> Result<(), DeviceError> {
        self.input(DeviceCall::CollapseNotifications)
    }

    fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.input(DeviceCall::TypeText(text.to_string()))
    }

    fn is_package_installed(&self, _package: &str) -> Result<bool, DeviceError> {
        Ok(!self.package_missing)
    }

    fn package_version(&self, _package: &str) -> Result<Option<String>, DeviceError> {
        Ok((!self.package_missing).then(|| "1.0".to_string()))
    }

    fn launch_app(&self, package: &str) -> Result<(), DeviceError> {
        if self.fail_launch {
            return Err(failed("monkey"));
        }
        self.calls
            .borrow_mut()
            .push(DeviceCall::Launch(package.to_string()));
        Ok(())
    }

    fn close_app(&self, package: &str) -> Result<(), DeviceError> {
        self.calls
            .borrow_mut()
            .push(DeviceCall::Close(package.to_string()));
        if self.fail_close {
            return Err(failed("am force-stop"));
        }
        Ok(())
    }
}

fn failed(command: &str) -> DeviceError {
    DeviceError::Failed {
        command: command.to_string(),
        code: Some(1),
        stderr: "scripted failure".to_string(),
    }
}

/// Model that replays queued replies and records every prompt it saw.
///
/// A `None` entry simulates a transport failure. An exhausted script fails too.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<Option<String>>>,
    prompts: RefCell<Vec<(String, usize)>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| Some(r.into())).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Queue a transport failure after the replies already scripted.
    pub fn then_fail(self) -> Self {
        self.replies.borrow_mut().push_back(None);
        self
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.replies.borrow_mut().push_back(Some(reply.into()));
        self
    }

    /// `(prompt, image count)` for every call, in order.
    pub fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.borrow().clone()
    }
}

impl Model for ScriptedModel {
    fn respond(&self, prompt: &str, images: &[&Path]) -> Result<String, ModelError> {
        self.prompts
            .borrow_mut()
            .push((prompt.to_string(), images.len()));
        match self.replies.borrow_mut().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(ModelError::Transport("scripted failure".to_string())),
            None => Err(ModelError::Transport("script exhausted".to_string())),
        }
    }
}

/// Write a blank PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) -> image::ImageResult<()> {
    RgbaImage::from_pixel(width, height, Rgba([240, 240, 240, 255])).save(path)
}

/// Hierarchy dump with one clickable button per `(resource id, [l, t, r, b])`.
pub fn buttons_xml(buttons: &[(&str, [i32; 4])]) -> String {
    let nodes: String = buttons
        .iter()
        .enumerate()
        .map(|(idx, (id, [l, t, r, b]))| {
            format!(
                r#"<node index="{idx}" text="" resource-id="com.example:id/{id}" class="android.widget.Button" content-desc="" clickable="true" focusable="true" bounds="[{l},{t}][{r},{b}]" />"#
            )
        })
        .collect();
    format!(
        r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" focusable="false" bounds="[0,0][1080,2400]">{nodes}</node></hierarchy>"#
    )
}

/// Uid the snapshot builder derives for a [`buttons_xml`] button.
pub fn button_uid(id: &str) -> String {
    format!("android.widget.FrameLayout_1080_2400.com.example.id_{id}")
}

/// Well-formed decision reply.
pub fn decision(action: &str, summary: &str) -> String {
    format!(
        "Observation: The screen shows buttons.\nThought: Try the next step.\nAction: {action}\nSummary: {summary}\n"
    )
}

/// Well-formed reflection reply.
pub fn reflection(verdict: &str, documentation: &str) -> String {
    format!(
        "Decision: {verdict}\nThought: Compared both screenshots.\nDocumentation: {documentation}\n"
    )
}
