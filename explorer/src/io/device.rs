//! Device channel abstraction and its `adb` implementation.
//!
//! The [`Device`] trait decouples the round loop from the transport. Tests use
//! scripted devices that record calls and serve canned hierarchy dumps without
//! spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::action::KeyName;
use crate::core::gesture::Swipe;
use crate::core::types::{Point, ScreenSize};
use crate::io::config::DeviceConfig;
use crate::io::process::run_command_with_timeout;

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(Physical|Override) size:\s*(\d+)x(\d+)").expect("size pattern is valid")
});

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("`{command}` could not run: {detail}")]
    Spawn { command: String, detail: String },
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("`{command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Everything the round loop needs from a phone.
pub trait Device {
    fn screen_size(&self) -> Result<ScreenSize, DeviceError>;
    /// Capture a PNG named `{name}.png` into `dir`, returning its local path.
    fn capture_screenshot(&self, name: &str, dir: &Path) -> Result<PathBuf, DeviceError>;
    /// Dump the UI hierarchy as `{name}.xml` into `dir`, returning its local path.
    fn dump_ui_tree(&self, name: &str, dir: &Path) -> Result<PathBuf, DeviceError>;
    fn tap(&self, at: Point) -> Result<(), DeviceError>;
    fn long_press(&self, at: Point, duration_ms: u32) -> Result<(), DeviceError>;
    fn swipe(&self, swipe: &Swipe) -> Result<(), DeviceError>;
    fn press_keycode(&self, keycode: u32) -> Result<(), DeviceError>;
    fn expand_notifications(&self) -> Result<(), DeviceError>;
    fn collapse_notifications(&self) -> Result<(), DeviceError>;
    fn type_text(&self, text: &str) -> Result<(), DeviceError>;
    fn is_package_installed(&self, package: &str) -> Result<bool, DeviceError>;
    /// Installed `versionName`, if the package manager reports one.
    fn package_version(&self, package: &str) -> Result<Option<String>, DeviceError>;
    fn launch_app(&self, package: &str) -> Result<(), DeviceError>;
    fn close_app(&self, package: &str) -> Result<(), DeviceError>;
}

/// Android keycode for a key, or `None` for the notification shade actions
/// which are not key events.
pub fn keycode(key: KeyName) -> Option<u32> {
    let code = match key {
        KeyName::Back => 4,
        KeyName::Home => 3,
        KeyName::Enter => 66,
        KeyName::Delete => 67,
        KeyName::Tab => 61,
        KeyName::Power => 26,
        KeyName::VolumeUp => 24,
        KeyName::VolumeDown => 25,
        KeyName::Mute => 164,
        KeyName::AppSwitch => 187,
        KeyName::MediaPlayPause => 85,
        KeyName::MediaNext => 87,
        KeyName::MediaPrevious => 88,
        KeyName::OpenNotifications | KeyName::CloseNotifications => return None,
    };
    Some(code)
}

/// Device driven through the `adb` command-line tool.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: String,
    serial: String,
    screenshot_dir: String,
    xml_dir: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl AdbDevice {
    pub fn new(serial: impl Into<String>, config: &DeviceConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            serial: serial.into(),
            screenshot_dir: config.screenshot_dir.clone(),
            xml_dir: config.xml_dir.clone(),
            timeout: config.command_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, DeviceError> {
        let mut cmd = Command::new(&self.adb_path);
        cmd.arg("-s").arg(&self.serial).args(args);
        run_adb(cmd, args, self.timeout, self.output_limit_bytes)
    }

    fn shell(&self, args: &[&str]) -> Result<String, DeviceError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run(&full)
    }

    /// Run a producer command on the device, then pull `remote` into `dir`.
    fn capture_and_pull(
        &self,
        produce: &[&str],
        remote: &str,
        dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf, DeviceError> {
        self.shell(produce)?;
        fs::create_dir_all(dir)?;
        let local = dir.join(file_name);
        let local_str = local.to_string_lossy();
        self.run(&["pull", remote, &*local_str])?;
        if !local.exists() {
            return Err(DeviceError::UnexpectedOutput {
                command: format!("pull {remote}"),
                output: format!("{} was not created", local.display()),
            });
        }
        Ok(local)
    }
}

impl Device for AdbDevice {
    #[instrument(skip_all, fields(serial = %self.serial))]
    fn screen_size(&self) -> Result<ScreenSize, DeviceError> {
        let stdout = self.shell(&["wm", "size"])?;
        parse_screen_size(&stdout).ok_or(DeviceError::UnexpectedOutput {
            command: "wm size".to_string(),
            output: stdout.trim().to_string(),
        })
    }

    #[instrument(skip_all, fields(name = %name))]
    fn capture_screenshot(&self, name: &str, dir: &Path) -> Result<PathBuf, DeviceError> {
        let file_name = format!("{name}.png");
        let remote = remote_path(&self.screenshot_dir, &file_name);
        self.capture_and_pull(&["screencap", "-p", remote.as_str()], &remote, dir, &file_name)
    }

    #[instrument(skip_all, fields(name = %name))]
    fn dump_ui_tree(&self, name: &str, dir: &Path) -> Result<PathBuf, DeviceError> {
        let file_name = format!("{name}.xml");
        let remote = remote_path(&self.xml_dir, &file_name);
        self.capture_and_pull(&["uiautomator", "dump", remote.as_str()], &remote, dir, &file_name)
    }

    fn tap(&self, at: Point) -> Result<(), DeviceError> {
        self.shell(&["input", "tap", at.x.to_string().as_str(), at.y.to_string().as_str()])
            .map(drop)
    }

    fn long_press(&self, at: Point, duration_ms: u32) -> Result<(), DeviceError> {
        self.swipe(&Swipe {
            start: at,
            end: at,
            duration_ms,
        })
    }

    fn swipe(&self, swipe: &Swipe) -> Result<(), DeviceError> {
        self.shell(&[
            "input",
            "swipe",
            swipe.start.x.to_string().as_str(),
            swipe.start.y.to_string().as_str(),
            swipe.end.x.to_string().as_str(),
            swipe.end.y.to_string().as_str(),
            swipe.duration_ms.to_string().as_str(),
        ])
        .map(drop)
    }

    fn press_keycode(&self, keycode: u32) -> Result<(), DeviceError> {
        self.shell(&["input", "keyevent", keycode.to_string().as_str()])
            .map(drop)
    }

    fn expand_notifications(&self) -> Result<(), DeviceError> {
        self.shell(&["cmd", "statusbar", "expand-notifications"])
            .map(drop)
    }

    fn collapse_notifications(&self) -> Result<(), DeviceError> {
        self.shell(&["cmd", "statusbar", "collapse"]).map(drop)
    }

    fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        debug!(chars = text.chars().count(), "typing text");
        self.shell(&["input", "text", escape_input_text(text).as_str()])
            .map(drop)
    }

    #[instrument(skip_all, fields(package = %package))]
    fn is_package_installed(&self, package: &str) -> Result<bool, DeviceError> {
        let stdout = self.shell(&["pm", "list", "packages", package])?;
        Ok(package_listed(&stdout, package))
    }

    #[instrument(skip_all, fields(package = %package))]
    fn package_version(&self, package: &str) -> Result<Option<String>, DeviceError> {
        let stdout = self.shell(&["dumpsys", "package", package])?;
        Ok(parse_version_name(&stdout))
    }

    #[instrument(skip_all, fields(package = %package))]
    fn launch_app(&self, package: &str) -> Result<(), DeviceError> {
        info!("launching app");
        let stdout = self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        if stdout.contains("No activities found") {
            return Err(DeviceError::UnexpectedOutput {
                command: format!("monkey -p {package}"),
                output: stdout.trim().to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(package = %package))]
    fn close_app(&self, package: &str) -> Result<(), DeviceError> {
        self.shell(&["am", "force-stop", package]).map(drop)
    }
}

/// Serials of attached devices in the `device` state.
pub fn list_devices(config: &DeviceConfig) -> Result<Vec<String>, DeviceError> {
    let mut cmd = Command::new(&config.adb_path);
    cmd.arg("devices");
    let stdout = run_adb(
        cmd,
        &["devices"],
        config.command_timeout(),
        config.output_limit_bytes,
    )?;
    Ok(parse_devices(&stdout))
}

fn run_adb(
    cmd: Command,
    args: &[&str],
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<String, DeviceError> {
    let command = format!("adb {}", args.join(" "));
    let output = run_command_with_timeout(cmd, timeout, output_limit_bytes).map_err(|err| {
        DeviceError::Spawn {
            command: command.clone(),
            detail: format!("{err:#}"),
        }
    })?;
    if output.timed_out {
        return Err(DeviceError::Timeout {
            command,
            secs: timeout.as_secs(),
        });
    }
    if !output.status.success() {
        warn!(%command, code = ?output.status.code(), "adb command failed");
        return Err(DeviceError::Failed {
            command,
            code: output.status.code(),
            stderr: output.stderr_text(),
        });
    }
    Ok(output.stdout_text())
}

fn remote_path(dir: &str, file_name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{file_name}")
    } else {
        format!("{dir}/{file_name}")
    }
}

/// Parse `wm size` output. An override size, when present, wins over the
/// physical size because it is what input coordinates refer to.
pub fn parse_screen_size(stdout: &str) -> Option<ScreenSize> {
    let mut physical = None;
    let mut overridden = None;
    for caps in SIZE_RE.captures_iter(stdout) {
        let size = ScreenSize {
            width: caps[2].parse().ok()?,
            height: caps[3].parse().ok()?,
        };
        match &caps[1] {
            "Override" => overridden = Some(size),
            _ => physical = Some(size),
        }
    }
    overridden.or(physical)
}

/// Parse `adb devices` output into serials of ready devices.
pub fn parse_devices(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.to_lowercase().contains("attached"))
        .filter_map(|line| {
            let (serial, state) = line.split_once('\t')?;
            (state.trim() == "device").then(|| serial.trim().to_string())
        })
        .collect()
}

/// `true` when `pm list packages` output names `package` exactly. The filter
/// argument matches substrings, so `com.app` also lists `com.app.beta`.
pub fn package_listed(stdout: &str, package: &str) -> bool {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .any(|name| name == package)
}

/// First `versionName=` value in `dumpsys package` output.
pub fn parse_version_name(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("versionName="))
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .map(str::to_string)
}

/// Escape text for `input text` through the device shell: spaces become `%s`
/// and the whole argument is single-quoted.
pub fn escape_input_text(text: &str) -> String {
    let spaced = text.replace(' ', "%s");
    format!("'{}'", spaced.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_size_prefers_override() {
        assert_eq!(
            parse_screen_size("Physical size: 1080x2400\n"),
            Some(ScreenSize {
                width: 1080,
                height: 2400
            })
        );
        assert_eq!(
            parse_screen_size("Physical size: 1440x3120\nOverride size: 1080x2340\n"),
            Some(ScreenSize {
                width: 1080,
                height: 2340
            })
        );
        assert_eq!(parse_screen_size("error: no devices"), None);
    }

    #[test]
    fn devices_only_lists_ready_serials() {
        let stdout = "List of devices attached\nemulator-5554\tdevice\nR58M123\toffline\n0123ABC\tunauthorized\nphone-2\tdevice\n\n";
        assert_eq!(parse_devices(stdout), vec!["emulator-5554", "phone-2"]);
    }

    #[test]
    fn package_listing_requires_exact_name() {
        let stdout = "package:com.example.beta\npackage:com.example\n";
        assert!(package_listed(stdout, "com.example"));
        assert!(!package_listed("package:com.example.beta\n", "com.example"));
        assert!(!package_listed("", "com.example"));
    }

    #[test]
    fn version_name_is_read_from_dumpsys() {
        let stdout = "Packages:\n  Package [com.example] (1a2b):\n    versionCode=42 minSdk=24\n    versionName=3.1.4\n";
        assert_eq!(parse_version_name(stdout).as_deref(), Some("3.1.4"));
        assert_eq!(parse_version_name("Unable to find package: com.example\n"), None);
    }

    #[test]
    fn input_text_is_shell_quoted() {
        assert_eq!(escape_input_text("hello world"), "'hello%sworld'");
        assert_eq!(escape_input_text("it's"), r"'it'\''s'");
    }

    #[test]
    fn notification_actions_have_no_keycode() {
        assert_eq!(keycode(KeyName::Back), Some(4));
        assert_eq!(keycode(KeyName::AppSwitch), Some(187));
        assert_eq!(keycode(KeyName::OpenNotifications), None);
    }

    #[test]
    fn remote_paths_join_cleanly() {
        assert_eq!(remote_path("/sdcard/", "1_before.png"), "/sdcard/1_before.png");
        assert_eq!(remote_path("/sdcard", "1.xml"), "/sdcard/1.xml");
    }
}
