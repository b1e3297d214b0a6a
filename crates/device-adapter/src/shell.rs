//! Device shell capability (adb)

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;
use which::which;

use crate::error::ShellError;

/// Synchronous device-level commands that sit outside the automation session.
///
/// Every failure is a retryable [`ShellError::CommandFailed`].
pub trait DeviceShell: Send + Sync {
    fn clear_app_data(&self, package: &str) -> Result<(), ShellError>;

    /// Fire a VIEW intent for `url` (deep link or web URL).
    fn open_url(&self, url: &str) -> Result<(), ShellError>;

    /// Raw UI hierarchy XML as reported by uiautomator.
    fn dump_ui_tree(&self) -> Result<String, ShellError>;

    /// Serials of devices in the `device` state.
    fn list_connected_devices(&self) -> Result<Vec<String>, ShellError>;

    fn force_stop(&self, package: &str) -> Result<(), ShellError>;
}

/// [`DeviceShell`] backed by the `adb` binary.
#[derive(Clone, Debug)]
pub struct AdbShell {
    binary: PathBuf,
    serial: Option<String>,
}

impl AdbShell {
    /// Locate adb: explicit path, then `WALLETFORGE_ADB`, then `PATH`.
    pub fn locate(explicit: Option<&Path>, serial: Option<String>) -> Result<Self, ShellError> {
        let binary = detect_adb(explicit)
            .ok_or_else(|| ShellError::BinaryNotFound("adb".to_string()))?;
        debug!(adb = %binary.display(), "Using adb binary");
        Ok(Self { binary, serial })
    }

    pub fn new(binary: impl Into<PathBuf>, serial: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            serial,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[&str]) -> Result<String, ShellError> {
        let mut command = Command::new(&self.binary);
        if let Some(serial) = &self.serial {
            command.args(["-s", serial.as_str()]);
        }
        command.args(args);
        let rendered = format!("adb {}", args.join(" "));
        debug!(command = %rendered, "device shell");

        let output = command.output().map_err(|err| ShellError::CommandFailed {
            command: rendered.clone(),
            reason: err.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ShellError::CommandFailed {
                command: rendered,
                reason: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn detect_adb(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }
    if let Ok(raw) = env::var("WALLETFORGE_ADB") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    which("adb").ok()
}

impl DeviceShell for AdbShell {
    fn clear_app_data(&self, package: &str) -> Result<(), ShellError> {
        let out = self.run(&["shell", "pm", "clear", package])?;
        // pm reports failure on stdout with a zero exit status
        if out.trim() != "Success" {
            return Err(ShellError::CommandFailed {
                command: format!("adb shell pm clear {package}"),
                reason: out.trim().to_string(),
            });
        }
        Ok(())
    }

    fn open_url(&self, url: &str) -> Result<(), ShellError> {
        let quoted = format!("'{}'", url.replace('\'', "'\\''"));
        self.run(&[
            "shell",
            "am",
            "start",
            "-a",
            "android.intent.action.VIEW",
            "-d",
            quoted.as_str(),
        ])
        .map(|_| ())
    }

    fn dump_ui_tree(&self) -> Result<String, ShellError> {
        let out = self.run(&["exec-out", "uiautomator", "dump", "/dev/tty"])?;
        let end = out.rfind("</hierarchy>").map(|i| i + "</hierarchy>".len());
        match (out.find("<?xml").or_else(|| out.find("<hierarchy")), end) {
            (Some(start), Some(end)) if start < end => Ok(out[start..end].to_string()),
            _ => Err(ShellError::CommandFailed {
                command: "adb exec-out uiautomator dump".to_string(),
                reason: "no hierarchy in output".to_string(),
            }),
        }
    }

    fn list_connected_devices(&self) -> Result<Vec<String>, ShellError> {
        let out = self.run(&["devices"])?;
        Ok(parse_devices(&out))
    }

    fn force_stop(&self, package: &str) -> Result<(), ShellError> {
        self.run(&["shell", "am", "force-stop", package]).map(|_| ())
    }
}

fn parse_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_ready_devices() {
        let out = "* daemon started successfully\nList of devices attached\nemulator-5554\tdevice\nR58M\tunauthorized\n\n";
        assert_eq!(parse_devices(out), vec!["emulator-5554".to_string()]);
    }

    #[test]
    fn missing_binary_is_a_command_failure() {
        let shell = AdbShell::new("/nonexistent/adb-binary", None);
        let err = shell.list_connected_devices().unwrap_err();
        assert!(err.is_retryable());
    }
}
