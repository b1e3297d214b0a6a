//! WalletForge device adapter.
//!
//! Owns the connection to one automated device/app instance. The element-level
//! protocol is abstracted behind [`DeviceDriver`]; [`AppiumDriver`] speaks the
//! W3C WebDriver wire protocol with Appium extensions and [`MockDevice`] is a
//! scriptable in-memory stand-in used by tests across the workspace.

pub mod appium;
pub mod driver;
pub mod mock;
pub mod session;
pub mod shell;

pub use appium::AppiumDriver;
pub use config::SessionConfig;
pub use driver::{text_xpath, DeviceDriver, ElementRef, Interaction};
pub use error::{DeviceError, ShellError};
pub use mock::{MockCall, MockDevice, MockEffect, MockShell};
pub use session::{AppIdentity, DeviceSession};
pub use shell::{AdbShell, DeviceShell};
pub use walletforge_core_types::{LocatorStrategy, SurfaceId, SurfaceKind};

pub mod error {
    use thiserror::Error;

    /// Failures raised while talking to the automation endpoint.
    #[derive(Debug, Error, Clone)]
    pub enum DeviceError {
        /// Connection or session-level failure; the session should be considered dead.
        #[error("session error: {0}")]
        Session(String),

        /// The element went stale or could not be interacted with.
        #[error("interaction failed: {0}")]
        Interaction(String),

        /// Lookup found nothing. Lookups convert this into `Ok(None)`.
        #[error("no such element: {0}")]
        NoSuchElement(String),

        /// Any other protocol-level error reported by the endpoint.
        #[error("protocol error: {0}")]
        Protocol(String),

        /// The session was already closed by its owner.
        #[error("session already closed")]
        Closed,
    }

    impl DeviceError {
        pub fn is_retryable(&self) -> bool {
            matches!(
                self,
                DeviceError::Interaction(_)
                    | DeviceError::NoSuchElement(_)
                    | DeviceError::Protocol(_)
            )
        }

        /// True when the failure means the session itself is unusable.
        pub fn is_session_fatal(&self) -> bool {
            matches!(self, DeviceError::Session(_) | DeviceError::Closed)
        }
    }

    /// Failures of the device shell (adb) capability. Always retryable.
    #[derive(Debug, Error, Clone)]
    pub enum ShellError {
        #[error("shell command `{command}` failed: {reason}")]
        CommandFailed { command: String, reason: String },

        #[error("shell binary not found: {0}")]
        BinaryNotFound(String),
    }

    impl ShellError {
        pub fn is_retryable(&self) -> bool {
            matches!(self, ShellError::CommandFailed { .. })
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Map, Value};

    /// Everything needed to negotiate one automation session.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct SessionConfig {
        pub endpoint: String,
        pub platform_name: String,
        pub automation_name: String,
        pub udid: Option<String>,
        pub app_package: String,
        pub app_activity: Option<String>,
        pub no_reset: bool,
        pub new_command_timeout_secs: u64,
        pub request_timeout_ms: u64,
        #[serde(default)]
        pub extra_capabilities: Map<String, Value>,
    }

    impl Default for SessionConfig {
        fn default() -> Self {
            Self {
                endpoint: "http://127.0.0.1:4723".to_string(),
                platform_name: "Android".to_string(),
                automation_name: "UiAutomator2".to_string(),
                udid: None,
                app_package: String::new(),
                app_activity: None,
                no_reset: true,
                new_command_timeout_secs: 300,
                request_timeout_ms: 60_000,
                extra_capabilities: Map::new(),
            }
        }
    }

    impl SessionConfig {
        /// W3C `capabilities` payload with Appium vendor prefixes.
        pub fn capabilities(&self) -> Value {
            let mut always = Map::new();
            always.insert("platformName".into(), json!(self.platform_name));
            always.insert("appium:automationName".into(), json!(self.automation_name));
            always.insert("appium:noReset".into(), json!(self.no_reset));
            always.insert(
                "appium:newCommandTimeout".into(),
                json!(self.new_command_timeout_secs),
            );
            if let Some(udid) = &self.udid {
                always.insert("appium:udid".into(), json!(udid));
            }
            if !self.app_package.is_empty() {
                always.insert("appium:appPackage".into(), json!(self.app_package));
            }
            if let Some(activity) = &self.app_activity {
                always.insert("appium:appActivity".into(), json!(activity));
            }
            for (key, value) in &self.extra_capabilities {
                always.insert(key.clone(), value.clone());
            }
            json!({ "capabilities": { "alwaysMatch": Value::Object(always), "firstMatch": [{}] } })
        }
    }

}
