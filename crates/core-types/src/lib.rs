use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a tag from a persisted table or CLI flag is not recognised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseTagError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseTagError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Stable identifier of one unit of work inside a ledger.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UnitId(pub u32);

impl UnitId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle tag of a unit record.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum UnitStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Skipped,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 4] = [
        UnitStatus::Pending,
        UnitStatus::Success,
        UnitStatus::Failed,
        UnitStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Success => "success",
            UnitStatus::Failed => "failed",
            UnitStatus::Skipped => "skipped",
        }
    }

    /// Terminal statuses are never picked up again unless the ledger is reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Success | UnitStatus::Skipped)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "" => Ok(UnitStatus::Pending),
            "success" => Ok(UnitStatus::Success),
            "failed" => Ok(UnitStatus::Failed),
            "skipped" => Ok(UnitStatus::Skipped),
            _ => Err(ParseTagError::new("unit status", s)),
        }
    }
}

/// Which UI layer a surface belongs to.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SurfaceKind {
    Native,
    Embedded,
}

/// Name of one automation context, e.g. `NATIVE_APP` or `WEBVIEW_com.example.app`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub const NATIVE: &'static str = "NATIVE_APP";

    pub fn native() -> Self {
        Self(Self::NATIVE.to_string())
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn kind(&self) -> SurfaceKind {
        if self.0.starts_with("WEBVIEW") || self.0.starts_with("CHROMIUM") {
            SurfaceKind::Embedded
        } else {
            SurfaceKind::Native
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.kind() == SurfaceKind::Embedded
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element lookup strategy understood by the automation endpoint.
///
/// `Text` is not a wire strategy; the driver rewrites it into an XPath that
/// matches visible text for the active surface.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "kebab-case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LocatorStrategy {
    Id,
    AccessibilityId,
    #[cfg_attr(feature = "serde-full", serde(rename = "xpath"))]
    XPath,
    #[cfg_attr(feature = "serde-full", serde(rename = "uiautomator"))]
    UiAutomator,
    ClassName,
    Css,
    Text,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::AccessibilityId => "accessibility-id",
            LocatorStrategy::XPath => "xpath",
            LocatorStrategy::UiAutomator => "uiautomator",
            LocatorStrategy::ClassName => "class-name",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Text => "text",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic state of whatever the device is currently showing.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "kebab-case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SurfaceState {
    Loading,
    InputRequired,
    ActionAvailable,
    AlreadyDone,
    Error,
    Unknown,
}

impl SurfaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceState::Loading => "loading",
            SurfaceState::InputRequired => "input-required",
            SurfaceState::ActionAvailable => "action-available",
            SurfaceState::AlreadyDone => "already-done",
            SurfaceState::Error => "error",
            SurfaceState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
