//! Element-level device protocol

use async_trait::async_trait;
use walletforge_core_types::{LocatorStrategy, SurfaceId, SurfaceKind};

use crate::error::DeviceError;

/// Opaque handle to an element found on the current surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementRef {
    /// Endpoint-assigned element id.
    pub id: String,
    /// Human readable `strategy=selector` used to find it, for logs.
    pub locator: String,
}

impl ElementRef {
    pub fn new(id: impl Into<String>, strategy: LocatorStrategy, selector: &str) -> Self {
        Self {
            id: id.into(),
            locator: format!("{}={}", strategy.name(), selector),
        }
    }
}

/// One interaction with an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Click,
    Type(String),
    Clear,
}

/// Low-level operations of an automation endpoint.
///
/// Lookups report "not present" as `Ok(None)`; errors are reserved for
/// transport and protocol failures.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn find_element(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Option<ElementRef>, DeviceError>;

    async fn click(&self, element: &ElementRef) -> Result<(), DeviceError>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DeviceError>;

    async fn clear(&self, element: &ElementRef) -> Result<(), DeviceError>;

    async fn element_text(&self, element: &ElementRef) -> Result<String, DeviceError>;

    /// Available automation contexts (native plus any attached web views).
    async fn contexts(&self) -> Result<Vec<SurfaceId>, DeviceError>;

    async fn current_context(&self) -> Result<SurfaceId, DeviceError>;

    async fn set_context(&self, surface: &SurfaceId) -> Result<(), DeviceError>;

    async fn page_source(&self) -> Result<String, DeviceError>;

    /// PNG bytes of the current screen.
    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError>;

    async fn activate_app(&self, app_id: &str) -> Result<(), DeviceError>;

    /// Returns whether the app was running.
    async fn terminate_app(&self, app_id: &str) -> Result<bool, DeviceError>;

    async fn clear_app(&self, app_id: &str) -> Result<(), DeviceError>;

    async fn start_activity(&self, app_id: &str, activity: &str) -> Result<(), DeviceError>;

    async fn delete_session(&self) -> Result<(), DeviceError>;
}

/// XPath matching visible text on the given surface kind.
pub fn text_xpath(text: &str, kind: SurfaceKind) -> String {
    let literal = xpath_literal(text);
    match kind {
        SurfaceKind::Native => format!(
            "//*[@text={literal} or @content-desc={literal} or contains(@text,{literal})]"
        ),
        SurfaceKind::Embedded => {
            format!("//*[normalize-space(text())={literal} or contains(normalize-space(.),{literal})][not(*[contains(normalize-space(.),{literal})])]")
        }
    }
}

fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_text_xpath_matches_text_and_description() {
        let xpath = text_xpath("Create wallet", SurfaceKind::Native);
        assert!(xpath.contains("@text='Create wallet'"));
        assert!(xpath.contains("@content-desc='Create wallet'"));
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("it's \"x\""),
            "concat('it', \"'\", 's \"x\"')"
        );
    }
}
