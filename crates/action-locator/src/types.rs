//! Core types for locator system

use std::fmt;

use device_adapter::ElementRef;
use serde::{Deserialize, Serialize};
use walletforge_core_types::LocatorStrategy;

/// One way to find a logical UI target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub strategy: LocatorStrategy,
    pub selector: String,
}

impl LocatorCandidate {
    pub fn new(strategy: LocatorStrategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Id, selector)
    }

    pub fn accessibility_id(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::AccessibilityId, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::XPath, selector)
    }

    pub fn uiautomator(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::UiAutomator, selector)
    }

    pub fn class_name(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::ClassName, selector)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Css, selector)
    }

    pub fn text(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Text, selector)
    }
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy.name(), self.selector)
    }
}

/// Ordered candidates for one logical target, tried first to last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorList {
    target: String,
    candidates: Vec<LocatorCandidate>,
}

impl LocatorList {
    pub fn new(target: impl Into<String>, candidates: Vec<LocatorCandidate>) -> Self {
        Self {
            target: target.into(),
            candidates,
        }
    }

    /// Name of the logical target, used in logs and failures.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn candidates(&self) -> &[LocatorCandidate] {
        &self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatorCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Same list with `extra` candidates prepended; used for values only known at run time
    /// such as an account name.
    pub fn with_leading(&self, extra: Vec<LocatorCandidate>) -> Self {
        let mut candidates = extra;
        candidates.extend(self.candidates.iter().cloned());
        Self {
            target: self.target.clone(),
            candidates,
        }
    }
}

/// Successful lookup of a [`LocatorList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub element: ElementRef,
    /// Position of the matching candidate in the list.
    pub index: usize,
    pub strategy: LocatorStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_deserialize_from_yaml() {
        let raw = r#"
target: create_wallet
candidates:
  - strategy: id
    selector: com.example:id/create
  - strategy: uiautomator
    selector: new UiSelector().textContains("Create")
  - strategy: text
    selector: Create a new wallet
"#;
        let list: LocatorList = serde_yaml::from_str(raw).unwrap();
        assert_eq!(list.target(), "create_wallet");
        assert_eq!(list.len(), 3);
        assert_eq!(list.candidates()[1].strategy, LocatorStrategy::UiAutomator);
        assert_eq!(list.candidates()[2].to_string(), "text=Create a new wallet");
    }

    #[test]
    fn leading_candidates_come_first() {
        let list = LocatorList::new("account", vec![LocatorCandidate::id("row")]);
        let extended = list.with_leading(vec![LocatorCandidate::text("Wallet 7")]);
        assert_eq!(extended.candidates()[0], LocatorCandidate::text("Wallet 7"));
        assert_eq!(extended.candidates()[1], LocatorCandidate::id("row"));
    }
}
