//! Locator lists for every UI target the workflows touch.
//!
//! The built-in candidates are best guesses for a typical wallet app; a YAML
//! file mapping target names to candidate lists replaces them per target.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use action_locator::{LocatorCandidate as C, LocatorList};
use serde::{Deserialize, Serialize};
use surface_perceiver::SurfaceSignals;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read locator file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse locator file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown locator target '{0}'")]
    UnknownTarget(String),

    #[error("locator target '{0}' has no candidates")]
    Empty(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorCatalog {
    // shared
    pub permission_allow: LocatorList,
    pub passcode_input: LocatorList,
    pub wallet_home: LocatorList,
    pub address_label: LocatorList,

    // wallet creation
    pub create_wallet: LocatorList,
    pub accept_terms: LocatorList,
    pub continue_button: LocatorList,
    pub passcode_confirm_prompt: LocatorList,
    pub wallet_name_label: LocatorList,
    pub rename_entry: LocatorList,
    pub rename_input: LocatorList,
    pub rename_save: LocatorList,

    // claim
    pub unlock_prompt: LocatorList,
    pub account_switcher: LocatorList,
    pub account_entry: LocatorList,
    pub transaction_confirm: LocatorList,
    pub signals: SurfaceSignals,
}

fn list(target: &str, candidates: Vec<C>) -> LocatorList {
    LocatorList::new(target, candidates)
}

impl Default for LocatorCatalog {
    fn default() -> Self {
        Self {
            permission_allow: list(
                "permission_allow",
                vec![
                    C::id("com.android.permissioncontroller:id/permission_allow_button"),
                    C::id("com.android.permissioncontroller:id/permission_allow_foreground_only_button"),
                    C::id("com.android.packageinstaller:id/permission_allow_button"),
                    C::text("Allow"),
                    C::text("While using the app"),
                ],
            ),
            passcode_input: list(
                "passcode_input",
                vec![
                    C::accessibility_id("passcode_input"),
                    C::xpath("//android.widget.EditText[@password='true']"),
                    C::class_name("android.widget.EditText"),
                ],
            ),
            wallet_home: list(
                "wallet_home",
                vec![
                    C::accessibility_id("wallet_home"),
                    C::text("Receive"),
                    C::uiautomator("new UiSelector().textMatches(\"(?i)^(send|receive)$\")"),
                ],
            ),
            address_label: list(
                "address_label",
                vec![
                    C::accessibility_id("wallet_address"),
                    C::xpath("//*[starts-with(@text,'0x')]"),
                    C::uiautomator("new UiSelector().textStartsWith(\"0x\")"),
                ],
            ),
            create_wallet: list(
                "create_wallet",
                vec![
                    C::accessibility_id("create_wallet"),
                    C::text("Create a new wallet"),
                    C::text("Create Wallet"),
                    C::uiautomator("new UiSelector().textMatches(\"(?i)create.*wallet\")"),
                ],
            ),
            accept_terms: list(
                "accept_terms",
                vec![
                    C::accessibility_id("accept_terms"),
                    C::text("I agree"),
                    C::xpath("//android.widget.CheckBox"),
                ],
            ),
            continue_button: list(
                "continue_button",
                vec![
                    C::accessibility_id("continue"),
                    C::text("Continue"),
                    C::text("Next"),
                ],
            ),
            passcode_confirm_prompt: list(
                "passcode_confirm_prompt",
                vec![
                    C::accessibility_id("confirm_passcode"),
                    C::text("Confirm passcode"),
                    C::uiautomator("new UiSelector().textMatches(\"(?i).*(confirm|re-?enter).*\")"),
                ],
            ),
            wallet_name_label: list(
                "wallet_name_label",
                vec![
                    C::accessibility_id("wallet_name"),
                    C::xpath("//*[contains(@resource-id,'wallet_name')]"),
                ],
            ),
            rename_entry: list(
                "rename_entry",
                vec![C::accessibility_id("edit_wallet_name"), C::text("Edit name")],
            ),
            rename_input: list(
                "rename_input",
                vec![
                    C::accessibility_id("wallet_name_input"),
                    C::class_name("android.widget.EditText"),
                ],
            ),
            rename_save: list(
                "rename_save",
                vec![C::accessibility_id("save"), C::text("Save"), C::text("Done")],
            ),
            unlock_prompt: list(
                "unlock_prompt",
                vec![
                    C::accessibility_id("unlock"),
                    C::text("Enter passcode"),
                    C::uiautomator("new UiSelector().textMatches(\"(?i).*(unlock|enter passcode).*\")"),
                ],
            ),
            account_switcher: list(
                "account_switcher",
                vec![
                    C::accessibility_id("wallet_switcher"),
                    C::xpath("//*[contains(@resource-id,'wallet_switch')]"),
                ],
            ),
            account_entry: list(
                "account_entry",
                vec![C::xpath("//*[contains(@resource-id,'wallet_item')]")],
            ),
            transaction_confirm: list(
                "transaction_confirm",
                vec![
                    C::accessibility_id("confirm_transaction"),
                    C::text("Confirm"),
                    C::text("Approve"),
                    C::text("Sign"),
                ],
            ),
            signals: SurfaceSignals {
                loading: list(
                    "claim_loading",
                    vec![C::css(".loading, .spinner, [aria-busy='true']"), C::text("Loading")],
                ),
                completion: list(
                    "claim_completed",
                    vec![C::css(".claimed, [data-state='claimed']"), C::text("Claimed")],
                ),
                error: list(
                    "claim_error",
                    vec![C::css(".error, [role='alert']"), C::text("Something went wrong")],
                ),
                input_required: list(
                    "claim_input_required",
                    vec![
                        C::css("input[type='email'], input[type='tel'], form[action*='signup']"),
                        C::text("Sign up"),
                    ],
                ),
                action_available: list(
                    "claim_action",
                    vec![
                        C::css("button.claim, [data-action='claim']"),
                        C::text("Claim"),
                    ],
                ),
            },
        }
    }
}

impl LocatorCatalog {
    /// Built-in catalog with overrides from `path` applied.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let path_str = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path_str.clone(),
            source,
        })?;
        let overrides: BTreeMap<String, Vec<C>> =
            serde_yaml::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path_str.clone(),
                source,
            })?;
        let mut catalog = Self::default();
        let applied = catalog.apply_overrides(overrides)?;
        info!(path = %path_str, applied, "Loaded locator overrides");
        Ok(catalog)
    }

    /// Replace the candidates of each named target. Unknown names are an error.
    pub fn apply_overrides(
        &mut self,
        overrides: BTreeMap<String, Vec<C>>,
    ) -> Result<usize, CatalogError> {
        let mut applied = 0;
        for (target, candidates) in overrides {
            if candidates.is_empty() {
                return Err(CatalogError::Empty(target));
            }
            let slot = self
                .lists_mut()
                .into_iter()
                .find(|list| list.target() == target)
                .ok_or_else(|| CatalogError::UnknownTarget(target.clone()))?;
            *slot = LocatorList::new(target, candidates);
            applied += 1;
        }
        Ok(applied)
    }

    /// Account row for `name`, exact text first.
    pub fn account_entry_for(&self, name: &str) -> LocatorList {
        self.account_entry.with_leading(vec![C::text(name)])
    }

    fn lists_mut(&mut self) -> Vec<&mut LocatorList> {
        vec![
            &mut self.permission_allow,
            &mut self.passcode_input,
            &mut self.wallet_home,
            &mut self.address_label,
            &mut self.create_wallet,
            &mut self.accept_terms,
            &mut self.continue_button,
            &mut self.passcode_confirm_prompt,
            &mut self.wallet_name_label,
            &mut self.rename_entry,
            &mut self.rename_input,
            &mut self.rename_save,
            &mut self.unlock_prompt,
            &mut self.account_switcher,
            &mut self.account_entry,
            &mut self.transaction_confirm,
            &mut self.signals.loading,
            &mut self.signals.completion,
            &mut self.signals.error,
            &mut self.signals.input_required,
            &mut self.signals.action_available,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use walletforge_core_types::LocatorStrategy;

    #[test]
    fn overrides_replace_named_targets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "create_wallet:\n  - strategy: id\n    selector: com.example:id/create\nclaim_action:\n  - strategy: css\n    selector: '#claim'"
        )
        .unwrap();

        let catalog = LocatorCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.create_wallet.len(), 1);
        assert_eq!(catalog.create_wallet.candidates()[0].strategy, LocatorStrategy::Id);
        assert_eq!(catalog.signals.action_available.candidates()[0].selector, "#claim");
        assert_eq!(catalog.wallet_home, LocatorCatalog::default().wallet_home);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut catalog = LocatorCatalog::default();
        let mut overrides = BTreeMap::new();
        overrides.insert("create_walet".to_string(), vec![C::text("Create")]);
        assert!(matches!(
            catalog.apply_overrides(overrides),
            Err(CatalogError::UnknownTarget(_))
        ));
    }

    #[test]
    fn account_entry_prefers_exact_name() {
        let list = LocatorCatalog::default().account_entry_for("Wallet 3");
        assert_eq!(list.candidates()[0], C::text("Wallet 3"));
        assert_eq!(list.target(), "account_entry");
    }
}
