//! Create-wallet wizard: passcode setup through to the wallet home screen.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use walletforge_core_types::UnitId;

use crate::accounts::{AccountGenerator, AccountSeed};
use crate::errors::UnitError;
use crate::workflows::{Step, UnitFields, UnitJob, UnitWorkflow, WorkflowContext};

/// OS and app permission dialogs can stack; dismiss at most this many.
const MAX_PERMISSION_PROMPTS: usize = 3;

pub struct WalletCreationFlow {
    accounts: Arc<dyn AccountGenerator>,
}

impl WalletCreationFlow {
    pub fn new(accounts: Arc<dyn AccountGenerator>) -> Self {
        Self { accounts }
    }

    async fn handle_permissions(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
    ) -> Result<(), UnitError> {
        ctx.enter(unit, Step::PermissionHandling);
        let mut dismissed = 0;
        while dismissed < MAX_PERMISSION_PROMPTS
            && ctx
                .click_if_present(unit, Step::PermissionHandling, &ctx.catalog.permission_allow)
                .await?
        {
            dismissed += 1;
        }
        if dismissed > 0 {
            info!(unit_id = %unit, dismissed, "Permission prompts accepted");
        }
        Ok(())
    }

    async fn submit_primary_action(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
    ) -> Result<(), UnitError> {
        let step = Step::PrimaryActionSubmitted;
        ctx.enter(unit, step);
        ctx.click(unit, step, &ctx.catalog.create_wallet).await?;
        if ctx.click_if_present(unit, step, &ctx.catalog.accept_terms).await? {
            ctx.click_if_present(unit, step, &ctx.catalog.continue_button)
                .await?;
        }
        Ok(())
    }

    async fn enter_secret(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
        seed: &AccountSeed,
    ) -> Result<(), UnitError> {
        ctx.enter(unit, Step::SecretEntry);
        ctx.type_into(unit, Step::SecretEntry, &ctx.catalog.passcode_input, &seed.secret_code)
            .await?;

        ctx.enter(unit, Step::SecretConfirmation);
        ctx.require(unit, Step::SecretConfirmation, &ctx.catalog.passcode_confirm_prompt)
            .await?;
        ctx.type_into(
            unit,
            Step::SecretConfirmation,
            &ctx.catalog.passcode_input,
            &seed.secret_code,
        )
        .await
    }

    /// Poll the home screen marker. A timeout only degrades the read that follows.
    async fn await_completion(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
    ) -> Result<bool, UnitError> {
        ctx.enter(unit, Step::AwaitingCompletion);
        let reached = ctx
            .optional(&ctx.catalog.wallet_home, ctx.timing.completion_timeout())
            .await?
            .is_some();
        if !reached {
            warn!(
                unit_id = %unit,
                timeout_ms = ctx.timing.completion_timeout_ms,
                "Completion marker not seen, reading whatever is shown"
            );
        }
        Ok(reached)
    }

    /// Rename to the generated name when the app offers it, else read the shown name.
    async fn settle_name(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
        seed: &AccountSeed,
    ) -> Result<String, UnitError> {
        let step = Step::ReadResult;
        if ctx.click_if_present(unit, step, &ctx.catalog.rename_entry).await? {
            ctx.type_into(unit, step, &ctx.catalog.rename_input, &seed.display_name)
                .await?;
            ctx.click(unit, step, &ctx.catalog.rename_save).await?;
            return Ok(seed.display_name.clone());
        }
        Ok(ctx
            .read_text(&ctx.catalog.wallet_name_label, ctx.prompt_timeout())
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl UnitWorkflow for WalletCreationFlow {
    fn name(&self) -> &'static str {
        "wallet-creation"
    }

    async fn run(&self, ctx: &WorkflowContext<'_>, job: &UnitJob) -> Result<UnitFields, UnitError> {
        let unit = job.id();
        let seed = self.accounts.generate(unit);

        ctx.enter(unit, Step::Start);
        ctx.session.launch_app().await?;
        ctx.pacing.between_actions().await;

        self.handle_permissions(ctx, unit).await?;
        self.submit_primary_action(ctx, unit).await?;
        self.enter_secret(ctx, unit, &seed).await?;
        // a second permission round is common right after setup (notifications)
        self.handle_permissions(ctx, unit).await?;
        self.await_completion(ctx, unit).await?;

        ctx.enter(unit, Step::ReadResult);
        let address = ctx
            .read_text(&ctx.catalog.address_label, ctx.timing.element_timeout())
            .await?
            .unwrap_or_default();
        let name = self.settle_name(ctx, unit, &seed).await?;

        let fields = UnitFields {
            name,
            address,
            secret_code: seed.secret_code,
        }
        .ensure_complete()?;
        info!(unit_id = %unit, name = %fields.name, address = %fields.address, "Wallet created");
        Ok(fields)
    }

    async fn recover(&self, ctx: &WorkflowContext<'_>) -> Result<(), UnitError> {
        ctx.restart_app(true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::FixedAccountGenerator;
    use crate::workflows::testing::Harness;
    use device_adapter::{MockEffect, SurfaceId};
    use walletforge_ledger::UnitRecord;

    fn flow() -> WalletCreationFlow {
        WalletCreationFlow::new(Arc::new(FixedAccountGenerator(AccountSeed {
            display_name: "Wallet".into(),
            secret_code: "482913".into(),
        })))
    }

    fn scripted_wizard(h: &Harness) {
        let native = SurfaceId::native();
        let cat = &h.catalog;
        h.show(&native, &cat.create_wallet, "Create a new wallet");
        h.show(&native, &cat.passcode_input, "");
        h.show(&native, &cat.passcode_confirm_prompt, "Confirm passcode");
        let first = &cat.create_wallet.candidates()[0];
        let home = &cat.wallet_home.candidates()[0];
        let address = &cat.address_label.candidates()[0];
        let name = &cat.wallet_name_label.candidates()[0];
        h.mock.on_click(
            first.strategy,
            &first.selector,
            vec![
                MockEffect::Show {
                    surface: native.clone(),
                    strategy: home.strategy,
                    selector: home.selector.clone(),
                    text: "Receive".into(),
                },
                MockEffect::Show {
                    surface: native.clone(),
                    strategy: address.strategy,
                    selector: address.selector.clone(),
                    text: " 0x9f2c41aa ".into(),
                },
                MockEffect::Show {
                    surface: native,
                    strategy: name.strategy,
                    selector: name.selector.clone(),
                    text: "Main wallet".into(),
                },
            ],
        );
    }

    #[tokio::test]
    async fn happy_path_reads_address_and_name() {
        let h = Harness::new();
        scripted_wizard(&h);

        let job = UnitJob::new(UnitRecord::pending(UnitId(5)));
        let fields = flow().run(&h.ctx(), &job).await.unwrap();

        assert_eq!(fields.address, "0x9f2c41aa");
        assert_eq!(fields.name, "Main wallet");
        assert_eq!(fields.secret_code, "482913");
        let passcode = &h.catalog.passcode_input.candidates()[0];
        assert_eq!(
            h.mock.typed_into(passcode.strategy, &passcode.selector),
            vec!["482913".to_string(), "482913".to_string()]
        );
        assert!(h.clicked(&h.catalog.create_wallet));
        h.session.close().await;
    }

    #[tokio::test]
    async fn rename_uses_generated_display_name() {
        let h = Harness::new();
        scripted_wizard(&h);
        let native = SurfaceId::native();
        h.show(&native, &h.catalog.rename_entry, "Edit name");
        h.show(&native, &h.catalog.rename_input, "");
        h.show(&native, &h.catalog.rename_save, "Save");

        let job = UnitJob::new(UnitRecord::pending(UnitId(7)));
        let fields = flow().run(&h.ctx(), &job).await.unwrap();

        assert_eq!(fields.name, "Wallet 7");
        let input = &h.catalog.rename_input.candidates()[0];
        assert_eq!(
            h.mock.typed_into(input.strategy, &input.selector),
            vec!["Wallet 7".to_string()]
        );
        assert!(h.clicked(&h.catalog.rename_save));
        h.session.close().await;
    }

    #[tokio::test]
    async fn missing_create_button_is_step_not_found_with_diagnostics() {
        let h = Harness::new();
        let job = UnitJob::new(UnitRecord::pending(UnitId(2)));
        let err = flow().run(&h.ctx(), &job).await.unwrap_err();

        match err {
            UnitError::StepNotFound {
                step,
                target,
                diagnostic,
            } => {
                assert_eq!(step, Step::PrimaryActionSubmitted);
                assert_eq!(target, "create_wallet");
                let dir = diagnostic.expect("diagnostic path");
                assert!(dir.join("screenshot.png").exists());
                assert!(dir.starts_with(h.diagnostics.root().join("unit-2")));
            }
            other => panic!("unexpected error: {other}"),
        }
        h.session.close().await;
    }

    #[tokio::test]
    async fn completion_timeout_still_reads_partial_result() {
        let h = Harness::new();
        let native = SurfaceId::native();
        let cat = &h.catalog;
        h.show(&native, &cat.create_wallet, "Create a new wallet");
        h.show(&native, &cat.passcode_input, "");
        h.show(&native, &cat.passcode_confirm_prompt, "Confirm passcode");
        // no home marker ever appears, but the address and name are on screen
        h.show(&native, &cat.address_label, "0xabc");
        h.show(&native, &cat.wallet_name_label, "Wallet A");

        let job = UnitJob::new(UnitRecord::pending(UnitId(9)));
        let fields = flow().run(&h.ctx(), &job).await.unwrap();
        assert_eq!(fields.address, "0xabc");
        h.session.close().await;
    }

    #[tokio::test]
    async fn empty_address_is_incomplete() {
        let h = Harness::new();
        let native = SurfaceId::native();
        let cat = &h.catalog;
        h.show(&native, &cat.create_wallet, "Create a new wallet");
        h.show(&native, &cat.passcode_input, "");
        h.show(&native, &cat.passcode_confirm_prompt, "Confirm passcode");
        h.show(&native, &cat.wallet_home, "Receive");
        h.show(&native, &cat.wallet_name_label, "Wallet A");

        let job = UnitJob::new(UnitRecord::pending(UnitId(1)));
        let err = flow().run(&h.ctx(), &job).await.unwrap_err();
        assert!(matches!(err, UnitError::IncompleteResult { field: "address" }));
        h.session.close().await;
    }

    #[tokio::test]
    async fn recovery_clears_data_and_relaunches() {
        let h = Harness::new();
        flow().recover(&h.ctx()).await.unwrap();
        assert_eq!(
            h.shell.commands(),
            vec![
                "am force-stop com.example.wallet".to_string(),
                "pm clear com.example.wallet".to_string()
            ]
        );
        assert!(h.mock.calls().contains(&device_adapter::MockCall::TerminateApp));
        assert!(h.mock.calls().contains(&device_adapter::MockCall::ActivateApp));
        h.session.close().await;
    }
}
