//! Claim flow: unlock the unit's account, open its link and act on the
//! embedded claim page according to what the page shows.

use async_trait::async_trait;
use surface_perceiver::{wait_for_embedded, Classification, SurfaceState};
use tracing::{info, warn};
use walletforge_core_types::UnitId;

use crate::errors::UnitError;
use crate::workflows::{Step, UnitFields, UnitJob, UnitWorkflow, WorkflowContext};

#[derive(Debug, Default)]
pub struct ClaimFlow;

impl ClaimFlow {
    pub fn new() -> Self {
        Self
    }

    async fn authenticate(
        &self,
        ctx: &WorkflowContext<'_>,
        job: &UnitJob,
    ) -> Result<(), UnitError> {
        let unit = job.id();
        let step = Step::Authentication;
        ctx.enter(unit, step);
        if ctx
            .optional(&ctx.catalog.unlock_prompt, ctx.prompt_timeout())
            .await?
            .is_some()
        {
            ctx.type_into(unit, step, &ctx.catalog.passcode_input, &job.record.secret_code)
                .await?;
            info!(unit_id = %unit, "Unlocked");
        }
        if ctx
            .click_if_present(unit, step, &ctx.catalog.account_switcher)
            .await?
        {
            let entry = ctx.catalog.account_entry_for(&job.record.name);
            ctx.click(unit, step, &entry).await?;
            info!(unit_id = %unit, account = %job.record.name, "Account selected");
        }
        Ok(())
    }

    async fn classify(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
        step: Step,
    ) -> Result<Classification, UnitError> {
        ctx.enter(unit, step);
        let observed = ctx
            .classifier
            .classify_until_settled(
                ctx.session,
                ctx.timing.completion_timeout(),
                ctx.timing.poll_interval(),
            )
            .await?;
        info!(
            unit_id = %unit,
            step = %step,
            state = %observed.state,
            confidence = ?observed.confidence,
            "Claim page classified"
        );
        Ok(observed)
    }

    async fn unexpected(
        &self,
        ctx: &WorkflowContext<'_>,
        unit: UnitId,
        step: Step,
        state: SurfaceState,
    ) -> UnitError {
        let diagnostic = ctx.capture(unit, step).await;
        if state == SurfaceState::Loading {
            return UnitError::Timeout {
                step,
                waiting_for: "claim page to finish loading".into(),
                diagnostic,
            };
        }
        UnitError::UnexpectedState {
            step,
            state,
            diagnostic,
        }
    }
}

#[async_trait]
impl UnitWorkflow for ClaimFlow {
    fn name(&self) -> &'static str {
        "claim"
    }

    async fn run(&self, ctx: &WorkflowContext<'_>, job: &UnitJob) -> Result<UnitFields, UnitError> {
        let unit = job.id();
        if !job.record.has_account() {
            return Err(UnitError::ManualInterventionRequired {
                reason: "record has no account name, address or secret code".into(),
                diagnostic: None,
            });
        }
        let Some(link) = job.link.as_deref() else {
            return Err(UnitError::ManualInterventionRequired {
                reason: "no link assigned to this unit".into(),
                diagnostic: None,
            });
        };

        ctx.enter(unit, Step::Start);
        ctx.session.relaunch_app().await?;
        ctx.pacing.between_actions().await;

        self.authenticate(ctx, job).await?;

        ctx.enter(unit, Step::OpenLink);
        ctx.shell.open_url(link)?;
        ctx.pacing.between_actions().await;

        ctx.enter(unit, Step::AwaitSurface);
        let surface = wait_for_embedded(
            ctx.session,
            ctx.timing.surface_timeout(),
            ctx.timing.poll_interval(),
        )
        .await?;
        if surface.is_none() {
            warn!(unit_id = %unit, "Embedded surface never attached");
            return Err(UnitError::Timeout {
                step: Step::AwaitSurface,
                waiting_for: "embedded claim surface".into(),
                diagnostic: ctx.capture(unit, Step::AwaitSurface).await,
            });
        }

        let observed = self.classify(ctx, unit, Step::Classify).await?;
        match observed.state {
            SurfaceState::AlreadyDone => {
                info!(unit_id = %unit, "Already claimed, nothing to do");
            }
            SurfaceState::ActionAvailable => {
                let Some(surface) = observed.surface.clone() else {
                    // heuristic text match only; there is no element to act on
                    return Err(self
                        .unexpected(ctx, unit, Step::PerformAction, observed.state)
                        .await);
                };
                ctx.enter(unit, Step::PerformAction);
                ctx.click_on_surface(
                    unit,
                    Step::PerformAction,
                    &surface,
                    &ctx.catalog.signals.action_available,
                )
                .await?;
                if ctx
                    .click_if_present(unit, Step::PerformAction, &ctx.catalog.transaction_confirm)
                    .await?
                {
                    info!(unit_id = %unit, "Transaction prompt confirmed");
                }

                let verified = self.classify(ctx, unit, Step::Verify).await?;
                if verified.state != SurfaceState::AlreadyDone {
                    warn!(unit_id = %unit, state = %verified.state, "Claim not confirmed");
                    return Err(self
                        .unexpected(ctx, unit, Step::Verify, verified.state)
                        .await);
                }
                info!(unit_id = %unit, "Claim confirmed");
            }
            SurfaceState::InputRequired => {
                let diagnostic = ctx.capture(unit, Step::Classify).await;
                return Err(UnitError::ManualInterventionRequired {
                    reason: "claim page asks for input".into(),
                    diagnostic,
                });
            }
            state => {
                return Err(self.unexpected(ctx, unit, Step::Classify, state).await);
            }
        }

        UnitFields {
            name: job.record.name.clone(),
            address: job.record.address.clone(),
            secret_code: job.record.secret_code.clone(),
        }
        .ensure_complete()
    }

    async fn recover(&self, ctx: &WorkflowContext<'_>) -> Result<(), UnitError> {
        ctx.restart_app(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testing::Harness;
    use device_adapter::{MockEffect, SurfaceId};
    use walletforge_ledger::UnitRecord;

    const LINK: &str = "https://claim.example.com/drop/1";

    fn web() -> SurfaceId {
        SurfaceId::new("WEBVIEW_com.example.wallet")
    }

    fn job(id: u32) -> UnitJob {
        UnitJob::new(UnitRecord::success(
            UnitId(id),
            format!("Wallet {id}"),
            "0xfeed",
            "135790",
        ))
        .with_link(LINK)
    }

    #[tokio::test]
    async fn already_done_succeeds_without_clicking() {
        let h = Harness::new();
        h.mock.attach_surface(web());
        h.show(&web(), &h.catalog.signals.completion, "Claimed");
        h.show(&web(), &h.catalog.signals.action_available, "Claim");

        let fields = ClaimFlow::new().run(&h.ctx(), &job(1)).await.unwrap();

        assert_eq!(fields.name, "Wallet 1");
        assert!(!h.clicked(&h.catalog.signals.action_available));
        assert_eq!(h.shell.commands(), vec![format!("open {LINK}")]);
        assert_eq!(h.mock.active_surface(), SurfaceId::native());
        h.session.close().await;
    }

    #[tokio::test]
    async fn available_action_is_clicked_confirmed_and_verified() {
        let h = Harness::new();
        h.mock.attach_surface(web());
        h.show(&web(), &h.catalog.signals.action_available, "Claim");
        h.show(&SurfaceId::native(), &h.catalog.transaction_confirm, "Confirm");
        let action = &h.catalog.signals.action_available.candidates()[0];
        let done = &h.catalog.signals.completion.candidates()[0];
        h.mock.on_click(
            action.strategy,
            &action.selector,
            vec![
                MockEffect::Hide {
                    surface: web(),
                    strategy: action.strategy,
                    selector: action.selector.clone(),
                },
                MockEffect::Show {
                    surface: web(),
                    strategy: done.strategy,
                    selector: done.selector.clone(),
                    text: "Claimed".into(),
                },
            ],
        );

        ClaimFlow::new().run(&h.ctx(), &job(2)).await.unwrap();

        assert!(h.clicked(&h.catalog.signals.action_available));
        assert!(h.clicked(&h.catalog.transaction_confirm));
        assert_eq!(h.mock.active_surface(), SurfaceId::native());
        h.session.close().await;
    }

    #[tokio::test]
    async fn unconfirmed_claim_fails_verification() {
        let h = Harness::new();
        h.mock.attach_surface(web());
        h.show(&web(), &h.catalog.signals.action_available, "Claim");

        let err = ClaimFlow::new().run(&h.ctx(), &job(3)).await.unwrap_err();
        assert!(matches!(
            err,
            UnitError::UnexpectedState {
                step: Step::Verify,
                state: SurfaceState::ActionAvailable,
                diagnostic: Some(_),
            }
        ));
        h.session.close().await;
    }

    #[tokio::test]
    async fn input_required_is_never_automated() {
        let h = Harness::new();
        h.mock.attach_surface(web());
        h.show(&web(), &h.catalog.signals.input_required, "Sign up");
        h.show(&web(), &h.catalog.signals.action_available, "Claim");

        let err = ClaimFlow::new().run(&h.ctx(), &job(4)).await.unwrap_err();
        assert!(matches!(
            err,
            UnitError::ManualInterventionRequired {
                diagnostic: Some(_),
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert!(!h.clicked(&h.catalog.signals.action_available));
        h.session.close().await;
    }

    #[tokio::test]
    async fn missing_surface_times_out() {
        let h = Harness::new();
        let err = ClaimFlow::new().run(&h.ctx(), &job(5)).await.unwrap_err();
        assert!(matches!(
            err,
            UnitError::Timeout {
                step: Step::AwaitSurface,
                ..
            }
        ));
        h.session.close().await;
    }

    #[tokio::test]
    async fn unlock_and_account_selection() {
        let h = Harness::new();
        let native = SurfaceId::native();
        h.show(&native, &h.catalog.unlock_prompt, "Enter passcode");
        h.show(&native, &h.catalog.passcode_input, "");
        h.show(&native, &h.catalog.account_switcher, "Wallet 1");
        h.mock.add_element(
            &native,
            walletforge_core_types::LocatorStrategy::Text,
            "Wallet 6",
            "Wallet 6",
        );
        h.mock.attach_surface(web());
        h.show(&web(), &h.catalog.signals.completion, "Claimed");

        ClaimFlow::new().run(&h.ctx(), &job(6)).await.unwrap();

        let passcode = &h.catalog.passcode_input.candidates()[0];
        assert_eq!(
            h.mock.typed_into(passcode.strategy, &passcode.selector),
            vec!["135790".to_string()]
        );
        assert!(h
            .mock
            .was_clicked(walletforge_core_types::LocatorStrategy::Text, "Wallet 6"));
        h.session.close().await;
    }

    #[tokio::test]
    async fn record_without_account_is_rejected() {
        let h = Harness::new();
        let job = UnitJob::new(UnitRecord::pending(UnitId(8))).with_link(LINK);
        let err = ClaimFlow::new().run(&h.ctx(), &job).await.unwrap_err();
        assert!(matches!(err, UnitError::ManualInterventionRequired { .. }));
        assert!(h.shell.commands().is_empty());
        h.session.close().await;
    }
}
