use std::time::Duration;

use action_locator::SelectorResolver;
use device_adapter::{DeviceSession, SurfaceId};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use walletforge_core_types::SurfaceState;

use crate::errors::PerceiverError;
use crate::heuristic::HeuristicTextClassifier;
use crate::signals::SurfaceSignals;

/// Which detection path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Element probes on the embedded surface.
    Structural,
    /// Keyword search over native page text.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state: SurfaceState,
    pub confidence: Confidence,
    /// Embedded surface that was probed, if any.
    pub surface: Option<SurfaceId>,
}

pub struct StateClassifier {
    signals: SurfaceSignals,
    heuristic: HeuristicTextClassifier,
}

impl StateClassifier {
    pub fn new(signals: SurfaceSignals, heuristic: HeuristicTextClassifier) -> Self {
        Self { signals, heuristic }
    }

    pub fn signals(&self) -> &SurfaceSignals {
        &self.signals
    }

    /// One observation of the current screen. The session is back on the
    /// native surface when this returns, whatever the outcome.
    pub async fn classify(
        &self,
        session: &DeviceSession,
    ) -> Result<Classification, PerceiverError> {
        if let Some(surface) = session.embedded_surface().await? {
            match session.switch_surface(&surface).await {
                Ok(()) => {
                    let probed = self.probe_structural(session).await;
                    let restored = session.switch_to_native().await;
                    let state = probed?;
                    restored?;
                    debug!(%surface, state = state.as_str(), "Structural classification");
                    return Ok(Classification {
                        state,
                        confidence: Confidence::Structural,
                        surface: Some(surface),
                    });
                }
                Err(err) if err.is_session_fatal() => return Err(err.into()),
                Err(err) => {
                    // the surface detached between listing and switching
                    warn!(
                        %surface,
                        error = %err,
                        "Embedded surface unavailable, using text heuristic"
                    );
                    session.switch_to_native().await?;
                }
            }
        }
        self.classify_heuristic(session).await
    }

    async fn probe_structural(
        &self,
        session: &DeviceSession,
    ) -> Result<SurfaceState, PerceiverError> {
        let resolver = SelectorResolver::new(session);
        for (state, probe) in self.signals.ordered() {
            if resolver.exists(probe).await? {
                return Ok(state);
            }
        }
        Ok(SurfaceState::Unknown)
    }

    async fn classify_heuristic(
        &self,
        session: &DeviceSession,
    ) -> Result<Classification, PerceiverError> {
        let source = session.page_source().await?;
        let state = self.heuristic.classify_text(&source);
        debug!(state = state.as_str(), "Heuristic classification");
        Ok(Classification {
            state,
            confidence: Confidence::Heuristic,
            surface: None,
        })
    }

    /// Re-classify while the screen reports `loading`, up to `timeout`.
    /// Returns the last observation, which may still be `loading`.
    pub async fn classify_until_settled(
        &self,
        session: &DeviceSession,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Classification, PerceiverError> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let observed = self.classify(session).await?;
            let now = Instant::now();
            if observed.state != SurfaceState::Loading || deadline.is_some_and(|d| now >= d) {
                return Ok(observed);
            }
            sleep(deadline.map_or(poll, |d| poll.min(d - now))).await;
        }
    }
}

/// Poll the surface list until an embedded surface appears or `timeout` elapses.
pub async fn wait_for_embedded(
    session: &DeviceSession,
    timeout: Duration,
    poll: Duration,
) -> Result<Option<SurfaceId>, PerceiverError> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(surface) = session.embedded_surface().await? {
            return Ok(Some(surface));
        }
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            return Ok(None);
        }
        sleep(deadline.map_or(poll, |d| poll.min(d - now))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::{LocatorCandidate, LocatorList};
    use device_adapter::{AppIdentity, MockDevice};
    use std::sync::Arc;
    use walletforge_core_types::LocatorStrategy;

    const WEBVIEW: &str = "WEBVIEW_com.example.wallet";

    fn signals() -> SurfaceSignals {
        let css = |target: &str, selector: &str| {
            LocatorList::new(target, vec![LocatorCandidate::css(selector)])
        };
        SurfaceSignals {
            loading: css("loading", ".spinner"),
            completion: css("completion", ".claimed"),
            error: css("error", ".error"),
            input_required: css("input_required", "form.signup"),
            action_available: css("action", "button.claim"),
        }
    }

    fn setup() -> (Arc<MockDevice>, DeviceSession, StateClassifier) {
        let mock = Arc::new(MockDevice::new());
        let session = DeviceSession::from_driver(mock.clone(), AppIdentity::default());
        let classifier = StateClassifier::new(signals(), HeuristicTextClassifier::default());
        (mock, session, classifier)
    }

    fn show(mock: &MockDevice, selector: &str) {
        mock.add_element(&SurfaceId::new(WEBVIEW), LocatorStrategy::Css, selector, "");
    }

    #[tokio::test]
    async fn loading_wins_over_available_action() {
        let (mock, session, classifier) = setup();
        mock.attach_surface(SurfaceId::new(WEBVIEW));
        show(&mock, ".spinner");
        show(&mock, "button.claim");

        let result = classifier.classify(&session).await.unwrap();
        assert_eq!(result.state, SurfaceState::Loading);
        assert_eq!(result.confidence, Confidence::Structural);
        assert_eq!(mock.active_surface(), SurfaceId::native());
        session.close().await;
    }

    #[tokio::test]
    async fn completion_wins_over_available_action() {
        let (mock, session, classifier) = setup();
        mock.attach_surface(SurfaceId::new(WEBVIEW));
        show(&mock, "button.claim");
        show(&mock, ".claimed");

        let result = classifier.classify(&session).await.unwrap();
        assert_eq!(result.state, SurfaceState::AlreadyDone);
        session.close().await;
    }

    #[tokio::test]
    async fn unknown_embedded_surface_still_returns_to_native() {
        let (mock, session, classifier) = setup();
        mock.attach_surface(SurfaceId::new(WEBVIEW));

        let result = classifier.classify(&session).await.unwrap();
        assert_eq!(result.state, SurfaceState::Unknown);
        assert_eq!(result.surface, Some(SurfaceId::new(WEBVIEW)));
        assert_eq!(mock.active_surface(), SurfaceId::native());
        session.close().await;
    }

    #[tokio::test]
    async fn native_only_uses_text_heuristic() {
        let (mock, session, classifier) = setup();
        mock.set_source(
            &SurfaceId::native(),
            "<node text=\"Claim\"/><node text=\"Please wait\"/>",
        );

        let result = classifier.classify(&session).await.unwrap();
        assert_eq!(result.state, SurfaceState::Loading);
        assert_eq!(result.confidence, Confidence::Heuristic);
        session.close().await;
    }

    #[tokio::test]
    async fn settles_once_loading_disappears() {
        let (mock, session, classifier) = setup();
        mock.attach_surface(SurfaceId::new(WEBVIEW));
        show(&mock, ".spinner");
        show(&mock, "button.claim");

        let later = mock.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            later.remove_element(&SurfaceId::new(WEBVIEW), LocatorStrategy::Css, ".spinner");
        });

        let result = classifier
            .classify_until_settled(&session, Duration::from_secs(2), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(result.state, SurfaceState::ActionAvailable);
        session.close().await;
    }

    #[tokio::test]
    async fn settle_timeout_returns_last_loading_observation() {
        let (mock, session, classifier) = setup();
        mock.attach_surface(SurfaceId::new(WEBVIEW));
        show(&mock, ".spinner");

        let result = classifier
            .classify_until_settled(&session, Duration::from_millis(30), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(result.state, SurfaceState::Loading);
        session.close().await;
    }

    #[tokio::test]
    async fn waits_for_embedded_surface() {
        let (mock, session, _) = setup();
        let later = mock.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            later.attach_surface(SurfaceId::new(WEBVIEW));
        });
        let found = wait_for_embedded(&session, Duration::from_secs(2), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(found, Some(SurfaceId::new(WEBVIEW)));

        let missing = wait_for_embedded(
            &DeviceSession::from_driver(Arc::new(MockDevice::new()), AppIdentity::default()),
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(missing.is_none());
        session.close().await;
    }
}
