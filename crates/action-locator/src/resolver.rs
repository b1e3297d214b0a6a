//! Element resolver with fallback chain orchestration

use std::time::Duration;

use device_adapter::DeviceSession;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::{errors::LocatorError, types::*};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Resolves locator lists against the active surface of one session.
pub struct SelectorResolver<'s> {
    session: &'s DeviceSession,
    poll_interval: Duration,
}

impl<'s> SelectorResolver<'s> {
    pub fn new(session: &'s DeviceSession) -> Self {
        Self {
            session,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn session(&self) -> &'s DeviceSession {
        self.session
    }

    /// Single pass over the candidates, first hit wins.
    ///
    /// A candidate whose lookup fails at transport level is skipped. Only a
    /// dead session aborts the pass.
    pub async fn resolve(&self, list: &LocatorList) -> Result<Option<Resolution>, LocatorError> {
        for (index, candidate) in list.iter().enumerate() {
            debug!(target_name = list.target(), %candidate, "Trying candidate");
            match self
                .session
                .find(candidate.strategy, &candidate.selector)
                .await
            {
                Ok(Some(element)) => {
                    debug!(
                        target_name = list.target(),
                        %candidate,
                        index,
                        "Resolved"
                    );
                    return Ok(Some(Resolution {
                        element,
                        index,
                        strategy: candidate.strategy,
                    }));
                }
                Ok(None) => {}
                Err(err) if err.is_session_fatal() => {
                    return Err(LocatorError::Session {
                        target: list.target().to_string(),
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(
                        target_name = list.target(),
                        %candidate,
                        error = %err,
                        "Candidate lookup failed, trying next"
                    );
                }
            }
        }
        Ok(None)
    }

    /// Repeat [`resolve`](Self::resolve) until a hit or `timeout` elapses.
    /// At least one pass is always made.
    pub async fn find_one(
        &self,
        list: &LocatorList,
        timeout: Duration,
    ) -> Result<Option<Resolution>, LocatorError> {
        // an unrepresentable deadline means no deadline
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(hit) = self.resolve(list).await? {
                return Ok(Some(hit));
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                debug!(target_name = list.target(), ?timeout, "Not found before timeout");
                return Ok(None);
            }
            sleep(deadline.map_or(self.poll_interval, |d| self.poll_interval.min(d - now))).await;
        }
    }

    /// [`find_one`](Self::find_one) that turns a miss into [`LocatorError::NotFound`].
    pub async fn require(
        &self,
        list: &LocatorList,
        timeout: Duration,
    ) -> Result<Resolution, LocatorError> {
        self.find_one(list, timeout)
            .await?
            .ok_or_else(|| LocatorError::NotFound {
                target: list.target().to_string(),
            })
    }

    /// Whether any candidate matches right now.
    pub async fn exists(&self, list: &LocatorList) -> Result<bool, LocatorError> {
        Ok(self.resolve(list).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_adapter::{AppIdentity, MockDevice, SurfaceId};
    use std::sync::Arc;
    use walletforge_core_types::LocatorStrategy;

    fn setup() -> (Arc<MockDevice>, DeviceSession) {
        let mock = Arc::new(MockDevice::new());
        let session = DeviceSession::from_driver(mock.clone(), AppIdentity::default());
        (mock, session)
    }

    fn abc() -> LocatorList {
        LocatorList::new(
            "submit",
            vec![
                LocatorCandidate::id("a"),
                LocatorCandidate::accessibility_id("b"),
                LocatorCandidate::xpath("//c"),
            ],
        )
    }

    #[tokio::test]
    async fn first_existing_candidate_wins_in_order() {
        let (mock, session) = setup();
        mock.add_element(&SurfaceId::native(), LocatorStrategy::AccessibilityId, "b", "");

        let hit = SelectorResolver::new(&session)
            .resolve(&abc())
            .await
            .unwrap()
            .expect("b exists");
        assert_eq!(hit.index, 1);
        assert_eq!(hit.strategy, LocatorStrategy::AccessibilityId);
        assert_eq!(
            mock.lookups(),
            vec![
                (LocatorStrategy::Id, "a".to_string()),
                (LocatorStrategy::AccessibilityId, "b".to_string()),
            ]
        );
        session.close().await;
    }

    #[tokio::test]
    async fn nothing_matching_is_not_an_error() {
        let (mock, session) = setup();
        let resolver = SelectorResolver::new(&session);
        assert!(tokio_test::assert_ok!(resolver.resolve(&abc()).await).is_none());
        assert!(!resolver.exists(&abc()).await.unwrap());
        assert_eq!(mock.lookups().len(), 6);
        session.close().await;
    }

    #[tokio::test]
    async fn transport_failure_falls_through_to_next_candidate() {
        let (mock, session) = setup();
        mock.fail_lookup(LocatorStrategy::Id, "a");
        mock.add_element(&SurfaceId::native(), LocatorStrategy::XPath, "//c", "");
        let hit = SelectorResolver::new(&session)
            .resolve(&abc())
            .await
            .unwrap()
            .expect("c exists");
        assert_eq!(hit.index, 2);
        session.close().await;
    }

    #[tokio::test]
    async fn dead_session_aborts_resolution() {
        let (mock, session) = setup();
        mock.kill_session();
        let err = SelectorResolver::new(&session)
            .resolve(&abc())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.target(), "submit");
        session.close().await;
    }

    #[tokio::test]
    async fn find_one_waits_for_late_element() {
        let (mock, session) = setup();
        let late = mock.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(40)).await;
            late.add_element(&SurfaceId::native(), LocatorStrategy::Id, "a", "");
        });
        let hit = SelectorResolver::new(&session)
            .with_poll_interval(Duration::from_millis(10))
            .find_one(&abc(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(hit.map(|h| h.index), Some(0));
        session.close().await;
    }

    #[tokio::test]
    async fn unbounded_timeout_keeps_polling() {
        let (mock, session) = setup();
        let late = mock.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            late.add_element(&SurfaceId::native(), LocatorStrategy::AccessibilityId, "b", "");
        });
        let hit = SelectorResolver::new(&session)
            .with_poll_interval(Duration::from_millis(10))
            .find_one(&abc(), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(hit.map(|h| h.index), Some(1));
        session.close().await;
    }

    #[tokio::test]
    async fn require_reports_target_on_timeout() {
        let (_mock, session) = setup();
        let err = SelectorResolver::new(&session)
            .with_poll_interval(Duration::from_millis(5))
            .require(&abc(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::NotFound { ref target } if target == "submit"));
        session.close().await;
    }
}
