//! Device session lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use walletforge_core_types::{LocatorStrategy, SurfaceId};

use crate::appium::AppiumDriver;
use crate::config::SessionConfig;
use crate::driver::{DeviceDriver, ElementRef, Interaction};
use crate::error::DeviceError;

/// Package and launch activity of the app under automation.
#[derive(Clone, Debug, Default)]
pub struct AppIdentity {
    pub package: String,
    pub activity: Option<String>,
}

/// One live connection to a single device/app instance.
///
/// Whoever opens a session must call [`DeviceSession::close`] on every exit
/// path; the call is idempotent and never fails.
pub struct DeviceSession {
    driver: Arc<dyn DeviceDriver>,
    app: AppIdentity,
    closed: AtomicBool,
}

impl DeviceSession {
    /// Establish a session against the configured Appium endpoint.
    pub async fn open(config: &SessionConfig) -> Result<Self, DeviceError> {
        let driver = AppiumDriver::connect(config).await?;
        Ok(Self::from_driver(
            Arc::new(driver),
            AppIdentity {
                package: config.app_package.clone(),
                activity: config.app_activity.clone(),
            },
        ))
    }

    pub fn from_driver(driver: Arc<dyn DeviceDriver>, app: AppIdentity) -> Self {
        Self {
            driver,
            app,
            closed: AtomicBool::new(false),
        }
    }

    pub fn app(&self) -> &AppIdentity {
        &self.app
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<&Arc<dyn DeviceDriver>, DeviceError> {
        if self.is_closed() {
            return Err(DeviceError::Closed);
        }
        Ok(&self.driver)
    }

    /// Single existence check; `Ok(None)` when nothing matches.
    pub async fn find(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Option<ElementRef>, DeviceError> {
        self.ensure_open()?.find_element(strategy, selector).await
    }

    #[instrument(level = "debug", skip(self), fields(element = %element.locator))]
    pub async fn act(
        &self,
        element: &ElementRef,
        interaction: Interaction,
    ) -> Result<(), DeviceError> {
        let driver = self.ensure_open()?;
        let result = match &interaction {
            Interaction::Click => driver.click(element).await,
            Interaction::Type(text) => driver.send_keys(element, text).await,
            Interaction::Clear => driver.clear(element).await,
        };
        result.map_err(|err| match err {
            DeviceError::NoSuchElement(msg) => DeviceError::Interaction(msg),
            other => other,
        })
    }

    pub async fn read_text(&self, element: &ElementRef) -> Result<String, DeviceError> {
        self.ensure_open()?
            .element_text(element)
            .await
            .map_err(|err| match err {
                DeviceError::NoSuchElement(msg) => DeviceError::Interaction(msg),
                other => other,
            })
    }

    /// Surfaces currently attached; the set changes while the app navigates.
    pub async fn list_surfaces(&self) -> Result<Vec<SurfaceId>, DeviceError> {
        self.ensure_open()?.contexts().await
    }

    pub async fn current_surface(&self) -> Result<SurfaceId, DeviceError> {
        self.ensure_open()?.current_context().await
    }

    pub fn native_surface(&self) -> SurfaceId {
        SurfaceId::native()
    }

    /// First embedded surface, if one is attached right now.
    pub async fn embedded_surface(&self) -> Result<Option<SurfaceId>, DeviceError> {
        let surfaces = self.list_surfaces().await?;
        Ok(surfaces.into_iter().find(SurfaceId::is_embedded))
    }

    /// Retarget subsequent lookups. Callers switch back before returning control.
    #[instrument(level = "debug", skip(self))]
    pub async fn switch_surface(&self, surface: &SurfaceId) -> Result<(), DeviceError> {
        self.ensure_open()?.set_context(surface).await
    }

    pub async fn switch_to_native(&self) -> Result<(), DeviceError> {
        self.switch_surface(&SurfaceId::native()).await
    }

    pub async fn page_source(&self) -> Result<String, DeviceError> {
        self.ensure_open()?.page_source().await
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, DeviceError> {
        self.ensure_open()?.screenshot().await
    }

    /// Bring the app to the foreground, starting it if needed.
    #[instrument(skip(self), fields(package = %self.app.package))]
    pub async fn launch_app(&self) -> Result<(), DeviceError> {
        let driver = self.ensure_open()?;
        match &self.app.activity {
            Some(activity) => match driver.start_activity(&self.app.package, activity).await {
                Ok(()) => Ok(()),
                Err(err) if !err.is_session_fatal() => {
                    debug!(error = %err, "startActivity failed, falling back to activate_app");
                    driver.activate_app(&self.app.package).await
                }
                Err(err) => Err(err),
            },
            None => driver.activate_app(&self.app.package).await,
        }
    }

    pub async fn activate_app(&self) -> Result<(), DeviceError> {
        self.ensure_open()?.activate_app(&self.app.package).await
    }

    pub async fn terminate_app(&self) -> Result<bool, DeviceError> {
        self.ensure_open()?.terminate_app(&self.app.package).await
    }

    pub async fn clear_app_data(&self) -> Result<(), DeviceError> {
        self.ensure_open()?.clear_app(&self.app.package).await
    }

    /// Terminate and start the app again on the native surface.
    pub async fn relaunch_app(&self) -> Result<(), DeviceError> {
        let was_running = self.terminate_app().await?;
        debug!(was_running, "App terminated for relaunch");
        self.switch_to_native().await?;
        self.launch_app().await
    }

    /// Release the session. Safe to call more than once; never fails.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Session already closed");
            return;
        }
        match self.driver.delete_session().await {
            Ok(()) => info!("Automation session closed"),
            Err(err) => warn!(error = %err, "Failed to close automation session cleanly"),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!("DeviceSession dropped without close(); remote session may linger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockDevice};

    fn session(mock: &Arc<MockDevice>) -> DeviceSession {
        DeviceSession::from_driver(
            mock.clone(),
            AppIdentity {
                package: "com.example.wallet".into(),
                activity: None,
            },
        )
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mock = Arc::new(MockDevice::new());
        let session = session(&mock);
        session.close().await;
        session.close().await;
        let deletes = mock
            .calls()
            .into_iter()
            .filter(|call| matches!(call, MockCall::DeleteSession))
            .count();
        assert_eq!(deletes, 1);
        assert!(matches!(
            session.list_surfaces().await,
            Err(DeviceError::Closed)
        ));
    }

    #[tokio::test]
    async fn stale_element_surfaces_as_interaction_error() {
        let mock = Arc::new(MockDevice::new());
        let native = SurfaceId::native();
        mock.add_element(&native, LocatorStrategy::Id, "btn", "Go");
        let session = session(&mock);
        let element = session
            .find(LocatorStrategy::Id, "btn")
            .await
            .unwrap()
            .expect("present");
        mock.remove_element(&native, LocatorStrategy::Id, "btn");
        let err = session.act(&element, Interaction::Click).await.unwrap_err();
        assert!(matches!(err, DeviceError::Interaction(_)));
        session.close().await;
    }

    #[tokio::test]
    async fn embedded_surface_is_detected() {
        let mock = Arc::new(MockDevice::new());
        let session = session(&mock);
        assert!(session.embedded_surface().await.unwrap().is_none());
        mock.attach_surface(SurfaceId::new("WEBVIEW_com.example.wallet"));
        assert_eq!(
            session.embedded_surface().await.unwrap(),
            Some(SurfaceId::new("WEBVIEW_com.example.wallet"))
        );
        session.close().await;
    }
}
