//! W3C WebDriver / Appium driver over HTTP

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use parking_lot::Mutex;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;
use walletforge_core_types::{LocatorStrategy, SurfaceId};

use crate::config::SessionConfig;
use crate::driver::{text_xpath, DeviceDriver, ElementRef};
use crate::error::DeviceError;

const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52f-4ace-bb2c-0b5f0a4d6a0b";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Driver bound to one live session on an Appium server.
pub struct AppiumDriver {
    http: Client,
    base: String,
    session_id: String,
    active: Mutex<SurfaceId>,
}

impl AppiumDriver {
    /// Negotiate a new session. Any failure here is a [`DeviceError::Session`].
    #[instrument(skip(config), fields(endpoint = %config.endpoint))]
    pub async fn connect(config: &SessionConfig) -> Result<Self, DeviceError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| {
            DeviceError::Session(format!("invalid endpoint {}: {}", config.endpoint, err))
        })?;
        let base = endpoint.as_str().trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| DeviceError::Session(format!("failed to build http client: {err}")))?;

        let value = request(
            &http,
            Method::POST,
            &format!("{base}/session"),
            Some(config.capabilities()),
        )
        .await
        .map_err(|err| match err {
            DeviceError::Session(_) => err,
            other => DeviceError::Session(format!("capability negotiation failed: {other}")),
        })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DeviceError::Session("endpoint returned no sessionId".to_string()))?
            .to_string();

        info!(session = %session_id, "Automation session established");
        Ok(Self {
            http,
            base,
            session_id,
            active: Mutex::new(SurfaceId::native()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DeviceError> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        request(&self.http, method, &url, body).await
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value, DeviceError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [args] })),
        )
        .await
    }

    fn wire_locator(&self, strategy: LocatorStrategy, selector: &str) -> (&'static str, String) {
        match strategy {
            LocatorStrategy::Id => ("id", selector.to_string()),
            LocatorStrategy::AccessibilityId => ("accessibility id", selector.to_string()),
            LocatorStrategy::XPath => ("xpath", selector.to_string()),
            LocatorStrategy::UiAutomator => ("-android uiautomator", selector.to_string()),
            LocatorStrategy::ClassName => ("class name", selector.to_string()),
            LocatorStrategy::Css => ("css selector", selector.to_string()),
            LocatorStrategy::Text => {
                let kind = self.active.lock().kind();
                ("xpath", text_xpath(selector, kind))
            }
        }
    }
}

#[async_trait]
impl DeviceDriver for AppiumDriver {
    async fn find_element(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Option<ElementRef>, DeviceError> {
        let (using, value) = self.wire_locator(strategy, selector);
        match self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": using, "value": value })),
            )
            .await
        {
            Ok(found) => {
                let id = element_id(&found).ok_or_else(|| {
                    DeviceError::Protocol(format!("element response without id: {found}"))
                })?;
                Ok(Some(ElementRef::new(id, strategy, selector)))
            }
            Err(DeviceError::NoSuchElement(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DeviceError> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element.id),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DeviceError> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.id),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DeviceError> {
        self.command(
            Method::POST,
            &format!("/element/{}/clear", element.id),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, DeviceError> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.id), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn contexts(&self) -> Result<Vec<SurfaceId>, DeviceError> {
        let value = self.command(Method::GET, "/contexts", None).await?;
        let names = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(SurfaceId::new)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn current_context(&self) -> Result<SurfaceId, DeviceError> {
        let value = self.command(Method::GET, "/context", None).await?;
        let surface = value
            .as_str()
            .map(SurfaceId::new)
            .unwrap_or_else(SurfaceId::native);
        *self.active.lock() = surface.clone();
        Ok(surface)
    }

    async fn set_context(&self, surface: &SurfaceId) -> Result<(), DeviceError> {
        self.command(
            Method::POST,
            "/context",
            Some(json!({ "name": surface.as_str() })),
        )
        .await?;
        *self.active.lock() = surface.clone();
        Ok(())
    }

    async fn page_source(&self) -> Result<String, DeviceError> {
        let value = self.command(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DeviceError::Protocol("screenshot payload is not a string".into()))?;
        Base64
            .decode(encoded.trim())
            .map_err(|err| DeviceError::Protocol(format!("invalid screenshot encoding: {err}")))
    }

    async fn activate_app(&self, app_id: &str) -> Result<(), DeviceError> {
        self.command(
            Method::POST,
            "/appium/device/activate_app",
            Some(json!({ "appId": app_id })),
        )
        .await
        .map(|_| ())
    }

    async fn terminate_app(&self, app_id: &str) -> Result<bool, DeviceError> {
        let value = self
            .command(
                Method::POST,
                "/appium/device/terminate_app",
                Some(json!({ "appId": app_id })),
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn clear_app(&self, app_id: &str) -> Result<(), DeviceError> {
        self.execute("mobile: clearApp", json!({ "appId": app_id }))
            .await
            .map(|_| ())
    }

    async fn start_activity(&self, app_id: &str, activity: &str) -> Result<(), DeviceError> {
        self.execute(
            "mobile: startActivity",
            json!({ "intent": format!("{app_id}/{activity}") }),
        )
        .await
        .map(|_| ())
    }

    async fn delete_session(&self) -> Result<(), DeviceError> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        request(&self.http, Method::DELETE, &url, None)
            .await
            .map(|_| ())
    }
}

async fn request(
    http: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DeviceError> {
    debug!(%method, url, "webdriver request");
    let mut builder = http.request(method, url);
    if let Some(body) = body {
        builder = builder.json(&body);
    }
    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|err| DeviceError::Protocol(format!("invalid response body ({status}): {err}")))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(map_w3c_error(code, message));
    }
    if !status.is_success() {
        return Err(DeviceError::Protocol(format!(
            "endpoint answered {status}: {value}"
        )));
    }
    Ok(value)
}

fn transport_error(err: reqwest::Error) -> DeviceError {
    if err.is_connect() {
        DeviceError::Session(format!("endpoint unreachable: {err}"))
    } else if err.is_timeout() {
        DeviceError::Protocol(format!("request timed out: {err}"))
    } else {
        DeviceError::Protocol(err.to_string())
    }
}

fn map_w3c_error(code: &str, message: &str) -> DeviceError {
    let detail = format!("{code}: {message}");
    match code {
        "no such element" => DeviceError::NoSuchElement(detail),
        "stale element reference" | "element not interactable" | "element click intercepted" => {
            DeviceError::Interaction(detail)
        }
        "invalid session id" | "session not created" => DeviceError::Session(detail),
        _ => DeviceError::Protocol(detail),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(W3C_ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}
