//! In-memory device used to exercise workflows without hardware

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use walletforge_core_types::{LocatorStrategy, SurfaceId};

use crate::driver::{DeviceDriver, ElementRef};
use crate::error::{DeviceError, ShellError};
use crate::shell::DeviceShell;

/// Calls recorded by [`MockDevice`], in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    Find {
        surface: SurfaceId,
        strategy: LocatorStrategy,
        selector: String,
    },
    Click(String),
    Type(String, String),
    Clear(String),
    SetContext(SurfaceId),
    ActivateApp,
    TerminateApp,
    ClearApp,
    StartActivity,
    DeleteSession,
}

/// Change applied to the mock screen when a scripted element is clicked.
#[derive(Clone, Debug)]
pub enum MockEffect {
    Show {
        surface: SurfaceId,
        strategy: LocatorStrategy,
        selector: String,
        text: String,
    },
    Hide {
        surface: SurfaceId,
        strategy: LocatorStrategy,
        selector: String,
    },
    AttachSurface(SurfaceId),
    DetachSurface(SurfaceId),
}

#[derive(Clone, Debug)]
struct MockElement {
    id: String,
    strategy: LocatorStrategy,
    selector: String,
    text: String,
}

#[derive(Default)]
struct MockState {
    surfaces: Vec<SurfaceId>,
    active: Option<SurfaceId>,
    elements: HashMap<SurfaceId, Vec<MockElement>>,
    sources: HashMap<SurfaceId, String>,
    failing: HashSet<(LocatorStrategy, String)>,
    effects: HashMap<(LocatorStrategy, String), Vec<MockEffect>>,
    calls: Vec<MockCall>,
    next_id: u64,
    fail_session: bool,
}

/// Scriptable [`DeviceDriver`]: elements are keyed by the exact
/// `(strategy, selector)` pair used to look them up.
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        let native = SurfaceId::native();
        Self {
            state: Mutex::new(MockState {
                surfaces: vec![native.clone()],
                active: Some(native),
                ..Default::default()
            }),
        }
    }

    pub fn add_element(
        &self,
        surface: &SurfaceId,
        strategy: LocatorStrategy,
        selector: &str,
        text: &str,
    ) {
        let mut state = self.state.lock();
        insert_element(&mut state, surface, strategy, selector, text);
    }

    pub fn remove_element(&self, surface: &SurfaceId, strategy: LocatorStrategy, selector: &str) {
        let mut state = self.state.lock();
        remove_element(&mut state, surface, strategy, selector);
    }

    pub fn attach_surface(&self, surface: SurfaceId) {
        let mut state = self.state.lock();
        if !state.surfaces.contains(&surface) {
            state.surfaces.push(surface);
        }
    }

    pub fn detach_surface(&self, surface: &SurfaceId) {
        let mut state = self.state.lock();
        state.surfaces.retain(|s| s != surface);
    }

    pub fn set_source(&self, surface: &SurfaceId, source: &str) {
        self.state
            .lock()
            .sources
            .insert(surface.clone(), source.to_string());
    }

    /// Make lookups with this locator fail at transport level.
    pub fn fail_lookup(&self, strategy: LocatorStrategy, selector: &str) {
        self.state
            .lock()
            .failing
            .insert((strategy, selector.to_string()));
    }

    /// Make every subsequent call fail as if the endpoint died.
    pub fn kill_session(&self) {
        self.state.lock().fail_session = true;
    }

    /// Apply `effects` whenever the element found by this locator is clicked.
    pub fn on_click(&self, strategy: LocatorStrategy, selector: &str, effects: Vec<MockEffect>) {
        self.state
            .lock()
            .effects
            .insert((strategy, selector.to_string()), effects);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Whether the element found by `selector` was ever clicked.
    pub fn was_clicked(&self, strategy: LocatorStrategy, selector: &str) -> bool {
        let locator = format!("{}={}", strategy.name(), selector);
        self.state
            .lock()
            .calls
            .iter()
            .any(|call| matches!(call, MockCall::Click(l) if *l == locator))
    }

    /// Text typed into the element found by `selector`, in order.
    pub fn typed_into(&self, strategy: LocatorStrategy, selector: &str) -> Vec<String> {
        let locator = format!("{}={}", strategy.name(), selector);
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Type(l, text) if *l == locator => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn lookups(&self) -> Vec<(LocatorStrategy, String)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Find {
                    strategy, selector, ..
                } => Some((*strategy, selector.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn active_surface(&self) -> SurfaceId {
        self.state
            .lock()
            .active
            .clone()
            .unwrap_or_else(SurfaceId::native)
    }

    fn guard(&self) -> Result<parking_lot::MutexGuard<'_, MockState>, DeviceError> {
        let state = self.state.lock();
        if state.fail_session {
            return Err(DeviceError::Session("mock endpoint unreachable".into()));
        }
        Ok(state)
    }

    fn with_element<T>(
        &self,
        element: &ElementRef,
        call: MockCall,
        f: impl FnOnce(&mut MockState, MockElement) -> T,
    ) -> Result<T, DeviceError> {
        let mut state = self.guard()?;
        state.calls.push(call);
        let found = state
            .elements
            .values()
            .flatten()
            .find(|el| el.id == element.id)
            .cloned();
        match found {
            Some(el) => Ok(f(&mut state, el)),
            None => Err(DeviceError::Interaction(format!(
                "stale element reference: {}",
                element.locator
            ))),
        }
    }
}

fn insert_element(
    state: &mut MockState,
    surface: &SurfaceId,
    strategy: LocatorStrategy,
    selector: &str,
    text: &str,
) {
    state.next_id += 1;
    let element = MockElement {
        id: format!("el-{}", state.next_id),
        strategy,
        selector: selector.to_string(),
        text: text.to_string(),
    };
    let list = state.elements.entry(surface.clone()).or_default();
    list.retain(|el| !(el.strategy == strategy && el.selector == selector));
    list.push(element);
}

fn remove_element(
    state: &mut MockState,
    surface: &SurfaceId,
    strategy: LocatorStrategy,
    selector: &str,
) {
    if let Some(list) = state.elements.get_mut(surface) {
        list.retain(|el| !(el.strategy == strategy && el.selector == selector));
    }
}

fn apply_effects(state: &mut MockState, effects: Vec<MockEffect>) {
    for effect in effects {
        match effect {
            MockEffect::Show {
                surface,
                strategy,
                selector,
                text,
            } => insert_element(state, &surface, strategy, &selector, &text),
            MockEffect::Hide {
                surface,
                strategy,
                selector,
            } => remove_element(state, &surface, strategy, &selector),
            MockEffect::AttachSurface(surface) => {
                if !state.surfaces.contains(&surface) {
                    state.surfaces.push(surface);
                }
            }
            MockEffect::DetachSurface(surface) => state.surfaces.retain(|s| *s != surface),
        }
    }
}

#[async_trait]
impl DeviceDriver for MockDevice {
    async fn find_element(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Option<ElementRef>, DeviceError> {
        let mut state = self.guard()?;
        let surface = state.active.clone().unwrap_or_else(SurfaceId::native);
        state.calls.push(MockCall::Find {
            surface: surface.clone(),
            strategy,
            selector: selector.to_string(),
        });
        if state.failing.contains(&(strategy, selector.to_string())) {
            return Err(DeviceError::Protocol(format!(
                "lookup {}={} failed",
                strategy.name(),
                selector
            )));
        }
        Ok(state
            .elements
            .get(&surface)
            .and_then(|list| {
                list.iter()
                    .find(|el| el.strategy == strategy && el.selector == selector)
            })
            .map(|el| ElementRef::new(el.id.clone(), strategy, selector)))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DeviceError> {
        self.with_element(
            element,
            MockCall::Click(element.locator.clone()),
            |state, el| {
                if let Some(effects) = state.effects.get(&(el.strategy, el.selector.clone())) {
                    let effects = effects.clone();
                    apply_effects(state, effects);
                }
            },
        )
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DeviceError> {
        self.with_element(
            element,
            MockCall::Type(element.locator.clone(), text.to_string()),
            |_, _| (),
        )
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DeviceError> {
        self.with_element(element, MockCall::Clear(element.locator.clone()), |_, _| ())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, DeviceError> {
        let state = self.guard()?;
        state
            .elements
            .values()
            .flatten()
            .find(|el| el.id == element.id)
            .map(|el| el.text.clone())
            .ok_or_else(|| {
                DeviceError::Interaction(format!("stale element reference: {}", element.locator))
            })
    }

    async fn contexts(&self) -> Result<Vec<SurfaceId>, DeviceError> {
        Ok(self.guard()?.surfaces.clone())
    }

    async fn current_context(&self) -> Result<SurfaceId, DeviceError> {
        Ok(self
            .guard()?
            .active
            .clone()
            .unwrap_or_else(SurfaceId::native))
    }

    async fn set_context(&self, surface: &SurfaceId) -> Result<(), DeviceError> {
        let mut state = self.guard()?;
        state.calls.push(MockCall::SetContext(surface.clone()));
        if !state.surfaces.contains(surface) {
            return Err(DeviceError::Protocol(format!(
                "no such context: {surface}"
            )));
        }
        state.active = Some(surface.clone());
        Ok(())
    }

    async fn page_source(&self) -> Result<String, DeviceError> {
        let state = self.guard()?;
        let surface = state.active.clone().unwrap_or_else(SurfaceId::native);
        Ok(state.sources.get(&surface).cloned().unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DeviceError> {
        self.guard()?;
        Ok(b"\x89PNG\r\n\x1a\nmock".to_vec())
    }

    async fn activate_app(&self, _app_id: &str) -> Result<(), DeviceError> {
        self.guard()?.calls.push(MockCall::ActivateApp);
        Ok(())
    }

    async fn terminate_app(&self, _app_id: &str) -> Result<bool, DeviceError> {
        self.guard()?.calls.push(MockCall::TerminateApp);
        Ok(true)
    }

    async fn clear_app(&self, _app_id: &str) -> Result<(), DeviceError> {
        self.guard()?.calls.push(MockCall::ClearApp);
        Ok(())
    }

    async fn start_activity(&self, _app_id: &str, _activity: &str) -> Result<(), DeviceError> {
        self.guard()?.calls.push(MockCall::StartActivity);
        Ok(())
    }

    async fn delete_session(&self) -> Result<(), DeviceError> {
        self.state.lock().calls.push(MockCall::DeleteSession);
        Ok(())
    }
}

/// Recording [`DeviceShell`] that never touches a real device.
#[derive(Default)]
pub struct MockShell {
    commands: Mutex<Vec<String>>,
    devices: Vec<String>,
    fail: bool,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<String>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn record(&self, command: String) -> Result<(), ShellError> {
        self.commands.lock().push(command.clone());
        if self.fail {
            return Err(ShellError::CommandFailed {
                command,
                reason: "mock failure".into(),
            });
        }
        Ok(())
    }
}

impl DeviceShell for MockShell {
    fn clear_app_data(&self, package: &str) -> Result<(), ShellError> {
        self.record(format!("pm clear {package}"))
    }

    fn open_url(&self, url: &str) -> Result<(), ShellError> {
        self.record(format!("open {url}"))
    }

    fn dump_ui_tree(&self) -> Result<String, ShellError> {
        self.record("uiautomator dump".into())?;
        Ok("<hierarchy/>".into())
    }

    fn list_connected_devices(&self) -> Result<Vec<String>, ShellError> {
        self.record("devices".into())?;
        Ok(self.devices.clone())
    }

    fn force_stop(&self, package: &str) -> Result<(), ShellError> {
        self.record(format!("am force-stop {package}"))
    }
}
