use action_locator::LocatorList;
use serde::{Deserialize, Serialize};
use walletforge_core_types::SurfaceState;

/// Structural probes for each classifiable state on an embedded surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceSignals {
    pub loading: LocatorList,
    pub completion: LocatorList,
    pub error: LocatorList,
    pub input_required: LocatorList,
    pub action_available: LocatorList,
}

impl SurfaceSignals {
    /// Probes in tie-break order. Loading outranks everything and completion
    /// outranks the action, so a stale button is never reported as available.
    pub fn ordered(&self) -> [(SurfaceState, &LocatorList); 5] {
        [
            (SurfaceState::Loading, &self.loading),
            (SurfaceState::AlreadyDone, &self.completion),
            (SurfaceState::Error, &self.error),
            (SurfaceState::InputRequired, &self.input_required),
            (SurfaceState::ActionAvailable, &self.action_available),
        ]
    }
}
