use action_locator::LocatorError;
use device_adapter::DeviceError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PerceiverError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Locator(#[from] LocatorError),
}

impl PerceiverError {
    pub fn is_session_fatal(&self) -> bool {
        match self {
            PerceiverError::Device(err) => err.is_session_fatal(),
            PerceiverError::Locator(LocatorError::Session { .. }) => true,
            PerceiverError::Locator(_) => false,
        }
    }
}
