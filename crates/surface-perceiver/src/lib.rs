//! Surface state classification.
//!
//! [`StateClassifier`] answers "what is the device showing right now" with a
//! [`SurfaceState`]. When an embedded surface is attached it probes structural
//! signals on it; otherwise it falls back to [`HeuristicTextClassifier`], a
//! keyword search over the native page source. Results carry a [`Confidence`]
//! so callers can tell the two paths apart.

pub mod classifier;
pub mod errors;
pub mod heuristic;
pub mod signals;

pub use classifier::{wait_for_embedded, Classification, Confidence, StateClassifier};
pub use errors::PerceiverError;
pub use heuristic::{HeuristicTextClassifier, KeywordSets};
pub use signals::SurfaceSignals;
pub use walletforge_core_types::SurfaceState;
