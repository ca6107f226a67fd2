//! erwin listener library
//!
//! A listener follows the shared session timeline: it mirrors the state the
//! server broadcasts, estimates server time, and keeps a local media element
//! at the position that state implies, recovering from stalls on its own.

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod media;
pub mod reconciler;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ListenerConfig;
pub use driver::{pull_state, ws_url, ReconnectBackoff, SessionClient};
pub use error::{ListenerError, ListenerResult, MediaError};
pub use media::{LoadRequest, MediaElement, MediaEvent, MediaKind, MediaSource, VirtualPlayhead};
pub use reconciler::{AdjustOutcome, Diagnostics, Reconciler, ReconcilerSettings};
pub use sync::{ClockSync, SnapshotClock};
