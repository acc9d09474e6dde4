pub mod event;
pub mod hub;
pub mod names;
pub mod observers;

pub use event::{Event, RunOutcomeKind};
pub use hub::{MuteGuard, Signal, SignalHub, Subscriber};
pub use observers::{EventRecorder, LoggingObserver};
