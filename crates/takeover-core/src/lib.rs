pub mod agent;
pub mod alarms;
pub mod clock;
pub mod config;
pub mod constants;
pub mod control;
pub mod controller;
pub mod host;
pub mod models;
pub mod platform;
pub mod protocol;
pub mod runtime;
pub mod store;
pub mod tracing_setup;
pub mod validation;

// Re-export the main entry points at crate root for convenience
pub use agent::{TabAgent, TabContext, UiEvent};
pub use alarms::AlarmScheduler;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::CoreConfig;
pub use control::{ControlError, ControlSurface};
pub use controller::{ControllerHandle, DeliveryReport, TakeoverController};
pub use host::{LocalBrowser, TabSpec};
pub use protocol::{Ack, Command, CommandSink, Directive};
pub use runtime::TakeoverRuntime;
pub use store::{StoreError, TakeoverStore};
