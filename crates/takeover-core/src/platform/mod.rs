//! Host collaborators the core consumes but does not own: key-value
//! storage, the alarm primitive, the browser's tabs and the platform
//! notification centre.

pub mod notify;
pub mod storage;
pub mod tabs;
pub mod timers;

pub use notify::{Notification, Notifier};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageUsage};
pub use tabs::{AgentInstall, DeliveryError, InjectError, TabHost};
pub use timers::{MemoryTimerService, TimerError, TimerService, TokioTimerService};
