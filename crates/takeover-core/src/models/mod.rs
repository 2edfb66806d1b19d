pub mod reminder;
pub mod tab;
pub mod whitelist;

pub use reminder::{Reminder, ReminderId};
pub use tab::{TabId, TabInfo};
pub use whitelist::{is_whitelisted, normalize_site};
