pub mod cache;
pub mod takeover_store;

pub use cache::StoreCache;
pub use takeover_store::{StoreError, TakeoverStore};
