pub mod local;

pub use local::{LocalBrowser, TabSpec};
