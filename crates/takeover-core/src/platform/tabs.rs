//! Browser tab host contract.
//!
//! Failures come back already classified by the host, so the delivery
//! pipeline decides retries on the variant, never on message text.

use async_trait::async_trait;

use crate::models::{TabId, TabInfo};
use crate::protocol::{Ack, Directive};

/// Outcome of injecting the agent into a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentInstall {
    /// A new agent was installed; it announces readiness on its own.
    Fresh,
    /// An agent was already resident, injection was a no-op.
    Resident,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectError {
    /// The page forbids script injection (browser pages, stores, PDFs).
    #[error("Tab {0} is protected against injection")]
    Protected(TabId),
    #[error("Tab {0} no longer exists")]
    TabGone(TabId),
    #[error("Injection into tab {tab} failed: {message}")]
    Other { tab: TabId, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Nothing in the tab is listening (agent not installed or not ready yet).
    #[error("No receiver in tab {0}")]
    NoReceiver(TabId),
    #[error("Tab {0} was closed")]
    TabGone(TabId),
    #[error("Delivery to tab {tab} failed: {message}")]
    Other { tab: TabId, message: String },
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::NoReceiver(_) | DeliveryError::TabGone(_))
    }
}

#[async_trait]
pub trait TabHost: Send + Sync {
    /// All open tabs across all windows.
    async fn query_tabs(&self) -> Vec<TabInfo>;

    /// Inject the takeover agent (presentation + behaviour) into a tab.
    async fn inject_agent(&self, tab: TabId) -> Result<AgentInstall, InjectError>;

    /// Deliver a directive to the agent resident in a tab.
    async fn send_directive(&self, tab: TabId, directive: Directive)
        -> Result<Ack, DeliveryError>;
}
