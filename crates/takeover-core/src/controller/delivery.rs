//! Takeover fan-out: inject, wait for readiness, show, with batching and
//! retry.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::retry::RetryDecision;
use super::TakeoverController;
use crate::models::{Reminder, TabId, TabInfo};
use crate::platform::{AgentInstall, DeliveryError, InjectError, Notification};
use crate::protocol::Directive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The page refuses injection; expected and never retried.
    Protected,
    Injection,
    Delivery,
    /// The agent answered with `success: false`.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabFailure {
    pub tab: TabId,
    pub kind: FailureKind,
    pub message: String,
}

impl TabFailure {
    fn new(tab: TabId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            tab,
            kind,
            message: message.into(),
        }
    }
}

impl From<InjectError> for TabFailure {
    fn from(error: InjectError) -> Self {
        match &error {
            InjectError::Protected(tab) => Self::new(*tab, FailureKind::Protected, error.to_string()),
            InjectError::TabGone(tab) | InjectError::Other { tab, .. } => {
                Self::new(*tab, FailureKind::Injection, error.to_string())
            }
        }
    }
}

impl From<DeliveryError> for TabFailure {
    fn from(error: DeliveryError) -> Self {
        let tab = match &error {
            DeliveryError::NoReceiver(tab)
            | DeliveryError::TabGone(tab)
            | DeliveryError::Other { tab, .. } => *tab,
        };
        Self::new(tab, FailureKind::Delivery, error.to_string())
    }
}

/// Outcome of one takeover fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub candidates: usize,
    pub shown: usize,
    pub failures: Vec<TabFailure>,
    pub fallback_notified: bool,
}

impl TakeoverController {
    /// Show `reminder` in every eligible tab. Per-tab failures are
    /// collected, never propagated. When nothing could be shown anywhere a
    /// single platform notification is raised instead.
    pub async fn deliver(&self, reminder: &Reminder) -> DeliveryReport {
        let whitelist = match self.store.get_whitelist().await {
            Ok(whitelist) => whitelist,
            Err(e) => {
                warn!("Whitelist unavailable, delivering without it: {}", e);
                Vec::new()
            }
        };
        let tabs = self.host.query_tabs().await;
        let candidates = super::filter::select_candidates(tabs, &whitelist);
        info!(
            "Injecting takeover for {} into {} tabs",
            reminder.id,
            candidates.len()
        );

        let mut report = DeliveryReport {
            candidates: candidates.len(),
            ..DeliveryReport::default()
        };

        let batch_size = self.settings.batch_size.max(1);
        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
            let results = join_all(batch.iter().map(|tab| self.show_in_tab(tab, reminder))).await;
            for result in results {
                match result {
                    Ok(()) => report.shown += 1,
                    Err(failure) => report.failures.push(failure),
                }
            }
        }

        if report.candidates > 0 && report.shown == 0 {
            warn!(
                "Takeover for {} reached no tab, falling back to a notification",
                reminder.id
            );
            self.notifier.notify(Notification::for_reminder(reminder));
            report.fallback_notified = true;
        }

        debug!(
            "Delivery for {}: {}/{} shown",
            reminder.id, report.shown, report.candidates
        );
        report
    }

    async fn show_in_tab(&self, tab: &TabInfo, reminder: &Reminder) -> Result<(), TabFailure> {
        let ready = self.readiness.register(tab.id);

        match self.host.inject_agent(tab.id).await {
            Ok(AgentInstall::Fresh) => {
                match tokio::time::timeout(self.settings.handshake_timeout, ready).await {
                    Ok(Ok(())) => debug!("Tab {} is ready", tab.id),
                    _ => {
                        self.readiness.forget(tab.id);
                        debug!("No handshake from tab {}, delivering anyway", tab.id);
                    }
                }
            }
            Ok(AgentInstall::Resident) => {
                drop(ready);
                self.readiness.forget(tab.id);
            }
            Err(e) => {
                drop(ready);
                self.readiness.forget(tab.id);
                match &e {
                    InjectError::Protected(_) => debug!("{}", e),
                    _ => info!("{}", e),
                }
                return Err(e.into());
            }
        }

        let directive = Directive::Show {
            reminder: reminder.clone(),
        };
        let mut attempt = 0;
        loop {
            match self.host.send_directive(tab.id, directive.clone()).await {
                Ok(ack) if ack.success => {
                    debug!("Takeover shown in tab {}", tab.id);
                    return Ok(());
                }
                Ok(ack) => {
                    let message = ack.error.unwrap_or_else(|| "rejected".to_string());
                    info!("Tab {} rejected takeover: {}", tab.id, message);
                    return Err(TabFailure::new(tab.id, FailureKind::Rejected, message));
                }
                Err(e) => match self.settings.retry.decide(&e, attempt) {
                    RetryDecision::After(delay) => {
                        debug!(
                            "Retrying delivery to tab {} (attempt {}): {}",
                            tab.id,
                            attempt + 1,
                            e
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::Terminal => {
                        info!("Giving up on tab {}: {}", tab.id, e);
                        return Err(e.into());
                    }
                },
            }
        }
    }
}
