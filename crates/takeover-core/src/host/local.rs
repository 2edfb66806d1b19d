//! In-process browser: a set of virtual tabs, each with its own execution
//! context and in-memory page, implementing [`TabHost`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{AgentSettings, MemorySurface, OverlayView, TabAgent, TabContext, UiEvent};
use crate::models::{TabId, TabInfo};
use crate::platform::{AgentInstall, DeliveryError, InjectError, TabHost};
use crate::protocol::{Ack, CommandSink, Directive};

/// How a virtual tab is described in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSpec {
    pub url: String,
    /// Pages that refuse script injection (browser pages, stores, PDFs).
    #[serde(default)]
    pub protected: bool,
}

impl TabSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protected: false,
        }
    }
}

struct VirtualTab {
    info: TabInfo,
    protected: bool,
    context: TabContext,
    surface: Arc<MemorySurface>,
}

pub struct LocalBrowser {
    tabs: Mutex<Vec<Arc<VirtualTab>>>,
    next_id: AtomicU32,
    commands: Arc<dyn CommandSink>,
    settings: AgentSettings,
}

impl LocalBrowser {
    pub fn new(commands: Arc<dyn CommandSink>, settings: AgentSettings) -> Self {
        Self {
            tabs: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            commands,
            settings,
        }
    }

    pub fn with_tabs(
        commands: Arc<dyn CommandSink>,
        settings: AgentSettings,
        specs: &[TabSpec],
    ) -> Self {
        let browser = Self::new(commands, settings);
        for spec in specs {
            browser.open(spec.clone());
        }
        browser
    }

    pub fn open(&self, spec: TabSpec) -> TabId {
        let id = TabId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tabs.lock().push(Arc::new(VirtualTab {
            info: TabInfo {
                id,
                url: spec.url,
                window_id: Some(1),
            },
            protected: spec.protected,
            context: TabContext::new(id),
            surface: Arc::new(MemorySurface::new()),
        }));
        id
    }

    pub fn open_tab(&self, url: impl Into<String>) -> TabId {
        self.open(TabSpec::new(url))
    }

    pub fn close_tab(&self, tab: TabId) -> bool {
        let mut tabs = self.tabs.lock();
        let before = tabs.len();
        tabs.retain(|t| t.info.id != tab);
        tabs.len() != before
    }

    fn find(&self, tab: TabId) -> Option<Arc<VirtualTab>> {
        self.tabs.lock().iter().find(|t| t.info.id == tab).cloned()
    }

    pub fn surface(&self, tab: TabId) -> Option<Arc<MemorySurface>> {
        self.find(tab).map(|t| t.surface.clone())
    }

    pub fn agent(&self, tab: TabId) -> Option<TabAgent> {
        self.find(tab).and_then(|t| t.context.agent())
    }

    /// Feed a page event to the agent in `tab`. Returns `false` when the
    /// tab has no agent.
    pub fn dispatch(&self, tab: TabId, event: UiEvent) -> bool {
        match self.agent(tab) {
            Some(agent) => {
                agent.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Overlays currently on screen, per tab.
    pub fn visible_overlays(&self) -> Vec<(TabId, OverlayView)> {
        let tabs: Vec<Arc<VirtualTab>> = self.tabs.lock().clone();
        tabs.iter()
            .flat_map(|tab| {
                tab.surface
                    .overlays()
                    .into_iter()
                    .filter(|overlay| !overlay.exiting)
                    .map(|overlay| (tab.info.id, overlay.view))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl TabHost for LocalBrowser {
    async fn query_tabs(&self) -> Vec<TabInfo> {
        self.tabs.lock().iter().map(|t| t.info.clone()).collect()
    }

    async fn inject_agent(&self, tab: TabId) -> Result<AgentInstall, InjectError> {
        let target = self.find(tab).ok_or(InjectError::TabGone(tab))?;
        if target.protected {
            return Err(InjectError::Protected(tab));
        }
        let install = TabAgent::install(
            &target.context,
            target.surface.clone(),
            self.commands.clone(),
            self.settings.clone(),
        );
        debug!("Injected into tab {}: {:?}", tab, install);
        Ok(install)
    }

    async fn send_directive(&self, tab: TabId, directive: Directive) -> Result<Ack, DeliveryError> {
        let target = self.find(tab).ok_or(DeliveryError::TabGone(tab))?;
        let agent = target.context.agent().ok_or(DeliveryError::NoReceiver(tab))?;
        Ok(agent.handle_directive(directive))
    }
}
