use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::AgentSettings;
use crate::alarms::AlarmScheduler;
use crate::clock::{SharedClock, SystemClock};
use crate::config::CoreConfig;
use crate::control::ControlSurface;
use crate::controller::{ControllerHandle, TakeoverController};
use crate::host::{LocalBrowser, TabSpec};
use crate::platform::{FileStore, KeyValueStore, Notifier, TokioTimerService};
use crate::store::TakeoverStore;

/// Everything wired together: store, tokio alarms, controller serving its
/// command channel, and an in-process browser whose agents talk back
/// through that channel.
pub struct TakeoverRuntime {
    config: CoreConfig,
    clock: SharedClock,
    store: Arc<TakeoverStore>,
    alarms: Arc<AlarmScheduler>,
    timers: Arc<TokioTimerService>,
    controller: Arc<TakeoverController>,
    browser: Arc<LocalBrowser>,
    handle: ControllerHandle,
    fired_rx: Option<mpsc::UnboundedReceiver<String>>,
    serve_task: Option<JoinHandle<()>>,
}

impl TakeoverRuntime {
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: CoreConfig,
        backend: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        tabs: &[TabSpec],
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = Arc::new(TakeoverStore::new(backend, clock.clone(), &config));
        let (timers, fired_rx) = TokioTimerService::new(clock.clone());
        let timers = Arc::new(timers);
        let alarms = Arc::new(AlarmScheduler::new(
            timers.clone(),
            clock.clone(),
            config.lead_minutes,
        ));

        let (handle, requests) = ControllerHandle::channel();
        let browser = Arc::new(LocalBrowser::with_tabs(
            Arc::new(handle.clone()),
            AgentSettings::from_config(&config),
            tabs,
        ));
        let controller = Arc::new(TakeoverController::new(
            store.clone(),
            alarms.clone(),
            browser.clone(),
            notifier,
            clock.clone(),
            &config,
        ));
        let serve_task = tokio::spawn(controller.clone().serve(requests));

        Self {
            config,
            clock,
            store,
            alarms,
            timers,
            controller,
            browser,
            handle,
            fired_rx: Some(fired_rx),
            serve_task: Some(serve_task),
        }
    }

    /// File-backed store under `config.data_dir`, system clock.
    pub fn open(config: CoreConfig, tabs: &[TabSpec], notifier: Arc<dyn Notifier>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;
        let backend = Arc::new(FileStore::new(config.store_path(), config.storage_quota_bytes));
        Ok(Self::new(config, backend, Arc::new(SystemClock), tabs, notifier))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn store(&self) -> &Arc<TakeoverStore> {
        &self.store
    }

    pub fn alarms(&self) -> &Arc<AlarmScheduler> {
        &self.alarms
    }

    pub fn timers(&self) -> &Arc<TokioTimerService> {
        &self.timers
    }

    pub fn controller(&self) -> &Arc<TakeoverController> {
        &self.controller
    }

    pub fn browser(&self) -> &Arc<LocalBrowser> {
        &self.browser
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(self.store.clone(), self.alarms.clone(), self.clock.clone())
            .with_commands(Arc::new(self.handle.clone()))
    }

    /// Names of fired alarms. Can only be taken once.
    pub fn take_fired_alarms(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.fired_rx.take()
    }
}

impl Drop for TakeoverRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.serve_task.take() {
            task.abort();
        }
    }
}
