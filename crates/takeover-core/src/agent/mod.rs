//! Per-tab takeover agent.
//!
//! Lifecycle of one overlay:
//! `Idle` -> `show` -> `Showing` -> `close` -> `Closing` -> (animation) -> `Idle`.
//! `show` while `Showing` or `Closing` tears the old overlay down first, so a
//! tab never holds more than one. Every path back to `Idle` goes through
//! [`TabAgent`]'s single teardown routine.

pub mod surface;
pub mod view;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::models::{Reminder, TabId};
use crate::platform::AgentInstall;
use crate::protocol::{Ack, Command, CommandSink, Directive};

pub use surface::{
    ListenerHandle, ListenerTarget, MemorySurface, MountedOverlay, OverlayHandle, OverlaySurface,
    SurfaceError,
};
pub use view::{sanitize_text, OverlayView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Showing,
    Closing,
}

/// What the page reports back to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    DismissClicked,
    SnoozeClicked,
    /// `KeyboardEvent.key` value, e.g. `"Escape"` or `" "`.
    Key(String),
    BackdropClicked,
    ModalClicked,
    PageUnload,
    VisibilityChanged { visible: bool },
    Navigation,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub close_animation: Duration,
    pub safety_check: Duration,
    pub snooze_minutes_before: i64,
    pub snooze_tolerance_secs: i64,
}

impl AgentSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            close_animation: config.close_animation(),
            safety_check: config.safety_check_interval(),
            snooze_minutes_before: config.snooze_minutes_before,
            snooze_tolerance_secs: config.snooze_tolerance_secs,
        }
    }
}

/// A tab's execution context. Holds the residency marker that makes agent
/// installation idempotent.
pub struct TabContext {
    tab: TabId,
    agent: Mutex<Option<TabAgent>>,
}

impl TabContext {
    pub fn new(tab: TabId) -> Self {
        Self {
            tab,
            agent: Mutex::new(None),
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn agent(&self) -> Option<TabAgent> {
        self.agent.lock().clone()
    }
}

struct ActiveOverlay {
    handle: OverlayHandle,
    reminder: Reminder,
    offers_snooze: bool,
    listeners: Vec<ListenerHandle>,
    safety_net: Option<JoinHandle<()>>,
    exit_timer: Option<JoinHandle<()>>,
}

struct Session {
    state: AgentState,
    generation: u64,
    active: Option<ActiveOverlay>,
}

struct AgentInner {
    tab: TabId,
    surface: Arc<dyn OverlaySurface>,
    commands: Arc<dyn CommandSink>,
    settings: AgentSettings,
    session: Mutex<Session>,
    page_listeners: Mutex<Vec<ListenerHandle>>,
}

#[derive(Clone)]
pub struct TabAgent {
    inner: Arc<AgentInner>,
}

impl TabAgent {
    /// Install an agent into `context` unless one is already resident. A
    /// fresh agent attaches its page listeners and announces readiness.
    pub fn install(
        context: &TabContext,
        surface: Arc<dyn OverlaySurface>,
        commands: Arc<dyn CommandSink>,
        settings: AgentSettings,
    ) -> AgentInstall {
        let mut slot = context.agent.lock();
        if slot.is_some() {
            return AgentInstall::Resident;
        }

        let agent = TabAgent::new(context.tab, surface, commands, settings);
        agent.attach_page_listeners();
        agent.announce_ready();
        *slot = Some(agent);
        debug!("Takeover agent installed in tab {}", context.tab);
        AgentInstall::Fresh
    }

    pub fn new(
        tab: TabId,
        surface: Arc<dyn OverlaySurface>,
        commands: Arc<dyn CommandSink>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                tab,
                surface,
                commands,
                settings,
                session: Mutex::new(Session {
                    state: AgentState::Idle,
                    generation: 0,
                    active: None,
                }),
                page_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn tab(&self) -> TabId {
        self.inner.tab
    }

    pub fn state(&self) -> AgentState {
        self.inner.session.lock().state
    }

    pub fn overlay(&self) -> Option<OverlayHandle> {
        self.inner.session.lock().active.as_ref().map(|active| active.handle)
    }

    pub fn current_reminder(&self) -> Option<Reminder> {
        self.inner
            .session
            .lock()
            .active
            .as_ref()
            .map(|active| active.reminder.clone())
    }

    fn attach_page_listeners(&self) {
        let mut attached = Vec::new();
        for target in ListenerTarget::PAGE {
            match self.inner.surface.listen(target) {
                Ok(handle) => attached.push(handle),
                Err(e) => debug!("Tab {}: {}", self.inner.tab, e),
            }
        }
        *self.inner.page_listeners.lock() = attached;
    }

    fn announce_ready(&self) {
        self.send_command(Command::ReadyHandshake {
            tab_id: self.inner.tab,
        });
    }

    /// Fire-and-forget; the agent never waits on the controller.
    fn send_command(&self, command: Command) {
        let commands = self.inner.commands.clone();
        let tab = self.inner.tab;
        tokio::spawn(async move {
            let kind = command.kind();
            let ack = commands.send(command).await;
            if !ack.success {
                warn!(
                    "Tab {}: {} command failed: {}",
                    tab,
                    kind,
                    ack.error.unwrap_or_default()
                );
            }
        });
    }

    // --- DIRECTIVES ---

    pub fn handle_message(&self, raw: &Value) -> Ack {
        match Directive::from_value(raw) {
            Ok(directive) => self.handle_directive(directive),
            Err(e) => Ack::failed(e.to_string()),
        }
    }

    pub fn handle_directive(&self, directive: Directive) -> Ack {
        match directive {
            Directive::Show { reminder } => Ack::from(self.show(reminder)),
            Directive::Close => {
                self.close();
                Ack::ok()
            }
            Directive::Ping => Ack::ok(),
        }
    }

    /// Mount a fresh overlay for `reminder`, replacing any existing one.
    pub fn show(&self, reminder: Reminder) -> Result<(), SurfaceError> {
        let inner = &self.inner;
        let view = OverlayView::for_reminder(
            &reminder,
            inner.settings.snooze_minutes_before,
            inner.settings.snooze_tolerance_secs,
        );

        let mut session = inner.session.lock();
        if session.active.is_some() {
            debug!("Tab {}: replacing existing overlay", inner.tab);
            self.teardown(&mut session);
        }

        let handle = inner.surface.mount(&view)?;
        let mut targets = vec![
            ListenerTarget::DismissButton,
            ListenerTarget::Keyboard,
            ListenerTarget::Backdrop,
            ListenerTarget::ModalBody,
        ];
        if view.offers_snooze() {
            targets.push(ListenerTarget::SnoozeButton);
        }
        let listeners = targets
            .into_iter()
            .filter_map(|target| match inner.surface.listen(target) {
                Ok(listener) => Some(listener),
                Err(e) => {
                    debug!("Tab {}: {}", inner.tab, e);
                    None
                }
            })
            .collect();

        session.generation += 1;
        let generation = session.generation;
        session.state = AgentState::Showing;
        session.active = Some(ActiveOverlay {
            handle,
            reminder,
            offers_snooze: view.offers_snooze(),
            listeners,
            safety_net: Some(self.spawn_safety_net(generation)),
            exit_timer: None,
        });
        debug!("Tab {}: overlay {:?} shown", inner.tab, handle);
        Ok(())
    }

    /// Animate the overlay out. A no-op unless an overlay is showing.
    pub fn close(&self) {
        let mut session = self.inner.session.lock();
        if session.state != AgentState::Showing {
            return;
        }
        let generation = session.generation;
        let Some(active) = session.active.as_mut() else {
            return;
        };

        self.inner.surface.begin_exit(active.handle);
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.settings.close_animation;
        active.exit_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                TabAgent { inner }.finish_close(generation);
            }
        }));
        session.state = AgentState::Closing;
    }

    fn finish_close(&self, generation: u64) {
        let mut session = self.inner.session.lock();
        if session.generation != generation || session.state != AgentState::Closing {
            return;
        }
        if let Some(active) = session.active.as_mut() {
            // Running on this task; nothing left to abort
            active.exit_timer = None;
        }
        self.teardown(&mut session);
    }

    /// The one way back to `Idle`: stop timers, detach listeners, remove
    /// the overlay.
    fn teardown(&self, session: &mut Session) {
        if let Some(mut active) = session.active.take() {
            if let Some(task) = active.safety_net.take() {
                task.abort();
            }
            if let Some(task) = active.exit_timer.take() {
                task.abort();
            }
            for listener in active.listeners.drain(..) {
                self.inner.surface.unlisten(listener);
            }
            self.inner.surface.unmount(active.handle);
            debug!("Tab {}: overlay {:?} removed", self.inner.tab, active.handle);
        }
        session.state = AgentState::Idle;
    }

    fn spawn_safety_net(&self, generation: u64) -> JoinHandle<()> {
        let weak: Weak<AgentInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.settings.safety_check;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !(TabAgent { inner }).verify_attached(generation, true) {
                    return;
                }
            }
        })
    }

    /// Returns whether the overlay of `generation` is still live. A detached
    /// overlay is torn down here.
    fn verify_attached(&self, generation: u64, from_safety_net: bool) -> bool {
        let mut session = self.inner.session.lock();
        if session.generation != generation {
            return false;
        }
        let Some(active) = session.active.as_mut() else {
            return false;
        };
        if self.inner.surface.is_attached(active.handle) {
            return true;
        }

        warn!(
            "Tab {}: overlay detached outside of close, cleaning up",
            self.inner.tab
        );
        if from_safety_net {
            active.safety_net = None;
        }
        self.teardown(&mut session);
        false
    }

    // --- PAGE EVENTS ---

    pub fn handle_event(&self, event: UiEvent) {
        match event {
            UiEvent::DismissClicked | UiEvent::BackdropClicked => self.user_dismiss(),
            UiEvent::Key(key) if matches!(key.as_str(), "Escape" | "Enter" | " ") => {
                self.user_dismiss()
            }
            UiEvent::Key(_) | UiEvent::ModalClicked => {}
            UiEvent::SnoozeClicked => self.user_snooze(),
            UiEvent::PageUnload | UiEvent::Navigation => {
                let mut session = self.inner.session.lock();
                self.teardown(&mut session);
            }
            UiEvent::VisibilityChanged { visible } => {
                if visible {
                    let generation = self.inner.session.lock().generation;
                    self.verify_attached(generation, false);
                }
            }
        }
    }

    fn user_dismiss(&self) {
        let Some(reminder) = self.interactive_reminder(false) else {
            return;
        };
        self.send_command(Command::Dismiss {
            reminder_id: reminder.id.clone(),
            is_test: reminder.is_test,
        });
        self.close();
    }

    fn user_snooze(&self) {
        let Some(reminder) = self.interactive_reminder(true) else {
            return;
        };
        self.send_command(Command::Snooze {
            reminder_id: reminder.id.clone(),
            is_test: reminder.is_test,
            reminder: Some(reminder),
        });
        self.close();
    }

    /// The reminder behind the visible overlay, if it accepts input.
    fn interactive_reminder(&self, needs_snooze: bool) -> Option<Reminder> {
        let session = self.inner.session.lock();
        if session.state != AgentState::Showing {
            return None;
        }
        session
            .active
            .as_ref()
            .filter(|active| !needs_snooze || active.offers_snooze)
            .map(|active| active.reminder.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReminderId;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Command>>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&self, command: Command) -> Ack {
            self.sent.lock().push(command);
            Ack::ok()
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings::from_config(&CoreConfig::new("/tmp"))
    }

    fn reminder(id: &str) -> Reminder {
        let due = NaiveDate::from_ymd_opt(2030, 7, 1)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        Reminder::new(ReminderId::new(id), "Retro", "Bring notes", due)
    }

    fn agent() -> (TabAgent, Arc<MemorySurface>, Arc<RecordingSink>) {
        let surface = Arc::new(MemorySurface::new());
        let sink = Arc::new(RecordingSink::default());
        let agent = TabAgent::new(TabId(3), surface.clone(), sink.clone(), settings());
        (agent, surface, sink)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_install_is_idempotent_and_announces_readiness() {
        let context = TabContext::new(TabId(8));
        let surface = Arc::new(MemorySurface::new());
        let sink = Arc::new(RecordingSink::default());

        let first = TabAgent::install(&context, surface.clone(), sink.clone(), settings());
        let second = TabAgent::install(&context, surface.clone(), sink.clone(), settings());
        assert_eq!(first, AgentInstall::Fresh);
        assert_eq!(second, AgentInstall::Resident);
        assert!(context.agent().is_some());
        assert_eq!(surface.listeners().len(), 3);

        settle().await;
        assert_eq!(
            *sink.sent.lock(),
            vec![Command::ReadyHandshake { tab_id: TabId(8) }]
        );
    }

    #[tokio::test]
    async fn test_blocked_page_listeners_do_not_prevent_install() {
        let context = TabContext::new(TabId(1));
        let surface = Arc::new(MemorySurface::new());
        surface.block_listener(ListenerTarget::PageUnload);
        surface.block_listener(ListenerTarget::VisibilityChange);
        let install = TabAgent::install(
            &context,
            surface.clone(),
            Arc::new(RecordingSink::default()),
            settings(),
        );
        assert_eq!(install, AgentInstall::Fresh);
        assert_eq!(surface.listeners(), vec![ListenerTarget::Navigation]);

        let agent = context.agent().unwrap();
        assert!(agent.show(reminder("r")).is_ok());
        assert_eq!(agent.state(), AgentState::Showing);
    }

    #[tokio::test]
    async fn test_second_show_replaces_first() {
        let (agent, surface, _) = agent();
        agent.show(reminder("a")).unwrap();
        agent.show(reminder("b")).unwrap();

        let overlays = surface.overlays();
        assert_eq!(overlays.len(), 1);
        assert_eq!(agent.current_reminder().unwrap().id.as_str(), "b");
        // Old overlay's listeners are gone, new ones attached once
        assert_eq!(
            surface.listeners(),
            vec![
                ListenerTarget::DismissButton,
                ListenerTarget::SnoozeButton,
                ListenerTarget::Keyboard,
                ListenerTarget::Backdrop,
                ListenerTarget::ModalBody,
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_show_directives_leave_one_overlay() {
        let (agent, surface, _) = agent();
        let a = agent.clone();
        let b = agent.clone();
        let first = tokio::spawn(async move { a.handle_directive(Directive::Show { reminder: reminder("x") }) });
        let second = tokio::spawn(async move { b.handle_directive(Directive::Show { reminder: reminder("y") }) });
        assert!(first.await.unwrap().success);
        assert!(second.await.unwrap().success);
        assert_eq!(surface.overlays().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_animates_then_tears_down() {
        let (agent, surface, _) = agent();
        agent.show(reminder("a")).unwrap();

        assert!(agent.handle_directive(Directive::Close).success);
        assert_eq!(agent.state(), AgentState::Closing);
        assert!(surface.overlays()[0].exiting);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(surface.overlays().is_empty());
        assert!(surface.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_close_without_overlay_is_noop() {
        let (agent, surface, _) = agent();
        let ack = agent.handle_message(&json!({"type": "close"}));
        assert!(ack.success);
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(surface.overlays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_during_close_wins() {
        let (agent, surface, _) = agent();
        agent.show(reminder("a")).unwrap();
        agent.close();
        agent.show(reminder("b")).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(agent.state(), AgentState::Showing);
        assert_eq!(surface.overlays().len(), 1);
        assert_eq!(agent.current_reminder().unwrap().id.as_str(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_dismiss_sends_command_and_closes() {
        let (agent, _, sink) = agent();
        agent.show(reminder("d")).unwrap();
        agent.handle_event(UiEvent::Key("Escape".into()));
        settle().await;

        assert_eq!(agent.state(), AgentState::Closing);
        assert_eq!(
            *sink.sent.lock(),
            vec![Command::Dismiss {
                reminder_id: ReminderId::new("d"),
                is_test: false
            }]
        );

        // Further input during the exit animation is ignored
        agent.handle_event(UiEvent::DismissClicked);
        settle().await;
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_modal_clicks_and_other_keys_do_nothing() {
        let (agent, _, sink) = agent();
        agent.show(reminder("m")).unwrap();
        agent.handle_event(UiEvent::ModalClicked);
        agent.handle_event(UiEvent::Key("a".into()));
        settle().await;
        assert_eq!(agent.state(), AgentState::Showing);
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_snooze_click_carries_reminder() {
        let (agent, _, sink) = agent();
        let r = reminder("s");
        agent.show(r.clone()).unwrap();
        agent.handle_event(UiEvent::SnoozeClicked);
        settle().await;
        assert_eq!(
            *sink.sent.lock(),
            vec![Command::Snooze {
                reminder_id: r.id.clone(),
                reminder: Some(r),
                is_test: false
            }]
        );
    }

    #[tokio::test]
    async fn test_snooze_ignored_when_not_offered() {
        let (agent, surface, sink) = agent();
        let r = reminder("late");
        let at_target = r.rescheduled(r.original_due_at() - ChronoDuration::minutes(2));
        agent.show(at_target).unwrap();
        assert!(!surface.listeners().contains(&ListenerTarget::SnoozeButton));

        agent.handle_event(UiEvent::SnoozeClicked);
        settle().await;
        assert!(sink.sent.lock().is_empty());
        assert_eq!(agent.state(), AgentState::Showing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_net_cleans_up_detached_overlay() {
        let (agent, surface, _) = agent();
        agent.show(reminder("a")).unwrap();
        let handle = agent.overlay().unwrap();
        surface.detach(handle);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.overlay().is_none());
        assert!(surface.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_visibility_recheck_and_unload() {
        let (agent, surface, _) = agent();
        agent.show(reminder("a")).unwrap();
        agent.handle_event(UiEvent::VisibilityChanged { visible: true });
        assert_eq!(agent.state(), AgentState::Showing);

        surface.detach(agent.overlay().unwrap());
        agent.handle_event(UiEvent::VisibilityChanged { visible: true });
        assert_eq!(agent.state(), AgentState::Idle);

        agent.show(reminder("b")).unwrap();
        agent.handle_event(UiEvent::Navigation);
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(surface.overlays().is_empty());
    }

    #[tokio::test]
    async fn test_bad_directives_get_failure_ack() {
        let (agent, surface, _) = agent();
        let unknown = agent.handle_message(&json!({"type": "explode"}));
        assert!(!unknown.success);
        assert_eq!(unknown.error.as_deref(), Some("Unknown message type: explode"));

        let no_reminder = agent.handle_message(&json!({"type": "show"}));
        assert!(!no_reminder.success);

        surface.fail_mounts("document has no body");
        let failed = agent.handle_directive(Directive::Show { reminder: reminder("z") });
        assert!(!failed.success);
        assert_eq!(agent.state(), AgentState::Idle);

        assert!(agent.handle_message(&json!({"type": "ping"})).success);
    }

    #[tokio::test]
    async fn test_user_supplied_markup_is_plain_text() {
        let (agent, surface, _) = agent();
        let mut r = reminder("x");
        r.title = "<script>steal()</script>Standup".into();
        agent.show(r).unwrap();
        assert_eq!(surface.overlays()[0].view.title, "steal()Standup");
    }
}
