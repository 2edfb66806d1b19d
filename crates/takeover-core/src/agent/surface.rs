//! The page the agent draws into.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::view::OverlayView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub u64);

/// Things the agent listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListenerTarget {
    DismissButton,
    SnoozeButton,
    Keyboard,
    Backdrop,
    ModalBody,
    PageUnload,
    VisibilityChange,
    Navigation,
}

impl ListenerTarget {
    pub const PAGE: [ListenerTarget; 3] = [
        ListenerTarget::PageUnload,
        ListenerTarget::VisibilityChange,
        ListenerTarget::Navigation,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Overlay could not be mounted: {0}")]
    Mount(String),
    #[error("Page refused listener for {0:?}")]
    ListenerBlocked(ListenerTarget),
}

pub trait OverlaySurface: Send + Sync {
    fn mount(&self, view: &OverlayView) -> Result<OverlayHandle, SurfaceError>;
    /// Start the exit animation; the overlay stays mounted.
    fn begin_exit(&self, overlay: OverlayHandle);
    fn unmount(&self, overlay: OverlayHandle);
    fn is_attached(&self, overlay: OverlayHandle) -> bool;
    fn listen(&self, target: ListenerTarget) -> Result<ListenerHandle, SurfaceError>;
    fn unlisten(&self, listener: ListenerHandle);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedOverlay {
    pub handle: OverlayHandle,
    pub view: OverlayView,
    pub exiting: bool,
}

#[derive(Default)]
struct SurfaceState {
    overlays: BTreeMap<OverlayHandle, MountedOverlay>,
    listeners: HashMap<ListenerHandle, ListenerTarget>,
    blocked: HashSet<ListenerTarget>,
    mount_error: Option<String>,
}

/// In-memory page: keeps mounted overlays and listeners so hosts and tests
/// can look at them.
#[derive(Default)]
pub struct MemorySurface {
    next_handle: AtomicU64,
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `listen` fail for `target`, like a page with a restrictive
    /// policy.
    pub fn block_listener(&self, target: ListenerTarget) {
        self.state.lock().blocked.insert(target);
    }

    pub fn fail_mounts(&self, message: impl Into<String>) {
        self.state.lock().mount_error = Some(message.into());
    }

    /// Remove the overlay behind the agent's back (page script, DOM reset).
    pub fn detach(&self, overlay: OverlayHandle) -> bool {
        self.state.lock().overlays.remove(&overlay).is_some()
    }

    pub fn overlays(&self) -> Vec<MountedOverlay> {
        self.state.lock().overlays.values().cloned().collect()
    }

    pub fn listeners(&self) -> Vec<ListenerTarget> {
        let mut targets: Vec<ListenerTarget> = self.state.lock().listeners.values().copied().collect();
        targets.sort();
        targets
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl OverlaySurface for MemorySurface {
    fn mount(&self, view: &OverlayView) -> Result<OverlayHandle, SurfaceError> {
        if let Some(message) = self.state.lock().mount_error.clone() {
            return Err(SurfaceError::Mount(message));
        }
        let handle = OverlayHandle(self.next());
        self.state.lock().overlays.insert(
            handle,
            MountedOverlay {
                handle,
                view: view.clone(),
                exiting: false,
            },
        );
        Ok(handle)
    }

    fn begin_exit(&self, overlay: OverlayHandle) {
        if let Some(mounted) = self.state.lock().overlays.get_mut(&overlay) {
            mounted.exiting = true;
        }
    }

    fn unmount(&self, overlay: OverlayHandle) {
        self.state.lock().overlays.remove(&overlay);
    }

    fn is_attached(&self, overlay: OverlayHandle) -> bool {
        self.state.lock().overlays.contains_key(&overlay)
    }

    fn listen(&self, target: ListenerTarget) -> Result<ListenerHandle, SurfaceError> {
        if self.state.lock().blocked.contains(&target) {
            return Err(SurfaceError::ListenerBlocked(target));
        }
        let handle = ListenerHandle(self.next());
        self.state.lock().listeners.insert(handle, target);
        Ok(handle)
    }

    fn unlisten(&self, listener: ListenerHandle) {
        self.state.lock().listeners.remove(&listener);
    }
}
