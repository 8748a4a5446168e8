//! Hand-driven location provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::provider::{
    LocationError, LocationProvider, ProviderEvent, RawFix, WatchId, WatchOptions,
};

/// Provider whose events are pushed by the caller.
///
/// Used by tests and embedders that receive positions from elsewhere (for
/// example a platform bridge) and want to feed them through the normal
/// filtering path.
#[derive(Debug, Default)]
pub struct ManualLocationProvider {
    sinks: Mutex<HashMap<WatchId, mpsc::UnboundedSender<ProviderEvent>>>,
    next_id: AtomicU64,
    denied: AtomicBool,
}

impl ManualLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `watch` calls fail with [`LocationError::PermissionDenied`].
    pub fn deny_permission(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    /// Push a fix to every active watch.
    pub fn push(&self, fix: RawFix) {
        self.send(ProviderEvent::Fix(fix));
    }

    /// Push an error to every active watch.
    pub fn push_error(&self, error: LocationError) {
        self.send(ProviderEvent::Error(error));
    }

    pub fn active_watches(&self) -> usize {
        self.sinks.lock().len()
    }

    fn send(&self, event: ProviderEvent) {
        self.sinks
            .lock()
            .retain(|_, sink| sink.send(event.clone()).is_ok());
    }
}

impl LocationProvider for ManualLocationProvider {
    fn watch(
        &self,
        _options: &WatchOptions,
        sink: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<WatchId, LocationError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(LocationError::PermissionDenied);
        }
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sinks.lock().insert(id, sink);
        Ok(id)
    }

    fn clear(&self, id: WatchId) {
        self.sinks.lock().remove(&id);
    }
}
