//! First user gesture tracking
//!
//! Browsers only allow sound autoplay (and some ad flows) after a user gesture on
//! the page. The tracker arms one listener per gesture kind on the player
//! container; each listener releases itself after its first firing.

use crate::events::Subscription;
use crate::types::GestureKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info};

/// Source of gesture notifications (the player container)
pub trait InteractionSource: Send + Sync {
    fn subscribe(
        &self,
        kind: GestureKind,
        handler: Arc<dyn Fn(&GestureKind) + Send + Sync>,
    ) -> Subscription;
}

/// One-way latch set by the first qualifying gesture
#[derive(Debug, Default)]
pub struct InteractionTracker {
    interacted: AtomicBool,
    armed: Mutex<HashMap<GestureKind, Subscription>>,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Returns true on the first call only.
    pub fn record_interaction(&self) -> bool {
        let first = !self.interacted.swap(true, Ordering::AcqRel);
        if first {
            info!("User interaction detected");
        }
        first
    }

    pub fn has_interacted(&self) -> bool {
        self.interacted.load(Ordering::Acquire)
    }

    /// Arm one self-disarming listener per gesture kind
    pub fn arm(self: &Arc<Self>, source: &dyn InteractionSource) {
        for kind in GestureKind::ALL {
            let tracker: Weak<Self> = Arc::downgrade(self);
            let subscription = source.subscribe(
                kind,
                Arc::new(move |gesture: &GestureKind| {
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.record_interaction();
                        tracker.release(*gesture);
                    }
                }),
            );
            self.armed_listeners().insert(kind, subscription);
        }
        debug!(kinds = GestureKind::ALL.len(), "Interaction listeners armed");
    }

    /// Drop every listener still armed
    pub fn disarm(&self) {
        let released: Vec<Subscription> = self.armed_listeners().drain().map(|(_, s)| s).collect();
        if !released.is_empty() {
            debug!(count = released.len(), "Interaction listeners disarmed");
        }
    }

    /// Number of gesture kinds still listened to
    pub fn armed_count(&self) -> usize {
        self.armed_listeners().len()
    }

    fn release(&self, kind: GestureKind) {
        let subscription = self.armed_listeners().remove(&kind);
        drop(subscription);
    }

    fn armed_listeners(&self) -> std::sync::MutexGuard<'_, HashMap<GestureKind, Subscription>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
