//! # TracingLogger: lifecycle phases as `tracing` events.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  eventvisor: lifecycle key="save" priority=0 phase="queue" group=1
//! INFO  eventvisor: lifecycle key="save" priority=0 phase="start" group=1
//! WARN  eventvisor: lifecycle key="save" priority=0 phase="retry" group=1 attempt="1" delay_ms="50"
//! ```
//!
//! Each `Queue` phase of an event that is not in flight opens a new group id;
//! the following phases of that event reuse it, so one submission's lines can
//! be correlated even when many events interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::events::{Event, Metadata};
use crate::logging::{EventLogger, LifecyclePhase};

/// Default [`EventLogger`] backed by `tracing`.
#[derive(Default)]
pub struct TracingLogger {
    next_group: AtomicU64,
    groups: Mutex<HashMap<usize, u64>>,
    disposed: AtomicBool,
}

impl TracingLogger {
    /// Creates a logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// True after [`EventLogger::dispose`].
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn group_for(&self, event: &Event, phase: LifecyclePhase) -> u64 {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let id = event.id();
        let group = match groups.get(&id).copied() {
            Some(g) => g,
            None => {
                let g = self.next_group.fetch_add(1, Ordering::Relaxed) + 1;
                groups.insert(id, g);
                g
            }
        };
        if matches!(
            phase,
            LifecyclePhase::Complete | LifecyclePhase::Error | LifecyclePhase::Cancel
        ) {
            groups.remove(&id);
        }
        group
    }
}

impl EventLogger for TracingLogger {
    fn record_lifecycle(
        &self,
        event: &Event,
        phase: LifecyclePhase,
        _at: SystemTime,
        metadata: &Metadata,
    ) {
        if self.is_disposed() {
            return;
        }
        let group = self.group_for(event, phase);
        let key = event.key().unwrap_or("-");
        let priority = event.priority();
        let label = phase.as_label();

        match phase {
            LifecyclePhase::Retry | LifecyclePhase::Error => {
                warn!(target: "eventvisor", key, priority, phase = label, group, ?metadata, "lifecycle")
            }
            LifecyclePhase::Cancel => {
                info!(target: "eventvisor", key, priority, phase = label, group, ?metadata, "lifecycle")
            }
            _ => debug!(target: "eventvisor", key, priority, phase = label, group, ?metadata, "lifecycle"),
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
