use std::time::SystemTime;

use crate::events::{Event, EventState, Metadata};

/// Lifecycle phase reported to an [`EventLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Accepted into the queue (also on re-queue after a retry delay).
    Queue,
    /// Paused while queued.
    Pause,
    /// Action started.
    Start,
    /// Failed attempt scheduled for retry.
    Retry,
    /// Action succeeded.
    Complete,
    /// Action failed for good.
    Error,
    /// Cancelled.
    Cancel,
}

impl LifecyclePhase {
    /// Phase for a state transition, if it is one that gets logged.
    ///
    /// Progress updates are not lifecycle phases.
    pub fn of(state: &EventState) -> Option<Self> {
        match state {
            EventState::Queued => Some(Self::Queue),
            EventState::Paused => Some(Self::Pause),
            EventState::Started => Some(Self::Start),
            EventState::Progress { .. } => None,
            EventState::Retrying { .. } => Some(Self::Retry),
            EventState::Completed(_) => Some(Self::Complete),
            EventState::Failed(_) => Some(Self::Error),
            EventState::Cancelled(_) => Some(Self::Cancel),
        }
    }

    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Pause => "pause",
            Self::Start => "start",
            Self::Retry => "retry",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancel => "cancel",
        }
    }
}

/// Structured sink for event lifecycle phases.
///
/// Called synchronously from the manager, never while its internal lock is
/// held. Implementations must be cheap and must not block.
pub trait EventLogger: Send + Sync + 'static {
    /// Records one lifecycle phase of `event`.
    ///
    /// `metadata` carries the event's debug metadata plus phase details
    /// (`attempt`, `delay_ms`, `error`, `reason`) where they apply.
    fn record_lifecycle(
        &self,
        event: &Event,
        phase: LifecyclePhase,
        at: SystemTime,
        metadata: &Metadata,
    );

    /// Releases resources. Called by `EventManager::dispose` when the manager
    /// owns the logger.
    fn dispose(&self) {}
}
