use std::sync::Arc;

use crate::{
    core::{
        ManagerConfig,
        driver::{spawn_driver, spawn_listener},
        manager::EventManager,
        shared::{Shared, SharedParts},
    },
    history::UndoRedoManager,
    logging::EventLogger,
    notify::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for an [`EventManager`] with optional logger, subscribers and
/// undo/redo history.
pub struct ManagerBuilder {
    cfg: ManagerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    logger: Option<Arc<dyn EventLogger>>,
    owns_logger: bool,
}

impl ManagerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ManagerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            logger: None,
            owns_logger: false,
        }
    }

    /// Sets notification subscribers.
    ///
    /// Subscribers receive every notification through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses a logger shared with other owners; `dispose` leaves it alone.
    pub fn with_logger(mut self, logger: Arc<dyn EventLogger>) -> Self {
        self.logger = Some(logger);
        self.owns_logger = false;
        self
    }

    /// Hands a logger to the manager; `dispose` disposes it too.
    pub fn with_owned_logger<L: EventLogger + 'static>(mut self, logger: L) -> Self {
        self.logger = Some(Arc::new(logger));
        self.owns_logger = true;
        self
    }

    /// Enables undo/redo history with the given capacity (0 disables it).
    pub fn with_undo_redo(mut self, capacity: usize) -> Self {
        self.cfg.history_capacity = capacity;
        self
    }

    /// Builds the manager and spawns its driver and subscriber listener.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn build(self) -> EventManager {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subscribers = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let history = self
            .cfg
            .history_limit()
            .map(|cap| Arc::new(UndoRedoManager::with_bus(cap, bus.clone())));

        let shared = Shared::new(SharedParts {
            cfg: self.cfg,
            bus,
            subscribers,
            logger: self.logger,
            owns_logger: self.owns_logger,
            history,
        });
        spawn_listener(&shared);
        spawn_driver(&shared);
        EventManager::from_shared(shared)
    }
}
