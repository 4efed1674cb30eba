use super::key::SpawnKey;
use crate::world::ObjectHandle;
use std::cell::RefCell;
use std::rc::Rc;

/// Lifecycle notifications emitted by spawn registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpawnEvent {
    Spawned { key: SpawnKey, object: ObjectHandle },
    /// A pooled object was handed to a new key instead of spawning.
    Reused { key: SpawnKey, object: ObjectHandle },
    /// The object stays alive but hidden, ready for reuse.
    Hidden { key: SpawnKey, object: ObjectHandle },
    Destroyed { key: SpawnKey, object: ObjectHandle },
    /// Tracking dropped; the object is someone else's now.
    Forgotten { key: SpawnKey, object: ObjectHandle },
}

impl SpawnEvent {
    pub fn key(&self) -> SpawnKey {
        match *self {
            Self::Spawned { key, .. }
            | Self::Reused { key, .. }
            | Self::Hidden { key, .. }
            | Self::Destroyed { key, .. }
            | Self::Forgotten { key, .. } => key,
        }
    }

    pub fn object(&self) -> ObjectHandle {
        match *self {
            Self::Spawned { object, .. }
            | Self::Reused { object, .. }
            | Self::Hidden { object, .. }
            | Self::Destroyed { object, .. }
            | Self::Forgotten { object, .. } => object,
        }
    }
}

pub trait SpawnObserver {
    fn on_spawn_event(&mut self, event: &SpawnEvent);
}

/// Observer that records every event. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct SpawnEventLog {
    events: Rc<RefCell<Vec<SpawnEvent>>>,
}

impl SpawnEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SpawnEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<SpawnEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl SpawnObserver for SpawnEventLog {
    fn on_spawn_event(&mut self, event: &SpawnEvent) {
        self.events.borrow_mut().push(*event);
    }
}
