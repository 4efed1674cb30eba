//! Pre-animated state
//!
//! Snapshot of an object taken before the sequencer touches it, so the
//! original look can be put back when the object is released.

use crate::world::{ObjectHandle, ObjectTags, World};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct PreAnimatedSnapshot {
    pub tags: ObjectTags,
    pub properties: BTreeMap<String, f32>,
}

#[derive(Debug, Default)]
pub struct PreAnimatedStateStore {
    snapshots: HashMap<ObjectHandle, PreAnimatedSnapshot>,
}

impl PreAnimatedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `handle`. The first capture wins; returns false when a
    /// snapshot already exists or the object is gone.
    pub fn capture(&mut self, handle: ObjectHandle, world: &World) -> bool {
        if self.snapshots.contains_key(&handle) {
            return false;
        }
        let Some(object) = world.get(handle) else {
            return false;
        };
        self.snapshots.insert(
            handle,
            PreAnimatedSnapshot {
                tags: object.tags,
                properties: object.properties.clone(),
            },
        );
        true
    }

    /// Re-apply and drop the snapshot for `handle`.
    pub fn restore(&mut self, handle: ObjectHandle, world: &mut World) -> bool {
        let Some(snapshot) = self.snapshots.remove(&handle) else {
            return false;
        };
        let Some(object) = world.get_mut(handle) else {
            return false;
        };
        // Pending kill is world state, not animation state.
        let pending_kill = object.tags & ObjectTags::PENDING_KILL;
        object.tags = snapshot.tags | pending_kill;
        object.properties = snapshot.properties;
        true
    }

    pub fn discard(&mut self, handle: ObjectHandle) -> Option<PreAnimatedSnapshot> {
        self.snapshots.remove(&handle)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&PreAnimatedSnapshot> {
        self.snapshots.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
