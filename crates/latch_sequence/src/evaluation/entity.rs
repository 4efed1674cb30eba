// entity.rs - Binding entities tracked by the evaluation pass
//
// One entity per (binding, sequence instance) the evaluation currently cares
// about. Tags carry the link state between ticks; child links make removal
// and invalidation propagate down.

use crate::handle::Slots;
use crate::ids::BindingId;
use crate::sequence::InstanceHandle;
use bitflags::bitflags;
use std::collections::HashSet;

crate::define_handle!(EntityHandle, "Handle to a binding entity.");

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct EntityTags: u32 {
        /// The binding may spawn; only these are linked and unlinked.
        const SPAWNABLE = 1 << 0;
        const NEEDS_LINK = 1 << 1;
        const NEEDS_UNLINK = 1 << 2;
        /// Binding data changed since the last tick.
        const DATA_CHANGED = 1 << 3;
        const PENDING_REMOVAL = 1 << 4;
        /// Cached resolution is out of date; readers must re-resolve.
        const RESOLUTION_STALE = 1 << 5;
    }
}

impl EntityTags {
    /// Tags that only live for one tick.
    pub(crate) const TRANSIENT: Self = Self::NEEDS_LINK
        .union(Self::NEEDS_UNLINK)
        .union(Self::DATA_CHANGED);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntity {
    pub binding_id: BindingId,
    pub instance: InstanceHandle,
    pub parent: Option<EntityHandle>,
    pub children: Vec<EntityHandle>,
    pub tags: EntityTags,
    /// Disabled bindings keep their entity but never hold a spawn.
    pub active: bool,
}

#[derive(Default)]
pub struct BindingEntities {
    slots: Slots<BindingEntity>,
}

impl BindingEntities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a binding. New entities are linked on the next tick.
    pub fn add(
        &mut self,
        binding_id: BindingId,
        instance: InstanceHandle,
        spawnable: bool,
    ) -> EntityHandle {
        let mut tags = EntityTags::NEEDS_LINK;
        tags.set(EntityTags::SPAWNABLE, spawnable);
        let (index, generation) = self.slots.insert(BindingEntity {
            binding_id,
            instance,
            parent: None,
            children: Vec::new(),
            tags,
            active: true,
        });
        EntityHandle::new(index, generation)
    }

    /// Make `child` depend on `parent`. False if either is gone, the child
    /// already has a parent, or the link would close a cycle.
    pub fn add_child(&mut self, parent: EntityHandle, child: EntityHandle) -> bool {
        if !self.contains(parent) || self.is_ancestor_or_self(child, parent) {
            return false;
        }
        match self.get_mut(child) {
            Some(entity) if entity.parent.is_none() => entity.parent = Some(parent),
            _ => return false,
        }
        if let Some(entity) = self.get_mut(parent) {
            entity.children.push(child);
        }
        true
    }

    // Walks up from `handle`; the step bound stops on a corrupted chain.
    fn is_ancestor_or_self(&self, candidate: EntityHandle, handle: EntityHandle) -> bool {
        let mut current = Some(handle);
        for _ in 0..=self.len() {
            let Some(at) = current else {
                return false;
            };
            if at == candidate {
                return true;
            }
            current = self.get(at).and_then(|entity| entity.parent);
        }
        true
    }

    pub fn mark_changed(&mut self, handle: EntityHandle) -> bool {
        self.insert_tags(handle, EntityTags::DATA_CHANGED)
    }

    pub fn mark_for_removal(&mut self, handle: EntityHandle) -> bool {
        self.insert_tags(handle, EntityTags::PENDING_REMOVAL)
    }

    /// Enable or disable a binding. A change relinks it.
    pub fn set_active(&mut self, handle: EntityHandle, active: bool) -> bool {
        match self.get_mut(handle) {
            Some(entity) => {
                if entity.active != active {
                    entity.active = active;
                    entity.tags.insert(EntityTags::DATA_CHANGED);
                }
                true
            }
            None => false,
        }
    }

    /// Clear and return the stale-resolution flag.
    pub fn acknowledge_resolution(&mut self, handle: EntityHandle) -> bool {
        match self.get_mut(handle) {
            Some(entity) => {
                let stale = entity.tags.contains(EntityTags::RESOLUTION_STALE);
                entity.tags.remove(EntityTags::RESOLUTION_STALE);
                stale
            }
            None => false,
        }
    }

    fn insert_tags(&mut self, handle: EntityHandle, tags: EntityTags) -> bool {
        match self.get_mut(handle) {
            Some(entity) => {
                entity.tags.insert(tags);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&BindingEntity> {
        self.slots.get(handle.index(), handle.generation())
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut BindingEntity> {
        self.slots.get_mut(handle.index(), handle.generation())
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live entities in slot order.
    pub fn handles(&self) -> Vec<EntityHandle> {
        self.slots
            .iter()
            .map(|(index, generation, _)| EntityHandle::new(index, generation))
            .collect()
    }

    /// Every entity below `handle`, depth first.
    pub fn descendants(&self, handle: EntityHandle) -> Vec<EntityHandle> {
        let mut found = Vec::new();
        let mut visited = HashSet::from([handle]);
        let mut stack: Vec<EntityHandle> = self
            .get(handle)
            .map(|entity| entity.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            let Some(entity) = self.get(next) else {
                continue;
            };
            found.push(next);
            stack.extend(entity.children.iter().rev().copied());
        }
        found
    }

    /// Drop per-tick tags from every entity.
    pub(crate) fn clear_transient_tags(&mut self) {
        for handle in self.handles() {
            if let Some(entity) = self.get_mut(handle) {
                entity.tags.remove(EntityTags::TRANSIENT);
            }
        }
    }

    /// Remove every entity pending removal. Returns the removed handles.
    pub(crate) fn remove_pending(&mut self) -> Vec<EntityHandle> {
        let doomed: Vec<EntityHandle> = self
            .slots
            .iter()
            .filter(|(_, _, entity)| entity.tags.contains(EntityTags::PENDING_REMOVAL))
            .map(|(index, generation, _)| EntityHandle::new(index, generation))
            .collect();
        for handle in &doomed {
            let Some(entity) = self.slots.remove(handle.index(), handle.generation()) else {
                continue;
            };
            let Some(parent) = entity.parent else {
                continue;
            };
            if let Some(parent) = self.get_mut(parent) {
                parent.children.retain(|child| child != handle);
            }
        }
        doomed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
